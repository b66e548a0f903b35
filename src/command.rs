//! Command builder (C5): turns a CommandLineTool document plus resolved
//! input values into the argv the executor should invoke.

use crate::document::{Document, InputBinding};
use crate::error::WorkflowResult;
use crate::value::Value;
use std::collections::BTreeMap;

/// One emitted command-line part, still tagged with its sort position so
/// the caller can verify ordering in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPart {
    pub position: i64,
    pub tiebreak: usize,
    pub text: String,
}

/// Builds the full argv for a CommandLineTool invocation: `baseCommand`
/// followed by every `arguments:` and input-binding part, stably sorted by
/// position (ties broken by declaration order, matching CWL's documented
/// sort behavior).
pub fn build_command(doc: &Document, inputs: &BTreeMap<String, Value>) -> WorkflowResult<Vec<String>> {
    let mut argv: Vec<String> = doc.base_command.clone();

    let mut parts: Vec<CommandPart> = Vec::new();
    let mut tiebreak = 0usize;

    for arg in &doc.arguments {
        let text = arg.value_from.clone().unwrap_or_default();
        parts.push(emit_part(arg.position, tiebreak, arg.prefix.as_deref(), arg.separate, &text));
        tiebreak += 1;
    }

    for param in &doc.inputs {
        let Some(binding) = &param.input_binding else {
            continue;
        };
        let Some(value) = inputs.get(&param.id) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        for part in emit_value_parts(binding, value, &mut tiebreak) {
            parts.push(part);
        }
    }

    parts.sort_by(|a, b| a.position.cmp(&b.position).then(a.tiebreak.cmp(&b.tiebreak)));
    argv.extend(parts.into_iter().map(|p| p.text));
    Ok(argv)
}

fn emit_value_parts(binding: &InputBinding, value: &Value, tiebreak: &mut usize) -> Vec<CommandPart> {
    let mut out = Vec::new();
    match value {
        Value::List(items) if binding.item_separator.is_some() => {
            let sep = binding.item_separator.as_deref().unwrap_or(" ");
            let joined = items.iter().map(format_value).collect::<Vec<_>>().join(sep);
            out.push(emit_part(binding.position, *tiebreak, binding.prefix.as_deref(), binding.separate, &joined));
            *tiebreak += 1;
        }
        Value::List(items) => {
            for item in items {
                out.push(emit_part(
                    binding.position,
                    *tiebreak,
                    binding.prefix.as_deref(),
                    binding.separate,
                    &format_value(item),
                ));
                *tiebreak += 1;
            }
        }
        Value::Bool(b) => {
            // CWL: booleans emit only the prefix (as a flag) and only when true.
            if *b {
                if let Some(prefix) = &binding.prefix {
                    out.push(CommandPart {
                        position: binding.position,
                        tiebreak: *tiebreak,
                        text: prefix.clone(),
                    });
                    *tiebreak += 1;
                }
            }
        }
        other => {
            out.push(emit_part(
                binding.position,
                *tiebreak,
                binding.prefix.as_deref(),
                binding.separate,
                &format_value(other),
            ));
            *tiebreak += 1;
        }
    }
    out
}

fn emit_part(position: i64, tiebreak: usize, prefix: Option<&str>, separate: bool, value: &str) -> CommandPart {
    let text = match prefix {
        Some(prefix) if separate => format!("{} {}", prefix, value),
        Some(prefix) => format!("{}{}", prefix, value),
        None => value.to_string(),
    };
    CommandPart { position, tiebreak, text }
}

/// Formats a resolved value for inclusion in a command-line part: File and
/// Directory objects emit their `path` (falling back to `location`), other
/// scalars use their display form.
fn format_value(value: &Value) -> String {
    if value.is_file() || value.is_directory() {
        if let Some(path) = value.map_get("path").and_then(Value::as_str) {
            return path.to_string();
        }
        if let Some(loc) = value.map_get("location").and_then(Value::as_str) {
            return loc.to_string();
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    fn tool(yaml: &str) -> Document {
        parse_document(yaml).unwrap()
    }

    #[test]
    fn orders_parts_by_position_then_declaration() {
        let doc = tool(
            r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: [echo]
inputs:
  - id: second
    type: string
    inputBinding: { position: 2 }
  - id: first
    type: string
    inputBinding: { position: 1 }
outputs: []
"#,
        );
        let mut inputs = BTreeMap::new();
        inputs.insert("first".to_string(), Value::Str("a".into()));
        inputs.insert("second".to_string(), Value::Str("b".into()));
        let argv = build_command(&doc, &inputs).unwrap();
        assert_eq!(argv, vec!["echo", "a", "b"]);
    }

    #[test]
    fn boolean_flag_only_emits_when_true() {
        let doc = tool(
            r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: [tool]
inputs:
  - id: verbose
    type: boolean
    inputBinding: { position: 1, prefix: "-v" }
outputs: []
"#,
        );
        let mut inputs = BTreeMap::new();
        inputs.insert("verbose".to_string(), Value::Bool(true));
        assert_eq!(build_command(&doc, &inputs).unwrap(), vec!["tool", "-v"]);

        inputs.insert("verbose".to_string(), Value::Bool(false));
        assert_eq!(build_command(&doc, &inputs).unwrap(), vec!["tool"]);
    }

    #[test]
    fn file_value_emits_path() {
        let doc = tool(
            r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: [cat]
inputs:
  - id: infile
    type: File
    inputBinding: { position: 1 }
outputs: []
"#,
        );
        let mut inputs = BTreeMap::new();
        let mut file = BTreeMap::new();
        file.insert("class".to_string(), Value::Str("File".into()));
        file.insert("path".to_string(), Value::Str("/a/b.fa".into()));
        inputs.insert("infile".to_string(), Value::Map(file));
        assert_eq!(build_command(&doc, &inputs).unwrap(), vec!["cat", "/a/b.fa"]);
    }

    #[test]
    fn array_with_item_separator_joins_into_one_part() {
        let doc = tool(
            r#"
cwlVersion: v1.2
class: CommandLineTool
baseCommand: [tool]
inputs:
  - id: tags
    type: string[]
    inputBinding: { position: 1, itemSeparator: "," }
outputs: []
"#,
        );
        let mut inputs = BTreeMap::new();
        inputs.insert(
            "tags".to_string(),
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
        );
        assert_eq!(build_command(&doc, &inputs).unwrap(), vec!["tool", "a,b"]);
    }
}
