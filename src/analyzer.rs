//! Workflow analyzer (C4): dependency extraction, structural validation
//! (duplicate ids, dangling sources, cycles), and run resolution.

use std::collections::{HashMap, HashSet};

use crate::document::{Document, RunRef};
use crate::error::{WorkflowError, WorkflowResult};

/// A dependency edge: `step` depends on the output of `depends_on` (or, if
/// `depends_on` is `None`, on a workflow-level input named by `input_name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub step: String,
    pub depends_on_step: Option<String>,
    pub source_output: String,
}

/// Parses a `source:` reference (`stepId/outputId`, or a bare workflow input
/// name, with an optional leading `#`) into its parts.
pub fn parse_source_ref(source: &str) -> (Option<String>, String) {
    let source = source.strip_prefix('#').unwrap_or(source);
    match source.split_once('/') {
        Some((step, output)) => (Some(step.to_string()), output.to_string()),
        None => (None, source.to_string()),
    }
}

/// Extracts every step-to-step dependency implied by `in:`/`source:` entries.
/// Sources with no `/` name a workflow input, not a step, and are excluded.
pub fn extract_dependencies(doc: &Document) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for step in &doc.steps {
        for input in &step.inputs {
            for source in &input.source {
                let (dep_step, output) = parse_source_ref(source);
                if let Some(dep_step) = dep_step {
                    deps.push(Dependency {
                        step: step.id.clone(),
                        depends_on_step: Some(dep_step),
                        source_output: output,
                    });
                }
            }
        }
    }
    deps
}

/// Validates a Workflow document's structure. Returns every violation found
/// rather than stopping at the first.
pub fn validate_workflow(doc: &Document) -> WorkflowResult<()> {
    let mut violations = Vec::new();

    let mut seen = HashSet::new();
    for step in &doc.steps {
        if !seen.insert(step.id.as_str()) {
            violations.push(format!("duplicate step id: {}", step.id));
        }
    }

    let step_ids: HashSet<&str> = doc.steps.iter().map(|s| s.id.as_str()).collect();
    let input_ids: HashSet<&str> = doc.inputs.iter().map(|i| i.id.as_str()).collect();
    for step in &doc.steps {
        for input in &step.inputs {
            for source in &input.source {
                let (dep_step, output) = parse_source_ref(source);
                match dep_step {
                    Some(dep_step) => {
                        if !step_ids.contains(dep_step.as_str()) {
                            violations.push(format!(
                                "step {} references unknown step {} in source {}",
                                step.id, dep_step, source
                            ));
                        }
                    }
                    None => {
                        if !input_ids.contains(output.as_str()) {
                            violations.push(format!(
                                "step {} references unknown workflow input {}",
                                step.id, output
                            ));
                        }
                    }
                }
            }
        }
    }

    for output in &doc.outputs {
        if let Some(source) = &output.output_source {
            let (dep_step, _) = parse_source_ref(source);
            if let Some(dep_step) = dep_step {
                if !step_ids.contains(dep_step.as_str()) {
                    violations.push(format!(
                        "workflow output {} references unknown step {}",
                        output.id, dep_step
                    ));
                }
            }
        }
    }

    if let Err(WorkflowError::Validation(mut cycle_violations)) = detect_cycles(doc) {
        violations.append(&mut cycle_violations);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::Validation(violations))
    }
}

/// Tri-color (white/grey/black) DFS cycle detection. On finding a cycle,
/// the error text begins with "cycle" and names the concrete path.
fn detect_cycles(doc: &Document) -> WorkflowResult<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }

    let adjacency: HashMap<String, Vec<String>> = doc
        .steps
        .iter()
        .map(|step| {
            let mut deps = HashSet::new();
            for input in &step.inputs {
                for source in &input.source {
                    let (dep_step, _) = parse_source_ref(source);
                    if let Some(dep_step) = dep_step {
                        deps.insert(dep_step);
                    }
                }
            }
            (step.id.clone(), deps)
        })
        .map(|(id, deps)| (id, deps.into_iter().collect::<Vec<_>>()))
        .collect();

    let mut colors: HashMap<String, Color> = doc.steps.iter().map(|s| (s.id.clone(), Color::White)).collect();
    let mut path: Vec<String> = Vec::new();

    fn visit(
        node: &str,
        adjacency: &HashMap<String, Vec<String>>,
        colors: &mut HashMap<String, Color>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        colors.insert(node.to_string(), Color::Grey);
        path.push(node.to_string());
        if let Some(deps) = adjacency.get(node) {
            for dep in deps {
                match colors.get(dep.as_str()).copied().unwrap_or(Color::Black) {
                    Color::White => {
                        if let Some(cycle) = visit(dep, adjacency, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Grey => {
                        let mut cycle = path.clone();
                        cycle.push(dep.clone());
                        return Some(cycle);
                    }
                    Color::Black => {}
                }
            }
        }
        path.pop();
        colors.insert(node.to_string(), Color::Black);
        None
    }

    for step in &doc.steps {
        if colors.get(step.id.as_str()).copied() == Some(Color::White) {
            if let Some(cycle) = visit(step.id.as_str(), &adjacency, &mut colors, &mut path) {
                return Err(WorkflowError::Validation(vec![format!(
                    "cycle detected: {}",
                    cycle.join(" -> ")
                )]));
            }
        }
    }
    Ok(())
}

/// Resolves a step's `run:` reference to a concrete [`Document`]. Inline
/// documents resolve immediately; path references are resolved through
/// `loader`, which the caller supplies (typically filesystem or an
/// in-memory fixture map in tests).
pub fn resolve_run<F>(run: &RunRef, loader: F) -> WorkflowResult<Document>
where
    F: FnOnce(&str) -> WorkflowResult<Document>,
{
    match run {
        RunRef::Inline(doc) => Ok((**doc).clone()),
        RunRef::Path(path) => loader(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document;

    fn doc(yaml: &str) -> Document {
        parse_document(yaml).unwrap()
    }

    #[test]
    fn extracts_step_to_step_dependency() {
        let d = doc(
            r#"
cwlVersion: v1.2
class: Workflow
inputs: []
outputs: []
steps:
  - id: a
    run: a.cwl
    in: []
    out: [out]
  - id: b
    run: b.cwl
    in:
      - id: in
        source: [a/out]
    out: [out]
"#,
        );
        let deps = extract_dependencies(&d);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].step, "b");
        assert_eq!(deps[0].depends_on_step.as_deref(), Some("a"));
        assert_eq!(deps[0].source_output, "out");
    }

    #[test]
    fn bare_source_is_not_a_step_dependency() {
        let d = doc(
            r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: infile
    type: File
outputs: []
steps:
  - id: a
    run: a.cwl
    in:
      - id: in
        source: [infile]
    out: [out]
"#,
        );
        assert!(extract_dependencies(&d).is_empty());
    }

    #[test]
    fn detects_two_step_cycle() {
        let d = doc(
            r#"
cwlVersion: v1.2
class: Workflow
inputs: []
outputs: []
steps:
  - id: step1
    run: a.cwl
    in:
      - id: in
        source: [step2/out]
    out: [out]
  - id: step2
    run: b.cwl
    in:
      - id: in
        source: [step1/out]
    out: [out]
"#,
        );
        let err = validate_workflow(&d).unwrap_err();
        match err {
            WorkflowError::Validation(violations) => {
                assert!(violations.iter().any(|v| v.starts_with("cycle")));
            }
            _ => panic!("expected validation error"),
        }
    }

    #[test]
    fn detects_dangling_source() {
        let d = doc(
            r#"
cwlVersion: v1.2
class: Workflow
inputs: []
outputs: []
steps:
  - id: a
    run: a.cwl
    in:
      - id: in
        source: [missing/out]
    out: [out]
"#,
        );
        let err = validate_workflow(&d).unwrap_err();
        match err {
            WorkflowError::Validation(violations) => assert!(!violations.is_empty()),
            _ => panic!("expected validation error"),
        }
    }
}
