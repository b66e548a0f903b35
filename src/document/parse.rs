//! Parses CWL documents from YAML or JSON text and computes their content
//! hash, via `serde_yaml`/`serde_json`.

use sha2::{Digest, Sha256};

use super::model::Document;
use crate::error::{WorkflowError, WorkflowResult};

/// Parses a CWL document from raw text, auto-detecting YAML vs JSON.
///
/// CWL documents are canonically YAML but JSON is a valid subset, so we try
/// YAML first (it accepts JSON too) and only report the YAML error if that
/// fails outright.
pub fn parse_document(text: &str) -> WorkflowResult<Document> {
    let mut doc: Document = serde_yaml::from_str(text)
        .map_err(|e| WorkflowError::Parse(format!("failed to parse document: {}", e)))?;
    doc.content_hash = Some(content_hash(text));
    Ok(doc)
}

/// `sha256:<hex>` content hash of the raw document text, used as a cache /
/// dedup key for `GetWorkflowByHash`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW_YAML: &str = r#"
cwlVersion: v1.2
class: Workflow
inputs:
  - id: infile
    type: File
outputs:
  - id: result
    type: File
    outputSource: step1/out
steps:
  - id: step1
    run: tool.cwl
    in:
      - id: in
        source: [infile]
    out: [out]
"#;

    #[test]
    fn parses_minimal_workflow() {
        let doc = parse_document(WORKFLOW_YAML).unwrap();
        assert!(doc.is_workflow());
        assert_eq!(doc.cwl_version.to_string(), "v1.2");
        assert_eq!(doc.steps.len(), 1);
        assert!(doc.content_hash.unwrap().starts_with("sha256:"));
    }

    #[test]
    fn content_hash_is_stable_for_identical_text() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = parse_document("cwlVersion: [unterminated").unwrap_err();
        assert!(matches!(err, WorkflowError::Parse(_)));
    }
}
