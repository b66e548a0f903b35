//! Glob evaluator: resolves a CWL `outputBinding.glob` pattern against the
//! set of files produced by a tool invocation.

use globset::Glob;

use crate::error::{WorkflowError, WorkflowResult};

/// Returns every entry in `candidates` matching `pattern`. `pattern` is a
/// single shell-style glob, exactly as CWL's `outputBinding.glob` entries
/// are specified (no brace expansion, no recursive `**` required by the
/// spec's subset).
pub fn match_glob(pattern: &str, candidates: &[String]) -> WorkflowResult<Vec<String>> {
    let glob = Glob::new(pattern)
        .map_err(|e| WorkflowError::Internal(format!("invalid glob pattern {}: {}", pattern, e)))?
        .compile_matcher();
    Ok(candidates.iter().filter(|c| glob.is_match(c)).cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_extension_glob() {
        let candidates = vec!["a.txt".to_string(), "b.bam".to_string(), "c.txt".to_string()];
        let matched = match_glob("*.txt", &candidates).unwrap();
        assert_eq!(matched, vec!["a.txt", "c.txt"]);
    }
}
