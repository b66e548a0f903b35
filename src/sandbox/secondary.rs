//! Secondary file resolver: turns a `secondaryFiles` pattern entry plus a
//! primary file's basename into the secondary file's expected basename.
//!
//! A leading `^` pops one extension off the primary file's basename before
//! appending the remainder of the pattern (e.g. primary `reads.fq.gz` with
//! pattern `^.bai` resolves against `reads.fq`, not `reads.fq.gz`).

pub fn resolve_secondary_file(primary_basename: &str, pattern: &str) -> String {
    let mut base = primary_basename.to_string();
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix('^') {
        pattern = rest;
        if let Some(i) = base.rfind('.') {
            base.truncate(i);
        }
    }
    format!("{}{}", base, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_suffix_appends_to_basename() {
        assert_eq!(resolve_secondary_file("reads.bam", ".bai"), "reads.bam.bai");
    }

    #[test]
    fn caret_pops_one_extension() {
        assert_eq!(resolve_secondary_file("reads.fq.gz", "^.bai"), "reads.fq.bai");
    }

    #[test]
    fn double_caret_pops_two_extensions() {
        assert_eq!(resolve_secondary_file("reads.fq.gz", "^^.bai"), "reads.bai");
    }
}
