//! Scatter expansion (C6): turns a step's scattered input arrays into the
//! concrete set of per-instance index tuples the DAG builder will emit one
//! node per.
//!
//! Cardinality (the "target_n" of instances to launch) is the length of
//! `flat_crossproduct`/`dotproduct`/`nested_crossproduct`'s expansion,
//! computed up front rather than tracked incrementally, since CWL scatter
//! cardinality is known before dispatch.

use crate::document::ScatterMethod;
use crate::error::{WorkflowError, WorkflowResult};

/// One point in the scatter space: the per-input index selected for this
/// instance, in the same order as the scattered input names.
pub type ScatterIndex = Vec<i64>;

/// Expands a step's scattered inputs into the list of index tuples to run.
///
/// `lengths` gives the array length of each scattered input, in the same
/// order the step's `scatter:` field names them. An empty `lengths` list
/// (no scatter) is not expected here; callers only invoke this when a step
/// actually scatters.
pub fn expand_scatter(method: ScatterMethod, lengths: &[usize]) -> WorkflowResult<Vec<ScatterIndex>> {
    match method {
        ScatterMethod::Dotproduct => dotproduct(lengths),
        ScatterMethod::FlatCrossproduct => Ok(flat_crossproduct(lengths)),
        ScatterMethod::NestedCrossproduct => Ok(nested_crossproduct(lengths)),
    }
}

/// `dotproduct`: all scattered arrays must share the same length N; the
/// result is N tuples `(0), (1), ..., (N-1)` repeated across every
/// dimension (instance i reads index i from every scattered input).
pub fn dotproduct(lengths: &[usize]) -> WorkflowResult<Vec<ScatterIndex>> {
    if lengths.is_empty() {
        return Ok(vec![]);
    }
    let n = lengths[0];
    if lengths.iter().any(|&l| l != n) {
        return Err(WorkflowError::ScatterArityMismatch(format!(
            "dotproduct requires equal-length arrays, got lengths {:?}",
            lengths
        )));
    }
    Ok((0..n as i64).map(|i| vec![i; lengths.len()]).collect())
}

/// `flat_crossproduct`: the full mixed-radix cartesian product of the
/// scattered arrays, enumerated in lexicographic order with the last
/// dimension varying fastest, flattened into a single list of instances.
///
/// Length is the product of all input lengths; a zero-length input yields
/// zero instances.
pub fn flat_crossproduct(lengths: &[usize]) -> Vec<ScatterIndex> {
    nested_crossproduct(lengths)
}

/// `nested_crossproduct`: the same enumeration order as `flat_crossproduct`
/// — only the *gathering* shape differs downstream (nested arrays per
/// dimension instead of one flat array), so the index tuples produced here
/// are identical.
pub fn nested_crossproduct(lengths: &[usize]) -> Vec<ScatterIndex> {
    if lengths.is_empty() {
        return vec![];
    }
    if lengths.iter().any(|&l| l == 0) {
        return vec![];
    }
    let mut tuples = vec![vec![]];
    for &len in lengths {
        let mut next = Vec::with_capacity(tuples.len() * len);
        for tuple in &tuples {
            for i in 0..len as i64 {
                let mut t = tuple.clone();
                t.push(i);
                next.push(t);
            }
        }
        tuples = next;
    }
    tuples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotproduct_equal_lengths() {
        let result = dotproduct(&[3, 3]).unwrap();
        assert_eq!(result, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
    }

    #[test]
    fn dotproduct_mismatched_lengths_errors() {
        let err = dotproduct(&[3, 2]).unwrap_err();
        assert!(matches!(err, WorkflowError::ScatterArityMismatch(_)));
    }

    #[test]
    fn flat_crossproduct_length_is_product_of_lengths() {
        let result = flat_crossproduct(&[2, 3]);
        assert_eq!(result.len(), 6);
        assert_eq!(result[0], vec![0, 0]);
        assert_eq!(result[5], vec![1, 2]);
    }

    #[test]
    fn nested_and_flat_share_enumeration_order() {
        assert_eq!(flat_crossproduct(&[2, 2]), nested_crossproduct(&[2, 2]));
    }

    #[test]
    fn empty_scatter_array_yields_zero_tuples() {
        assert_eq!(flat_crossproduct(&[3, 0]), Vec::<ScatterIndex>::new());
        assert_eq!(dotproduct(&[0]).unwrap(), Vec::<ScatterIndex>::new());
    }

    #[test]
    fn single_dimension_crossproduct_is_identity() {
        assert_eq!(flat_crossproduct(&[4]), vec![vec![0], vec![1], vec![2], vec![3]]);
    }
}
