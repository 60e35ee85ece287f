//! Longest increasing subsequence.

/// Returns the indices into `seq` of one longest strictly increasing
/// subsequence.
///
/// Patience sorting in O(n log n). Each element replaces the first pile top
/// that is not smaller than it (lower bound), which makes the result
/// deterministic for a given input.
pub fn longest_increasing_subsequence<T: Ord>(seq: &[T]) -> Vec<usize> {
    // tails[k]: index of the smallest tail of an increasing run of length k + 1
    let mut tails: Vec<usize> = Vec::with_capacity(seq.len());
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, value) in seq.iter().enumerate() {
        let pos = tails.partition_point(|&t| seq[t] < *value);
        if pos > 0 {
            prev[i] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(i);
        } else {
            tails[pos] = i;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.push(i);
        cursor = prev[i];
    }
    result.reverse();
    result
}
