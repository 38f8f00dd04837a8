//! Inversion counting for order-fidelity analysis.

/// Number of pairs `(i, j)` with `i < j` and `values[i] > values[j]`.
///
/// Bottom-up merge sort: every time an element of the right run is emitted ahead of the
/// remaining left run, it forms an inversion with each of those left elements.
/// O(n log n) time, one scratch buffer.
pub fn count_inversions(values: &[i64]) -> u64 {
    let n = values.len();
    if n < 2 {
        return 0;
    }
    let mut src = values.to_vec();
    let mut dst = vec![0i64; n];
    let mut inversions = 0u64;
    let mut width = 1;
    while width < n {
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j, mut k) = (start, mid, start);
            while i < mid && j < end {
                if src[i] <= src[j] {
                    dst[k] = src[i];
                    i += 1;
                } else {
                    dst[k] = src[j];
                    inversions += (mid - i) as u64;
                    j += 1;
                }
                k += 1;
            }
            let left_rest = mid - i;
            dst[k..k + left_rest].copy_from_slice(&src[i..mid]);
            k += left_rest;
            dst[k..k + (end - j)].copy_from_slice(&src[j..end]);
            start += 2 * width;
        }
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    inversions
}

pub fn total_pairs(n: usize) -> u64 {
    let n = n as u64;
    n * n.saturating_sub(1) / 2
}

/// Share of pairs kept in order, in percent. No pairs means nothing could be out of order.
pub fn order_accuracy(inversions: u64, pairs: u64) -> f64 {
    if pairs == 0 {
        return 100.0;
    }
    100.0 * pairs.saturating_sub(inversions) as f64 / pairs as f64
}
