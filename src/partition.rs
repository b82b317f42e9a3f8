//! In-place partitioning of observation-index slices.
//!
//! Splitting a node re-orders the slice of the tree's shared index buffer
//! that the node owns, so that every index whose predictor value fails the
//! rule lands in the low subrange and every index that satisfies it lands in
//! the high subrange. The split point is returned; no copies are made.
//!
//! Two entry points exist. Range mode is used at the top of a tree, where the
//! buffer is free to be rewritten: it fills the slice with `0..n` in
//! ascending order and partitions the positions themselves. Indices mode
//! permutes whatever index values the slice already holds.
//!
//! The scalar Hoare two-pointer partition is the semantic reference. A
//! blocked variant processes eight elements at a time through packed compare
//! masks; it must produce the identical split point and a permutation of the
//! same multiset, and no caller can distinguish it from the scalar path.

/// Minimum slice length before the blocked path pays for itself.
const BLOCKED_PARTITION_CUTOFF: usize = 32;

const LANES: usize = 8;

/// Partitions a slice whose contents are rewritten to `0..n` first.
///
/// `x` is a full quantized predictor column; `indices` is filled with the
/// ascending identity and then reordered so positions with
/// `x[i] <= split_index` precede those with `x[i] > split_index`. Returns the
/// goes-left count.
pub fn partition_range(x: &[u16], split_index: u16, indices: &mut [usize]) -> usize {
    for (slot, i) in indices.iter_mut().zip(0..) {
        *slot = i;
    }
    partition_indices(x, split_index, indices)
}

/// Partitions an existing permutation of index values in place.
///
/// Reorders `indices` so every `i` with `x[i] <= split_index` precedes every
/// `i` with `x[i] > split_index`, and returns the goes-left count. The output
/// is a permutation of the input; intra-partition order is unspecified.
pub fn partition_indices(x: &[u16], split_index: u16, indices: &mut [usize]) -> usize {
    if indices.len() >= BLOCKED_PARTITION_CUTOFF {
        partition_indices_blocked(x, split_index, indices)
    } else {
        partition_indices_scalar(x, split_index, indices)
    }
}

/// Range-mode partition under an arbitrary goes-right predicate.
///
/// Categorical rules branch on bitmask membership rather than a threshold
/// compare, so they cannot use the packed path.
pub fn partition_range_by<F>(x: &[u16], indices: &mut [usize], goes_right: F) -> usize
where
    F: Fn(u16) -> bool,
{
    for (slot, i) in indices.iter_mut().zip(0..) {
        *slot = i;
    }
    partition_indices_by(x, indices, goes_right)
}

/// Indices-mode partition under an arbitrary goes-right predicate.
pub fn partition_indices_by<F>(x: &[u16], indices: &mut [usize], goes_right: F) -> usize
where
    F: Fn(u16) -> bool,
{
    if indices.is_empty() {
        return 0;
    }

    let mut lh = 0;
    let mut rh = indices.len() - 1;

    loop {
        while !goes_right(x[indices[lh]]) && lh < rh {
            lh += 1;
        }
        while goes_right(x[indices[rh]]) && lh < rh {
            rh -= 1;
        }
        if lh >= rh {
            break;
        }

        indices.swap(lh, rh);
        lh += 1;
        rh -= 1;
    }

    if !goes_right(x[indices[lh]]) {
        lh + 1
    } else {
        lh
    }
}

/// Scalar Hoare two-pointer partition; the reference implementation.
pub(crate) fn partition_indices_scalar(
    x: &[u16],
    split_index: u16,
    indices: &mut [usize],
) -> usize {
    partition_indices_by(x, indices, |value| value > split_index)
}

/// Packed mask of the eight elements at `indices[offset..offset + 8]`:
/// bit `k` is set when element `k` goes right.
#[inline]
fn goes_right_mask(x: &[u16], indices: &[usize], offset: usize, split_index: u16) -> u8 {
    let mut mask = 0u8;
    for k in 0..LANES {
        mask |= u8::from(x[indices[offset + k]] > split_index) << k;
    }
    mask
}

/// Blocked partition processing eight elements per compare.
///
/// Maintains one eight-wide block at each end of the slice. Blocks whose mask
/// shows no misplaced element are skipped whole; otherwise misplaced elements
/// from the two ends are paired off and swapped, one bit at a time. The
/// leftover window in the middle is finished by the scalar partition, which
/// guarantees the same split point as running the scalar path outright.
pub(crate) fn partition_indices_blocked(
    x: &[u16],
    split_index: u16,
    indices: &mut [usize],
) -> usize {
    let n = indices.len();
    debug_assert!(n >= 2 * LANES);

    // lo/hi are the start positions of the current left and right blocks.
    let mut lo = 0;
    let mut hi = n - LANES;
    let mut lo_mask = goes_right_mask(x, indices, lo, split_index);
    let mut hi_mask = !goes_right_mask(x, indices, hi, split_index);

    loop {
        while lo_mask == 0 && lo + 2 * LANES <= hi {
            lo += LANES;
            lo_mask = goes_right_mask(x, indices, lo, split_index);
        }
        while hi_mask == 0 && lo + 2 * LANES <= hi {
            hi -= LANES;
            hi_mask = !goes_right_mask(x, indices, hi, split_index);
        }
        if lo_mask == 0 || hi_mask == 0 {
            break;
        }

        let misplaced_left = lo + lo_mask.trailing_zeros() as usize;
        let misplaced_right = hi + hi_mask.trailing_zeros() as usize;
        indices.swap(misplaced_left, misplaced_right);
        lo_mask &= lo_mask - 1;
        hi_mask &= hi_mask - 1;
    }

    // Everything below lo goes left and everything at or above hi + LANES
    // goes right; the window in between may still be mixed.
    let window_end = hi + LANES;
    lo + partition_indices_scalar(x, split_index, &mut indices[lo..window_end])
}
