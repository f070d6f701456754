//! This file contains the helper functions for the arena. These are
//! functions that don't particularly belong to any concrete module of the crate.

/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two (see [`is_valid_alignment`]). Returns
/// `None` if rounding up overflows the address space, which can only happen
/// for addresses right at the top of it.
#[inline]
pub(crate) fn align_up(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(is_valid_alignment(alignment));
    let mask = alignment - 1;
    to_be_aligned.checked_add(mask).map(|n| n & !mask)
}

/// An alignment is valid when it is non zero and a power of two.
#[inline]
pub(crate) fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two()
}
