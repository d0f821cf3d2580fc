//! Offset alignment utilities.

/// Round `offset` up to the next multiple of `align`.
///
/// Works for any nonzero alignment; powers of two take the mask path.
/// Returns `None` on overflow or when `align` is zero.
#[inline]
pub(crate) fn align_up(offset: u64, align: u64) -> Option<u64> {
    if align == 0 {
        return None;
    }
    if align.is_power_of_two() {
        let mask = align - 1;
        return offset.checked_add(mask).map(|v| v & !mask);
    }
    match offset % align {
        0 => Some(offset),
        rem => offset.checked_add(align - rem),
    }
}
