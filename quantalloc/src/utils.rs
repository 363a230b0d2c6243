use crate::header::HEADER_SIZE;

/// Number of quanta needed to hold `bytes` of payload plus the block header.
///
/// Returns `None` if the count does not fit in a header's size field.
#[inline]
pub fn quanta_for(bytes: usize) -> Option<u32> {
    u32::try_from(bytes.div_ceil(HEADER_SIZE) + 1).ok()
}

/// Byte length of `quanta` quanta.
#[inline]
pub fn quanta_to_bytes(quanta: u32) -> Option<usize> {
    usize::try_from(quanta).ok()?.checked_mul(HEADER_SIZE)
}

/// Payload bytes available in a block of `quanta` quanta.
#[inline]
pub const fn payload_capacity(quanta: u32) -> usize {
    (quanta as usize).saturating_sub(1) * HEADER_SIZE
}
