//! Alignment arithmetic and little-endian buffer helpers.

use super::CanonicalAbiError;

/// Align a value up to the nearest multiple of alignment.
///
/// `align` must be a power of two.
#[inline]
pub fn align_to(val: usize, align: usize) -> usize {
    (val + align - 1) & !(align - 1)
}

/// Safe buffer slice read helper.
#[inline]
pub fn read_slice(buffer: &[u8], start: usize, len: usize) -> Result<&[u8], CanonicalAbiError> {
    let buf_len = buffer.len();
    buffer
        .get(start..start + len)
        .ok_or(CanonicalAbiError::BufferTooSmall {
            needed: start + len,
            available: buf_len,
        })
}

/// Read exactly `N` bytes at `start`.
#[inline]
pub fn read_array<const N: usize>(
    buffer: &[u8],
    start: usize,
) -> Result<[u8; N], CanonicalAbiError> {
    let mut out = [0u8; N];
    out.copy_from_slice(read_slice(buffer, start, N)?);
    Ok(out)
}

/// Safe buffer slice write helper.
#[inline]
pub fn write_slice(buffer: &mut [u8], start: usize, data: &[u8]) -> Result<(), CanonicalAbiError> {
    let end = start + data.len();
    let len = buffer.len();
    buffer
        .get_mut(start..end)
        .ok_or(CanonicalAbiError::BufferTooSmall {
            needed: end,
            available: len,
        })?
        .copy_from_slice(data);
    Ok(())
}
