//! Argument validation for the offset/length calling surface.
//!
//! Callers marshaling from a host language hand over a possibly-absent buffer plus signed offsets
//! and lengths. These helpers turn that triple into a checked `Range` or an [`Error`] without
//! touching the buffer.
use core::ops::Range;

use crate::error::{Error, Result};

/// Validates `offset..offset + length` against a buffer of `len` bytes.
///
/// `offset` may equal `len` only when `length` is zero.
pub(crate) fn checked_range(len: usize, offset: isize, length: isize) -> Result<Range<usize>> {
    let start = usize::try_from(offset).map_err(|_| Error::OutOfRange("offset"))?;
    if start > len {
        return Err(Error::OutOfRange("offset"));
    }

    let n = usize::try_from(length).map_err(|_| Error::OutOfRange("length"))?;
    match start.checked_add(n) {
        Some(end) if end <= len => Ok(start..end),
        _ => Err(Error::OutOfRange("length")),
    }
}

/// Validates matching input and output ranges for an XOR operation.
///
/// When `length` is non-zero both offsets must point inside their buffers; a zero `length` only
/// requires the offsets to be non-negative and no further than the end.
pub(crate) fn checked_pair(
    input_len: usize,
    input_offset: isize,
    output_len: usize,
    output_offset: isize,
    length: isize,
) -> Result<(Range<usize>, Range<usize>)> {
    let n = usize::try_from(length).map_err(|_| Error::OutOfRange("length"))?;
    let input_start = usize::try_from(input_offset).map_err(|_| Error::OutOfRange("input_offset"))?;
    let output_start =
        usize::try_from(output_offset).map_err(|_| Error::OutOfRange("output_offset"))?;

    if input_start > input_len || (n > 0 && input_start >= input_len) {
        return Err(Error::OutOfRange("input_offset"));
    }
    if output_start > output_len || (n > 0 && output_start >= output_len) {
        return Err(Error::OutOfRange("output_offset"));
    }

    let input_end = input_start.checked_add(n).filter(|&end| end <= input_len);
    let output_end = output_start.checked_add(n).filter(|&end| end <= output_len);
    match (input_end, output_end) {
        (Some(input_end), Some(output_end)) => {
            Ok((input_start..input_end, output_start..output_end))
        }
        _ => Err(Error::OutOfRange("length")),
    }
}
