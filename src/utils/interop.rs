//! Provide interoperability with fabric C return values.

use crate::error::FabricError;

/// Converts a fabric C return value to a `Result<(), FabricError>`.
#[inline(always)]
pub(crate) fn from_kfi_ret(ret: i32) -> Result<(), FabricError> {
    if ret == 0 {
        Ok(())
    } else {
        Err(FabricError::from_raw(ret))
    }
}

/// Converts a fabric `ssize_t` return value to a byte count, treating any
/// negative value as an encoded [`FabricError`].
#[inline(always)]
pub(crate) fn len_from_kfi_ret(ret: isize) -> Result<usize, FabricError> {
    if ret >= 0 {
        Ok(ret as usize)
    } else {
        Err(FabricError::from_raw(ret as i32))
    }
}
