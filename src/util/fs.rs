//! Filesystem helpers for sparse-file operations.
//!
//! [`punch_hole`] wraps `fallocate(FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE)`,
//! the only primitive that deallocates a byte range while keeping the
//! logical file size. [`is_zeroed`] is the check used to recognize ranges
//! that were already punched on a previous run.

use std::fs::File;

use crate::PluckError;

/// Deallocate `[offset, offset + length)` of `file`, keeping its size.
#[cfg(target_os = "linux")]
pub fn punch_hole(file: &File, offset: u64, length: u64) -> Result<(), PluckError> {
    use std::os::unix::io::AsRawFd;

    if length == 0 {
        return Ok(());
    }
    let result = unsafe {
        libc::fallocate(
            file.as_raw_fd(),
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            length as libc::off_t,
        )
    };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        return Err(PluckError::TrimFailed(format!(
            "fallocate failed at offset {} length {}: {}",
            offset, length, err
        )));
    }
    Ok(())
}

/// Deallocate `[offset, offset + length)` of `file`, keeping its size.
#[cfg(not(target_os = "linux"))]
pub fn punch_hole(_file: &File, offset: u64, length: u64) -> Result<(), PluckError> {
    Err(PluckError::TrimFailed(format!(
        "hole punching is not supported on this platform (offset {} length {})",
        offset, length
    )))
}

/// Whether every byte of `data` is zero.
pub fn is_zeroed(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}
