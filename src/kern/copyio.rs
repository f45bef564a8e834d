//! Copyin/Copyout - moving message bytes across the caller boundary
//!
//! The port core only ever sees caller memory through these helpers. A
//! system-call layer validates user pointers and hands the subsystem plain
//! slices; the helpers gather vectored segments on the way in and truncate
//! on the way out.

use alloc::vec::Vec;

/// Copy operation result (bytes transferred)
pub type CopyResult = Result<usize, CopyError>;

/// Errors that can occur during copy operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CopyError {
    /// Bad caller buffer
    BadAddress = -1,
    /// Kernel buffer could not be allocated
    OutOfMemory = -2,
    /// Size too large
    TooLarge = -4,
}

/// Total length of a vectored payload, rejecting overflow
pub fn segments_len(segments: &[&[u8]]) -> CopyResult {
    segments
        .iter()
        .try_fold(0usize, |total, seg| total.checked_add(seg.len()))
        .ok_or(CopyError::TooLarge)
}

/// Gather `segments` into a freshly allocated buffer of at most `limit` bytes
pub fn copyin_segments(segments: &[&[u8]], limit: usize) -> Result<Vec<u8>, CopyError> {
    let len = segments_len(segments)?;
    if len > limit {
        return Err(CopyError::TooLarge);
    }

    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| CopyError::OutOfMemory)?;
    for seg in segments {
        buffer.extend_from_slice(seg);
    }
    Ok(buffer)
}

/// Copy as much of `src` as fits into `dst`; the rest is dropped
pub fn copyout(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copyin_gathers_segments() {
        let data = copyin_segments(&[b"ab", b"", b"cde"], 16).unwrap();
        assert_eq!(data, b"abcde");
    }

    #[test]
    fn test_copyin_rejects_oversized() {
        assert_eq!(
            copyin_segments(&[b"abc", b"def"], 5),
            Err(CopyError::TooLarge)
        );
        assert_eq!(copyin_segments(&[b"abc", b"de"], 5).unwrap().len(), 5);
    }

    #[test]
    fn test_copyout_truncates() {
        let mut small = [0u8; 3];
        assert_eq!(copyout(b"hello", &mut small), 3);
        assert_eq!(&small, b"hel");

        let mut empty = [0u8; 0];
        assert_eq!(copyout(b"hello", &mut empty), 0);

        let mut large = [0u8; 8];
        assert_eq!(copyout(b"hi", &mut large), 2);
        assert_eq!(&large[..2], b"hi");
    }
}
