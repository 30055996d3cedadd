//! `ArrayBuffer` backing storage.

use alloc::vec::Vec;

use crate::error::{JsError, JsResult};

/// Source of `ArrayBuffer` backing storage.
///
/// Every buffer handed out must be zero-filled.
pub trait BufferAllocator {
    fn allocate(&self, len: usize) -> JsResult<Vec<u8>>;
}

/// Heap allocator with a per-buffer size cap.
#[derive(Debug, Clone, Copy)]
pub struct ZeroedAllocator {
    limit: usize,
}

impl ZeroedAllocator {
    pub fn new(limit: usize) -> Self {
        ZeroedAllocator { limit }
    }
}

impl BufferAllocator for ZeroedAllocator {
    fn allocate(&self, len: usize) -> JsResult<Vec<u8>> {
        if len > self.limit {
            return Err(JsError::range("Array buffer allocation failed"));
        }
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| JsError::range("Array buffer allocation failed"))?;
        data.resize(len, 0);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_filled() {
        let data = ZeroedAllocator::new(1024).allocate(64).unwrap();
        assert_eq!(data.len(), 64);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn over_limit_is_a_range_error() {
        let err = ZeroedAllocator::new(16).allocate(17).unwrap_err();
        assert!(matches!(err, JsError::RangeError(ref m) if m == "Array buffer allocation failed"));
    }
}
