//! Physical placement of file data on the block device.

/// A maximal run of file blocks stored contiguously on the device.
///
/// Offsets are block indices. The block size is carried per file, not here,
/// because children of one directory may live on filesystems with different
/// block sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// Index of the first block within the file.
    pub logical_offset: i32,
    /// Index of the first block on the device.
    pub physical_offset: i32,
    /// Length of the run in blocks.
    pub block_count: i32,
}

impl Extent {
    pub fn new(logical_offset: i32, physical_offset: i32, block_count: i32) -> Self {
        Self {
            logical_offset,
            physical_offset,
            block_count,
        }
    }

    /// Size of this extent in bytes for the given block size.
    pub fn byte_len(&self, block_size: u32) -> u64 {
        self.block_count as u64 * block_size as u64
    }
}
