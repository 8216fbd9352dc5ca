//! Content checksums using xxHash64
//!
//! xxHash64 is a fast non-cryptographic hash, good enough to detect bit rot
//! in a media library without slowing the scan down to hash speed. The
//! streaming form lets the scanner feed one extent at a time, in logical
//! file order, and still end up with the hash of the whole file.

use xxhash_rust::xxh64::{xxh64, Xxh64};

/// Seed for every checksum computed by this tool.
///
/// Changing it invalidates all previously recorded checksums, so it is fixed
/// forever.
pub const CHECKSUM_SEED: u64 = 0x0974_7B28_4209_3420;

/// Compute the checksum of a complete in-memory buffer.
pub fn checksum_of(content: &[u8]) -> u64 {
    xxh64(content, CHECKSUM_SEED)
}

/// Create a streaming hasher to be fed extent by extent.
pub fn streaming() -> Xxh64 {
    Xxh64::new(CHECKSUM_SEED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let data = b"Hello, World!";
        assert_eq!(checksum_of(data), checksum_of(data));
        assert_ne!(checksum_of(data), checksum_of(b"Hello, World?"));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0u32..100_000).map(|i| (i % 251) as u8).collect();
        let mut hasher = streaming();
        for chunk in data.chunks(4096) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.digest(), checksum_of(&data));
    }

    #[test]
    fn test_uneven_split_matches_one_shot() {
        let data = b"a media file split across two extents";
        let mut hasher = streaming();
        hasher.update(&data[..7]);
        hasher.update(&data[7..]);
        assert_eq!(hasher.digest(), checksum_of(data));
    }

    #[test]
    fn test_empty_content() {
        let mut hasher = streaming();
        hasher.update(b"");
        assert_eq!(hasher.digest(), checksum_of(b""));
    }
}
