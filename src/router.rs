//! Router: maps a key to the index of the partition that owns it.
//!
//! Routing is a pure function of the key bytes and the shard count. It
//! never consults map state, so two equal keys always land on the same
//! partition for a fixed shard count.

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV hash over the key bytes (multiply, then xor, per byte).
#[inline]
pub fn fnv32(key: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in key.as_bytes() {
        hash = hash.wrapping_mul(FNV_PRIME);
        hash ^= b as u32;
    }
    hash
}

/// Partition index for `key` in a map with `shard_count` partitions.
///
/// `shard_count` must be non-zero; the map validates this at construction.
#[inline]
pub fn route(key: &str, shard_count: usize) -> usize {
    debug_assert!(shard_count > 0, "route() requires at least one shard");
    (fnv32(key) as usize) % shard_count
}
