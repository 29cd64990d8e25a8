//! Membership filters for short-circuiting negative lookups.
//!
//! A filter answers "definitely absent" or "maybe present". The storage layer
//! consults it before searching the MemTable; a `false` skips the lookup.

pub mod bloom;

pub use bloom::BloomFilter;

/// Probabilistic set membership test with no false negatives.
pub trait MembershipFilter {
    /// Records `item` as present.
    fn add(&mut self, item: &[u8]);

    /// Returns `false` only if `item` was never added.
    fn may_contain(&self, item: &[u8]) -> bool;
}
