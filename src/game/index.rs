//! Entity index allocation
//!
//! Tanks and items each draw from their own pool of byte indices in
//! `[0, MAX_ENTITY_INDEX]`. Allocation starts at a random candidate and scans
//! forward (wrapping) until a free value turns up, so host and client can each
//! allocate for the entities they create without a shared sequence.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::entity::{EntityIndex, Ownership, MAX_ENTITY_INDEX};

/// Highest client index the host assigns.
pub const MAX_CLIENT_INDEX: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("all {0} indices are in use")]
    Exhausted(usize),
}

/// Anything that can answer "is this index live?"
pub trait Occupied {
    fn is_occupied(&self, index: EntityIndex) -> bool;
}

impl Occupied for HashSet<EntityIndex> {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains(&index)
    }
}

impl Occupied for BTreeSet<EntityIndex> {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains(&index)
    }
}

impl<V> Occupied for HashMap<EntityIndex, V> {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains_key(&index)
    }
}

impl<V> Occupied for BTreeMap<EntityIndex, V> {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains_key(&index)
    }
}

impl Occupied for [EntityIndex] {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains(&index)
    }
}

impl Occupied for Vec<EntityIndex> {
    fn is_occupied(&self, index: EntityIndex) -> bool {
        self.contains(&index)
    }
}

/// Linear scan from `start` over `[0, max]`, wrapping once.
fn scan(start: u8, max: u8, occupied: impl Fn(u8) -> bool) -> Option<u8> {
    let span = max as usize + 1;
    (0..span)
        .map(|offset| ((start as usize + offset) % span) as u8)
        .find(|candidate| !occupied(*candidate))
}

/// Random-start, scan-forward index allocator.
///
/// One instance per pool keeps tank and item indices independent.
#[derive(Debug, Clone)]
pub struct IndexAllocator {
    rng: ChaCha8Rng,
}

impl IndexAllocator {
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Deterministic allocator for tests and replays
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Pick an index not present in `existing`.
    ///
    /// A free `preferred` index is returned as-is.
    pub fn allocate<S: Occupied + ?Sized>(
        &mut self,
        existing: &S,
        preferred: Option<EntityIndex>,
    ) -> Result<EntityIndex, AllocError> {
        if let Some(p) = preferred {
            if p.0 <= MAX_ENTITY_INDEX && !existing.is_occupied(p) {
                return Ok(p);
            }
        }

        let start = self.rng.gen_range(0..=MAX_ENTITY_INDEX);
        scan(start, MAX_ENTITY_INDEX, |c| existing.is_occupied(EntityIndex(c)))
            .map(EntityIndex)
            .ok_or(AllocError::Exhausted(MAX_ENTITY_INDEX as usize + 1))
    }

    /// Pick a client index in `[0, MAX_CLIENT_INDEX]` not rejected by `taken`.
    pub fn allocate_client_index(&mut self, taken: impl Fn(u8) -> bool) -> Result<u8, AllocError> {
        let start = self.rng.gen_range(0..=MAX_CLIENT_INDEX);
        scan(start, MAX_CLIENT_INDEX, taken).ok_or(AllocError::Exhausted(MAX_CLIENT_INDEX as usize + 1))
    }

    /// Turn `Unassigned` into `Local(fresh)`; other variants pass through.
    pub fn resolve<S: Occupied + ?Sized>(
        &mut self,
        ownership: Ownership,
        existing: &S,
    ) -> Result<Ownership, AllocError> {
        match ownership {
            Ownership::Unassigned => self.allocate(existing, None).map(Ownership::Local),
            other => Ok(other),
        }
    }
}

impl Default for IndexAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_index_is_free_and_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut allocator = IndexAllocator::seeded(42);

        for _ in 0..500 {
            let count = rng.gen_range(0..=200usize);
            let mut existing = HashSet::new();
            while existing.len() < count {
                existing.insert(EntityIndex(rng.gen_range(0..=MAX_ENTITY_INDEX)));
            }

            let index = allocator.allocate(&existing, None).unwrap();
            assert!(index.0 <= MAX_ENTITY_INDEX);
            assert!(!existing.contains(&index));
        }
    }

    #[test]
    fn last_free_index_is_found() {
        let mut allocator = IndexAllocator::seeded(1);
        let existing: Vec<EntityIndex> = (0..=MAX_ENTITY_INDEX)
            .filter(|i| *i != 137)
            .map(EntityIndex)
            .collect();

        assert_eq!(allocator.allocate(&existing, None), Ok(EntityIndex(137)));
    }

    #[test]
    fn full_pool_is_exhausted() {
        let mut allocator = IndexAllocator::seeded(1);
        let existing: BTreeSet<EntityIndex> = (0..=MAX_ENTITY_INDEX).map(EntityIndex).collect();

        assert_eq!(allocator.allocate(&existing, None), Err(AllocError::Exhausted(201)));
    }

    #[test]
    fn free_preferred_index_wins() {
        let mut allocator = IndexAllocator::seeded(3);
        let existing = vec![EntityIndex(4)];

        assert_eq!(allocator.allocate(&existing, Some(EntityIndex(9))), Ok(EntityIndex(9)));
        let other = allocator.allocate(&existing, Some(EntityIndex(4))).unwrap();
        assert_ne!(other, EntityIndex(4));
    }

    #[test]
    fn indices_are_reused_after_removal() {
        let mut allocator = IndexAllocator::seeded(9);
        let mut live: BTreeSet<EntityIndex> = (0..=MAX_ENTITY_INDEX).map(EntityIndex).collect();
        live.remove(&EntityIndex(0));

        assert_eq!(allocator.allocate(&live, None), Ok(EntityIndex(0)));
    }

    #[test]
    fn resolve_only_touches_unassigned() {
        let mut allocator = IndexAllocator::seeded(5);
        let existing: Vec<EntityIndex> = Vec::new();

        let remote = Ownership::Remote(EntityIndex(250));
        assert_eq!(allocator.resolve(remote, &existing), Ok(remote));
        assert!(matches!(
            allocator.resolve(Ownership::Unassigned, &existing),
            Ok(Ownership::Local(EntityIndex(i))) if i <= MAX_ENTITY_INDEX
        ));
    }

    #[test]
    fn client_index_skips_taken_values() {
        let mut allocator = IndexAllocator::seeded(11);
        let index = allocator.allocate_client_index(|c| c != 17).unwrap();
        assert_eq!(index, 17);
    }
}
