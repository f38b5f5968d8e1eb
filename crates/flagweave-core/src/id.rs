//! Flag type identifiers and per-domain id allocation
//!
//! Ids are handed out once, in ascending order, during a single-threaded
//! registration phase and are never recycled. A domain's capacity is the
//! out-of-band agreement shared by every encoder/decoder pair, so it also
//! decides which wire tier the domain's flag sets use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{Tier, MAX_CAPACITY};
use crate::errors::{FlagError, Result};

/// Identifier for one registered flag kind, unique within its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagTypeId(u16);

impl FlagTypeId {
    /// Wrap a raw index
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Bit index of this flag within a flag set
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Byte that holds this flag
    pub(crate) const fn byte(self) -> usize {
        self.index() / 8
    }

    /// Mask for this flag within its byte, counted from the most significant bit
    pub(crate) const fn mask(self) -> u8 {
        0x80u8 >> (self.0 % 8)
    }
}

impl From<u16> for FlagTypeId {
    fn from(index: u16) -> Self {
        Self(index)
    }
}

impl fmt::Display for FlagTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A capacity-bounded namespace of flag ids sharing one codec configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlagDomain {
    name: String,
    capacity: u16,
}

impl FlagDomain {
    /// Declare a domain, rejecting capacities the codec cannot carry
    pub fn new(name: impl Into<String>, capacity: u16) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(FlagError::InvalidCapacity {
                capacity,
                max: MAX_CAPACITY,
            });
        }
        Ok(Self {
            name: name.into(),
            capacity,
        })
    }

    /// Domain name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of ids this domain can ever hold
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Wire tier selected by this domain's capacity
    pub fn tier(&self) -> Tier {
        Tier::for_capacity(self.capacity)
    }

    /// Whether `id` is inside this domain
    pub fn contains(&self, id: FlagTypeId) -> bool {
        id.index() < usize::from(self.capacity)
    }
}

/// Issues monotonically increasing ids within one domain
///
/// Reservation takes `&mut self`: all reservations for a domain are expected
/// to happen during setup, before the allocator is shared with other threads.
#[derive(Debug, Clone)]
pub struct FlagIdAllocator {
    domain: FlagDomain,
    next: u16,
}

impl FlagIdAllocator {
    /// Create an allocator whose first id is 0
    pub fn new(domain: FlagDomain) -> Self {
        Self { domain, next: 0 }
    }

    /// Reserve the domain's next unused id
    pub fn reserve(&mut self) -> Result<FlagTypeId> {
        if self.next >= self.domain.capacity {
            return Err(FlagError::CapacityExceeded {
                domain: self.domain.name.clone(),
                capacity: self.domain.capacity,
            });
        }

        let id = FlagTypeId(self.next);
        self.next += 1;
        tracing::debug!(domain = %self.domain.name, id = %id, "reserved flag type id");
        Ok(id)
    }

    /// Number of ids handed out so far
    pub fn reserved(&self) -> usize {
        usize::from(self.next)
    }

    /// Ids still available
    pub fn remaining(&self) -> usize {
        usize::from(self.domain.capacity - self.next)
    }

    /// Domain this allocator serves
    pub fn domain(&self) -> &FlagDomain {
        &self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn ids_start_at_zero_and_increase() {
        let mut alloc = FlagIdAllocator::new(FlagDomain::new("teams", 8).unwrap());
        let ids: Vec<_> = (0..3).map(|_| alloc.reserve().unwrap()).collect();

        assert_eq!(ids, vec![FlagTypeId::new(0), FlagTypeId::new(1), FlagTypeId::new(2)]);
        assert_eq!(alloc.reserved(), 3);
        assert_eq!(alloc.remaining(), 5);
    }

    #[test]
    fn exhausted_domain_fails_and_stays_exhausted() {
        let mut alloc = FlagIdAllocator::new(FlagDomain::new("tiny", 2).unwrap());
        alloc.reserve().unwrap();
        alloc.reserve().unwrap();

        assert_matches!(
            alloc.reserve(),
            Err(FlagError::CapacityExceeded { capacity: 2, .. })
        );
        assert_matches!(alloc.reserve(), Err(FlagError::CapacityExceeded { .. }));
        assert_eq!(alloc.reserved(), 2);
    }

    #[test]
    fn domain_rejects_unsupported_capacity() {
        assert_matches!(
            FlagDomain::new("empty", 0),
            Err(FlagError::InvalidCapacity { capacity: 0, .. })
        );
        assert_matches!(
            FlagDomain::new("huge", MAX_CAPACITY + 1),
            Err(FlagError::InvalidCapacity { .. })
        );
        assert!(FlagDomain::new("largest", MAX_CAPACITY).is_ok());
    }

    #[test]
    fn id_bit_layout_is_msb_first() {
        assert_eq!(FlagTypeId::new(0).mask(), 0b1000_0000);
        assert_eq!(FlagTypeId::new(9).byte(), 1);
        assert_eq!(FlagTypeId::new(9).mask(), 0b0100_0000);
        assert_eq!(FlagTypeId::new(15).mask(), 0b0000_0001);
    }

    #[test]
    fn domain_contains_only_ids_below_capacity() {
        let domain = FlagDomain::new("damage", 64).unwrap();
        assert!(domain.contains(FlagTypeId::new(63)));
        assert!(!domain.contains(FlagTypeId::new(64)));
    }
}
