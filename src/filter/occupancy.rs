//! Explicit record of which feature slots hold a tracked feature.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupancy {
    active: Vec<bool>,
}

impl SlotOccupancy {
    /// All `capacity` slots free.
    pub fn new(capacity: usize) -> Self {
        Self {
            active: vec![false; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.active.len()
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.active.get(slot).copied().unwrap_or(false)
    }

    /// Mark a slot active. Returns `true` if it was free before.
    pub fn insert(&mut self, slot: usize) -> bool {
        match self.active.get_mut(slot) {
            Some(flag) => !std::mem::replace(flag, true),
            None => false,
        }
    }

    /// Mark a slot free. Returns `true` if it was active before.
    pub fn remove(&mut self, slot: usize) -> bool {
        match self.active.get_mut(slot) {
            Some(flag) => std::mem::replace(flag, false),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.active
            .iter()
            .enumerate()
            .filter_map(|(slot, &active)| active.then_some(slot))
    }

    pub fn count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Lowest free slot, if any.
    pub fn first_free(&self) -> Option<usize> {
        self.active.iter().position(|&a| !a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut occ = SlotOccupancy::new(3);
        assert_eq!(occ.first_free(), Some(0));
        assert!(occ.insert(0));
        assert!(!occ.insert(0));
        assert!(occ.insert(2));
        assert_eq!(occ.iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(occ.first_free(), Some(1));
        assert_eq!(occ.count(), 2);

        assert!(occ.remove(0));
        assert!(!occ.remove(0));
        assert!(!occ.contains(0));
        assert!(!occ.insert(7));
    }

    #[test]
    fn test_full() {
        let mut occ = SlotOccupancy::new(2);
        occ.insert(0);
        occ.insert(1);
        assert_eq!(occ.first_free(), None);
    }
}
