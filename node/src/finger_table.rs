use chordal_lib::{Finger, NodeId, Ring, RingError};

/// The m routing shortcuts of one node, addressed by 1-based index as in the Chord paper.
///
/// Slot `i` has a fixed `start = owner + 2^(i-1)` and a mutable `node`
/// that converges on the successor of `start`. Slot 1 is the successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerTable {
    bits: u32,
    entries: Vec<Finger>,
}

impl FingerTable {
    /// Every slot starts out pointing at the owner.
    pub fn new(ring: &Ring, owner: NodeId) -> Self {
        let entries = (0..ring.bits())
            .map(|shift| Finger {
                start: ring.add(owner, 1u64 << shift),
                node: owner,
            })
            .collect();
        Self {
            bits: ring.bits(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Finger, RingError> {
        index
            .checked_sub(1)
            .and_then(|slot| self.entries.get(slot))
            .copied()
            .ok_or(RingError::FingerIndex {
                index,
                bits: self.bits,
            })
    }

    /// Returns the previous node of the slot.
    pub fn set_node(&mut self, index: usize, node: NodeId) -> Result<NodeId, RingError> {
        let bits = self.bits;
        let finger = index
            .checked_sub(1)
            .and_then(|slot| self.entries.get_mut(slot))
            .ok_or(RingError::FingerIndex { index, bits })?;
        Ok(std::mem::replace(&mut finger.node, node))
    }

    pub fn successor(&self) -> Option<NodeId> {
        self.entries.first().map(|finger| finger.node)
    }

    pub fn fill(&mut self, node: NodeId) {
        for finger in &mut self.entries {
            finger.node = node;
        }
    }

    /// Slots from index m down to 1.
    pub fn iter_descending(&self) -> impl Iterator<Item = &Finger> {
        self.entries.iter().rev()
    }

    pub fn to_vec(&self) -> Vec<Finger> {
        self.entries.clone()
    }
}
