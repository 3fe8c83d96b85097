use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dht_messages::NodeId;

/// Widest supported ring. `in_between` adds the modulus to reduced values, which must fit in a u64.
pub const MAX_BITS: u32 = 63;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RingError {
    #[error("ring width must be within 1..={MAX_BITS} bits, got {0}")]
    InvalidBits(u32),
    #[error("finger index {index} out of range 1..={bits}")]
    FingerIndex { index: usize, bits: u32 },
}

/// Modular arithmetic over the identifier space `[0, 2^bits)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ring {
    bits: u32,
}

impl Ring {
    pub fn new(bits: u32) -> Result<Self, RingError> {
        if bits == 0 || bits > MAX_BITS {
            return Err(RingError::InvalidBits(bits));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Number of identifiers on the ring (2^bits).
    pub fn size(&self) -> u64 {
        1u64 << self.bits
    }

    pub fn reduce(&self, value: u64) -> NodeId {
        value & (self.size() - 1)
    }

    pub fn add(&self, a: u64, b: u64) -> NodeId {
        self.reduce(a.wrapping_add(b))
    }

    pub fn sub(&self, a: u64, b: u64) -> NodeId {
        // 2^bits divides 2^64, so wrapping in u64 first keeps the residue correct
        self.reduce(a.wrapping_sub(b))
    }

    /// `2^(index-1)`, the offset of finger `index` (1-based).
    pub fn finger_offset(&self, index: usize) -> Result<u64, RingError> {
        if index == 0 || index > self.bits as usize {
            return Err(RingError::FingerIndex {
                index,
                bits: self.bits,
            });
        }
        Ok(1u64 << (index - 1))
    }

    /// `(id + 2^(index-1)) mod 2^bits`
    pub fn finger_start(&self, id: NodeId, index: usize) -> Result<NodeId, RingError> {
        Ok(self.add(id, self.finger_offset(index)?))
    }

    /// Circular closed interval test: is `key` in `[low, high]` once all three are reduced?
    ///
    /// When `low > high` the interval wraps past zero. The check lifts the
    /// interval onto `[0, 2 * 2^bits)` and tries both representations of `key`,
    /// so `low == high + 1` covers the whole ring.
    pub fn in_between(&self, key: u64, low: u64, high: u64) -> bool {
        let size = self.size();
        let key = self.reduce(key);
        let low = self.reduce(low);
        let high = self.reduce(high);

        if low <= high {
            low <= key && key <= high
        } else {
            (low <= key && key <= high + size) || (low <= key + size && key <= high)
        }
    }

    /// `[low, high)`. `low == high` denotes the whole ring.
    pub fn in_half_open(&self, key: u64, low: u64, high: u64) -> bool {
        self.in_between(key, low, self.sub(high, 1))
    }

    /// `(low, high]`. `low == high` denotes the whole ring.
    pub fn in_open_closed(&self, key: u64, low: u64, high: u64) -> bool {
        self.in_between(key, self.add(low, 1), high)
    }

    /// `(low, high)`, both ends excluded. `low == high` denotes every identifier but `low`.
    pub fn in_open(&self, key: u64, low: u64, high: u64) -> bool {
        if self.add(low, 1) == self.reduce(high) {
            return false;
        }
        self.in_between(key, self.add(low, 1), self.sub(high, 1))
    }
}
