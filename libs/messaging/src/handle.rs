//! Object Handles
//!
//! A handle names one distributed object for as long as that object lives.
//! Handles are minted by the object-identity system; this layer only
//! carries them. The layout packs the owning rank into the high 32 bits and
//! the owner-local id into the low 32 bits, so any rank can tell which
//! process created an object without a lookup.

use serde::{Deserialize, Serialize};
use std::fmt;
use transport::Rank;

/// Process-wide unique identifier of a distributed object
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(i64);

impl ObjectHandle {
    /// Bytes occupied by a handle on the wire
    pub const WIRE_SIZE: usize = std::mem::size_of::<i64>();

    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Highest owner rank a packed handle can carry
    pub const MAX_OWNER: Rank = Rank::new(i32::MAX as u32);

    /// Build a handle from the creating rank and its local object id.
    ///
    /// Returns `None` for owners above [`MAX_OWNER`](Self::MAX_OWNER), whose
    /// packed value would be negative.
    pub fn from_parts(owner: Rank, local_id: u32) -> Option<Self> {
        if owner > Self::MAX_OWNER {
            return None;
        }
        Some(Self(((owner.get() as i64) << 32) | local_id as i64))
    }

    /// Raw integer value
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Rank that created the object
    pub fn owner(self) -> Rank {
        Rank::new((self.0 >> 32) as u32)
    }

    /// Id of the object on its owning rank
    pub fn local_id(self) -> u32 {
        self.0 as u32
    }

    /// Negative handles are never assigned to live objects
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub fn to_le_bytes(self) -> [u8; Self::WIRE_SIZE] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; Self::WIRE_SIZE]) -> Self {
        Self(i64::from_le_bytes(bytes))
    }
}

impl From<i64> for ObjectHandle {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<ObjectHandle> for i64 {
    fn from(handle: ObjectHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}
