//! Process identity within the cluster

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one process participating in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rank(u32);

impl Rank {
    /// The first rank, conventionally the master process
    pub const ZERO: Rank = Rank(0);

    pub const fn new(rank: u32) -> Self {
        Self(rank)
    }

    /// Raw rank number
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rank as a slice index
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over all ranks of a run with `world_size` members.
    ///
    /// Sizes beyond the `u32` range saturate at `u32::MAX` ranks.
    pub fn all(world_size: usize) -> impl Iterator<Item = Rank> {
        let count = u32::try_from(world_size).unwrap_or(u32::MAX);
        (0..count).map(Rank)
    }
}

impl From<u32> for Rank {
    fn from(rank: u32) -> Self {
        Self(rank)
    }
}

impl From<Rank> for u32 {
    fn from(rank: Rank) -> Self {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_display() {
        assert_eq!(Rank::new(3).to_string(), "rank-3");
    }

    #[test]
    fn test_all_ranks() {
        let ranks: Vec<Rank> = Rank::all(3).collect();
        assert_eq!(ranks, vec![Rank::new(0), Rank::new(1), Rank::new(2)]);
        assert_eq!(Rank::all(0).count(), 0);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_all_saturates_oversized_world() {
        let oversized = u32::MAX as usize + 5;
        assert_eq!(Rank::all(oversized).size_hint(), (u32::MAX as usize, Some(u32::MAX as usize)));
        assert_eq!(Rank::all(oversized).next(), Some(Rank::ZERO));
    }
}
