//! Xoroshiro128+ generator used to pick inode ids.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::Result;

pub type RandomSeed = [u64; 2];

pub const DEFAULT_SEED: RandomSeed = [540_932_923_848, 540_932_540_932];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random {
    seed: RandomSeed,
}

impl Random {
    /// Encoded length of the persisted state.
    pub const SIZE: usize = 16;

    pub fn new(seed: RandomSeed) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> RandomSeed {
        self.seed
    }

    pub fn gen(&mut self) -> u64 {
        let [s0, mut s1] = self.seed;
        let out = s0.wrapping_add(s1);
        s1 ^= s0;
        self.seed[0] = s0.rotate_left(55) ^ s1 ^ (s1 << 14);
        self.seed[1] = s1.rotate_left(36);
        out
    }

    pub fn to_bytes(&self) -> Result<[u8; Self::SIZE]> {
        let mut out = [0u8; Self::SIZE];
        codec::encode_into(self, &mut out)?;
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

impl Default for Random {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
