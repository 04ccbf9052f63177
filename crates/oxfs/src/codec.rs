//! Fixed-width big-endian encoding for the on-volume structs.

use alloc::format;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FsError, Result};

fn config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}

pub fn encode_into<T: Serialize>(value: &T, dst: &mut [u8]) -> Result<usize> {
    bincode::serde::encode_into_slice(value, dst, config())
        .map_err(|e| FsError::Codec(format!("{:?}", e)))
}

pub fn decode<T: DeserializeOwned>(src: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(src, config())
        .map(|(value, _)| value)
        .map_err(|e| FsError::Codec(format!("{:?}", e)))
}
