use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::CodecId;

/// Version string written into every index.  Readers reject any other value.
pub const FORMAT_VERSION: &str = "1.0";

/// Location of one compressed block inside the container.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Bytes from the start of the file.
    pub start_offset:      u64,
    pub compressed_length: u64,
    /// Records written before per-block codecs existed are zstd.
    #[serde(default)]
    pub codec:             CodecId,
}

impl BlockDescriptor {
    /// One past the last byte of the block.
    pub fn end_offset(&self) -> Option<u64> {
        self.start_offset.checked_add(self.compressed_length)
    }
}

/// The metadata record written just before the trailer.
///
/// Blocks are kept in a `BTreeMap` so the serialized form is stable for a
/// given set of names.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContainerIndex {
    pub format_version: String,
    pub blocks:         BTreeMap<String, BlockDescriptor>,
}

impl Default for ContainerIndex {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_owned(),
            blocks:         BTreeMap::new(),
        }
    }
}

// Only the version is decoded first, so a container from another format
// version is reported as such even when its block records no longer parse.
#[derive(Deserialize)]
struct VersionProbe {
    format_version: String,
}

impl ContainerIndex {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Decode just the `format_version` field of a serialized index.
    pub fn probe_version(bytes: &[u8]) -> Result<String, serde_json::Error> {
        serde_json::from_slice::<VersionProbe>(bytes).map(|p| p.format_version)
    }

    pub fn get(&self, name: &str) -> Option<&BlockDescriptor> {
        self.blocks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sum of every block's compressed length.
    pub fn body_len(&self) -> u64 {
        self.blocks.values().map(|b| b.compressed_length).sum()
    }

    /// First block whose range does not end at or before `limit`.
    pub fn first_block_past(&self, limit: u64) -> Option<(&str, &BlockDescriptor)> {
        self.blocks
            .iter()
            .find(|(_, b)| b.end_offset().map_or(true, |end| end > limit))
            .map(|(name, b)| (name.as_str(), b))
    }
}
