/// Wire layouts of the shared telemetry block.
///
/// Each known producer layout is a [`Revision`] in [`REVISIONS`]. A raw copy
/// is matched against the registry by ABI tag first and by size second, then
/// decoded by explicit offset reads (see [`fields`]).
pub mod canonical;
mod fields;
mod inspect;
pub mod legacy;

pub use canonical::encode as encode_current;
pub use inspect::{inspect, ArrayCount, LayoutReport};

use crate::error::DecodeError;
use crate::model::{LayoutRevision, Snapshot};
use tracing::warn;

/// One known producer layout.
#[derive(Debug)]
pub struct Revision {
    pub revision: LayoutRevision,
    /// ABI tag stored at offset 0, `None` for untagged layouts.
    pub abi_version: Option<u32>,
    /// Minimum number of bytes the decoder needs.
    pub size: usize,
    /// Offset of the producer's `u32` write sequence, if the layout has one.
    pub sequence_offset: Option<usize>,
    decode: fn(&[u8]) -> Result<Snapshot, DecodeError>,
}

impl Revision {
    pub fn decode(&self, raw: &[u8]) -> Result<Snapshot, DecodeError> {
        (self.decode)(raw)
    }

    /// Read the write sequence from `raw`, if this layout has one.
    pub fn sequence_of(&self, raw: &[u8]) -> Option<u32> {
        let offset = self.sequence_offset?;
        let bytes = raw.get(offset..offset + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Known layouts, newest first.
pub static REVISIONS: [Revision; 2] = [
    Revision {
        revision: LayoutRevision::Current,
        abi_version: Some(canonical::ABI_VERSION),
        size: canonical::TOTAL_SIZE,
        sequence_offset: Some(canonical::OFF_WRITE_SEQUENCE),
        decode: decode_current,
    },
    Revision {
        revision: LayoutRevision::Legacy,
        abi_version: None,
        size: legacy::TOTAL_SIZE,
        sequence_offset: None,
        decode: decode_legacy,
    },
];

fn decode_current(raw: &[u8]) -> Result<Snapshot, DecodeError> {
    canonical::decode(raw).map(Snapshot::Current)
}

fn decode_legacy(raw: &[u8]) -> Result<Snapshot, DecodeError> {
    legacy::decode(raw).map(Snapshot::Legacy)
}

/// How a revision was chosen for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// ABI tag matched exactly.
    Exact,
    /// Same ABI major, unknown minor: decode the known prefix.
    SameMajor,
    /// No tag match, recognized by size.
    BySize,
}

const fn abi_major(abi: u32) -> u32 {
    abi >> 16
}

/// Pick the revision that decodes a buffer of `len` bytes tagged `abi_version`.
pub fn select(len: usize, abi_version: u32) -> Result<(&'static Revision, Selection), DecodeError> {
    if let Some(rev) = REVISIONS.iter().find(|r| r.abi_version == Some(abi_version)) {
        return Ok((rev, Selection::Exact));
    }
    if let Some(rev) = REVISIONS.iter().find(|r| {
        r.abi_version
            .is_some_and(|tag| abi_major(tag) == abi_major(abi_version))
    }) {
        return Ok((rev, Selection::SameMajor));
    }
    if let Some(rev) = REVISIONS
        .iter()
        .find(|r| r.abi_version.is_none() && len >= r.size)
    {
        return Ok((rev, Selection::BySize));
    }
    Err(DecodeError::UnsupportedLayout { abi_version, len })
}

/// The ABI tag at offset 0, `None` when the buffer is shorter than a tag.
pub fn peek_abi(raw: &[u8]) -> Option<u32> {
    let bytes = raw.get(0..4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decode `raw`, selecting the layout from `abi_version` and the buffer size.
pub fn decode(raw: &[u8], abi_version: u32) -> Result<Snapshot, DecodeError> {
    let (rev, selection) = select(raw.len(), abi_version)?;
    if selection == Selection::SameMajor {
        warn!(
            abi_version = %format!("{abi_version:#010x}"),
            known = %format!("{:#010x}", rev.abi_version.unwrap_or_default()),
            "unknown ABI minor, decoding known prefix"
        );
    }
    rev.decode(raw)
}

/// Decode `raw` using the ABI tag it carries.
pub fn decode_snapshot(raw: &[u8]) -> Result<Snapshot, DecodeError> {
    decode(raw, peek_abi(raw).unwrap_or(0))
}
