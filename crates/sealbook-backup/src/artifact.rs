//! On-disk artifact layout.
//!
//! ```text
//! "SBAK"                     4 bytes magic
//! format version             u16 LE
//! metadata length            u32 LE
//! metadata                   JSON (BackupMetadata)
//! payload length             u64 LE
//! payload                    compressed, usually encrypted
//! ```
//!
//! The metadata is plain JSON so `inspect` works without a password.

use std::fs;
use std::path::Path;

use sealbook_contracts::{
    backup::{BackupArtifact, BackupMetadata},
    error::{SealError, SealResult},
};

pub const MAGIC: &[u8; 4] = b"SBAK";
pub const FORMAT_VERSION: u16 = 1;

fn invalid(reason: impl Into<String>) -> SealError {
    SealError::InvalidArtifact {
        reason: reason.into(),
    }
}

pub fn to_bytes(artifact: &BackupArtifact) -> SealResult<Vec<u8>> {
    let metadata = serde_json::to_vec(&artifact.metadata)?;
    let metadata_len =
        u32::try_from(metadata.len()).map_err(|_| invalid("metadata exceeds 4 GiB"))?;

    let mut out = Vec::with_capacity(4 + 2 + 4 + metadata.len() + 8 + artifact.payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&metadata_len.to_le_bytes());
    out.extend_from_slice(&metadata);
    out.extend_from_slice(&(artifact.payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&artifact.payload);
    Ok(out)
}

/// Cursor over the artifact bytes with bounds-checked reads.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &str) -> SealResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| invalid(format!("artifact truncated while reading {what}")))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> SealResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N, what)?);
        Ok(buf)
    }
}

fn read_header(bytes: &[u8]) -> SealResult<(BackupMetadata, Reader<'_>)> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(4, "magic")? != MAGIC {
        return Err(invalid("not a sealbook backup (bad magic)"));
    }
    let version = u16::from_le_bytes(reader.array("format version")?);
    if version != FORMAT_VERSION {
        return Err(invalid(format!(
            "unsupported artifact format version {version}"
        )));
    }

    let metadata_len = u32::from_le_bytes(reader.array("metadata length")?) as usize;
    let metadata: BackupMetadata = serde_json::from_slice(reader.take(metadata_len, "metadata")?)
        .map_err(|e| invalid(format!("metadata is not valid JSON: {e}")))?;

    Ok((metadata, reader))
}

pub fn from_bytes(bytes: &[u8]) -> SealResult<BackupArtifact> {
    let (metadata, mut reader) = read_header(bytes)?;
    let payload_len = usize::try_from(u64::from_le_bytes(reader.array("payload length")?))
        .map_err(|_| invalid("payload length does not fit in memory"))?;
    let payload = reader.take(payload_len, "payload")?.to_vec();
    if reader.pos != bytes.len() {
        return Err(invalid(format!(
            "{} trailing bytes after payload",
            bytes.len() - reader.pos
        )));
    }
    Ok(BackupArtifact { metadata, payload })
}

pub fn write_to(artifact: &BackupArtifact, path: &Path) -> SealResult<()> {
    fs::write(path, to_bytes(artifact)?).map_err(|e| SealError::Storage {
        reason: format!("failed to write backup '{}': {e}", path.display()),
    })
}

fn read_file(path: &Path) -> SealResult<Vec<u8>> {
    fs::read(path).map_err(|e| SealError::Storage {
        reason: format!("failed to read backup '{}': {e}", path.display()),
    })
}

pub fn read_from(path: &Path) -> SealResult<BackupArtifact> {
    from_bytes(&read_file(path)?)
}

/// Metadata only.  Needs no password and does not touch the payload.
pub fn inspect(path: &Path) -> SealResult<BackupMetadata> {
    let bytes = read_file(path)?;
    read_header(&bytes).map(|(metadata, _)| metadata)
}
