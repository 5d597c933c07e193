//! zlib compression for backup payloads.

use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use sealbook_contracts::error::{SealError, SealResult};

pub const DEFAULT_LEVEL: u32 = 6;

pub fn compress(bytes: &[u8], level: u32) -> SealResult<Vec<u8>> {
    if level > 9 {
        return Err(SealError::Compression {
            reason: format!("compression level must be 0-9, got {level}"),
        });
    }
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::new(level));
    let to_error = |e: std::io::Error| SealError::Compression {
        reason: e.to_string(),
    };
    encoder.write_all(bytes).map_err(to_error)?;
    encoder.finish().map_err(to_error)
}

pub fn decompress(bytes: &[u8]) -> SealResult<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| SealError::Compression {
            reason: e.to_string(),
        })?;
    Ok(out)
}
