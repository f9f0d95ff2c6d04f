use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::errors::{CodeDbError, CodeDbResult};

/// Compresses one raw chunk
pub fn compress(raw: &[u8]) -> CodeDbResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

/// Expands a compressed span into `out`, replacing its contents.
///
/// `out` keeps its capacity between calls so a worker can reuse one buffer
/// for every chunk it handles.
pub fn decompress_into(input: &[u8], out: &mut Vec<u8>) -> CodeDbResult<()> {
    out.clear();
    ZlibDecoder::new(input)
        .read_to_end(out)
        .map_err(|e| CodeDbError::corrupt_chunk(format!("inflate failed: {}", e)))?;
    Ok(())
}
