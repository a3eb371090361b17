// src/packages/cgbi.rs

//! Apple "CgBI" PNG repair
//!
//! Xcode rewrites app icons into a proprietary PNG variant: an extra
//! `CgBI` chunk before `IHDR`, IDAT data as a raw deflate stream without
//! the zlib wrapper, and pixels stored as BGRA. Browsers cannot display
//! these, so icons are converted back to standard RGBA PNGs on upload.
//!
//! Channel swapping is done on the filtered scanlines. PNG filters work
//! per byte against the same channel of neighbouring pixels, so swapping
//! B and R consistently in every pixel commutes with unfiltering.

use super::DecodeError;
use flate2::read::DeflateDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// PNG file signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const CGBI: &[u8; 4] = b"CgBI";
const IHDR: &[u8; 4] = b"IHDR";
const IDAT: &[u8; 4] = b"IDAT";
const IEND: &[u8; 4] = b"IEND";

/// Upper bound on decoded pixel data (icons are tiny; this guards against
/// hostile headers)
const MAX_PIXEL_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug)]
struct Chunk {
    kind: [u8; 4],
    data: Vec<u8>,
}

/// Check for the PNG signature
pub fn is_png(data: &[u8]) -> bool {
    data.len() >= PNG_SIGNATURE.len() && data[..PNG_SIGNATURE.len()] == PNG_SIGNATURE
}

/// Check whether a PNG carries the Apple `CgBI` marker chunk
pub fn is_cgbi(data: &[u8]) -> bool {
    parse_chunks(data)
        .map(|chunks| chunks.iter().any(|c| &c.kind == CGBI))
        .unwrap_or(false)
}

/// Convert a CgBI PNG into a standard PNG
///
/// Standard PNGs are returned unchanged.
pub fn normalize(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let chunks = parse_chunks(data)?;
    if !chunks.iter().any(|c| &c.kind == CGBI) {
        return Ok(data.to_vec());
    }

    let header = chunks
        .iter()
        .find(|c| &c.kind == IHDR)
        .ok_or_else(|| DecodeError::Image("missing IHDR chunk".to_string()))?;
    if header.data.len() < 13 {
        return Err(DecodeError::Image("truncated IHDR chunk".to_string()));
    }

    let width = u32::from_be_bytes([header.data[0], header.data[1], header.data[2], header.data[3]]) as usize;
    let height = u32::from_be_bytes([header.data[4], header.data[5], header.data[6], header.data[7]]) as usize;
    let bit_depth = header.data[8];
    let color_type = header.data[9];
    let interlace = header.data[12];

    if bit_depth != 8 || color_type != 6 || interlace != 0 {
        return Err(DecodeError::Image(format!(
            "unsupported CgBI layout (depth {}, color type {}, interlace {})",
            bit_depth, color_type, interlace
        )));
    }

    let stride = width
        .checked_mul(4)
        .and_then(|w| w.checked_add(1))
        .ok_or_else(|| DecodeError::Image("image too wide".to_string()))?;
    let expected = stride
        .checked_mul(height)
        .filter(|n| *n <= MAX_PIXEL_BYTES)
        .ok_or_else(|| DecodeError::Image("image too large".to_string()))?;

    let compressed: Vec<u8> = chunks
        .iter()
        .filter(|c| &c.kind == IDAT)
        .flat_map(|c| c.data.iter().copied())
        .collect();

    let mut pixels = Vec::with_capacity(expected);
    DeflateDecoder::new(compressed.as_slice())
        .take(expected as u64 + 1)
        .read_to_end(&mut pixels)
        .map_err(|e| DecodeError::Image(format!("failed to inflate pixel data: {}", e)))?;

    if pixels.len() < expected {
        return Err(DecodeError::Image(format!(
            "pixel data too short: {} of {} bytes",
            pixels.len(),
            expected
        )));
    }
    pixels.truncate(expected);

    for row in pixels.chunks_exact_mut(stride) {
        // row[0] is the filter type
        for pixel in row[1..].chunks_exact_mut(4) {
            pixel.swap(0, 2);
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&pixels)?;
    let idat = encoder.finish()?;

    let mut out = Vec::with_capacity(data.len() + 64);
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut wrote_idat = false;
    for chunk in &chunks {
        match &chunk.kind {
            k if k == CGBI => {}
            k if k == IDAT => {
                if !wrote_idat {
                    write_chunk(&mut out, IDAT, &idat);
                    wrote_idat = true;
                }
            }
            k if k == IEND => {}
            kind => write_chunk(&mut out, kind, &chunk.data),
        }
    }
    write_chunk(&mut out, IEND, &[]);

    Ok(out)
}

fn parse_chunks(data: &[u8]) -> Result<Vec<Chunk>, DecodeError> {
    if !is_png(data) {
        return Err(DecodeError::Image("not a PNG file".to_string()));
    }

    let mut chunks = Vec::new();
    let mut pos = PNG_SIGNATURE.len();
    while pos + 8 <= data.len() {
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let start = pos + 8;
        let end = start
            .checked_add(len)
            .filter(|end| end + 4 <= data.len())
            .ok_or_else(|| DecodeError::Image("truncated PNG chunk".to_string()))?;

        chunks.push(Chunk {
            kind,
            data: data[start..end].to_vec(),
        });
        pos = end + 4;

        if &kind == IEND {
            break;
        }
    }

    Ok(chunks)
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);

    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}
