// src/packages/android/chunk.rs

//! Android resource chunk primitives
//!
//! Both the compiled manifest (AXML) and the resource table (ARSC) are
//! sequences of little-endian chunks sharing an 8-byte header
//! (`type: u16, header_size: u16, size: u32`) and the same string pool
//! encoding.

/// Parse failures carry a message; callers wrap it in the right
/// `DecodeError` variant for the file being parsed.
pub(crate) type ChunkResult<T> = Result<T, String>;

pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_TABLE_TYPE: u16 = 0x0002;
pub(crate) const RES_XML_TYPE: u16 = 0x0003;
pub(crate) const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
pub(crate) const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
pub(crate) const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;
pub(crate) const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub(crate) const RES_TABLE_TYPE_TYPE: u16 = 0x0201;

/// Sentinel for "no string" / "no entry"
pub(crate) const NO_INDEX: u32 = 0xFFFF_FFFF;

const CHUNK_HEADER_SIZE: usize = 8;
const UTF8_FLAG: u32 = 1 << 8;

// Res_value data types
const TYPE_NULL: u8 = 0x00;
const TYPE_REFERENCE: u8 = 0x01;
const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

pub(crate) fn u8_at(buf: &[u8], off: usize) -> ChunkResult<u8> {
    buf.get(off)
        .copied()
        .ok_or_else(|| format!("read past end at offset {}", off))
}

pub(crate) fn u16_at(buf: &[u8], off: usize) -> ChunkResult<u16> {
    buf.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| format!("read past end at offset {}", off))
}

pub(crate) fn u32_at(buf: &[u8], off: usize) -> ChunkResult<u32> {
    buf.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| format!("read past end at offset {}", off))
}

/// Common chunk header
#[derive(Debug, Clone, Copy)]
pub(crate) struct ChunkHeader {
    pub kind: u16,
    pub header_size: usize,
    pub size: usize,
}

impl ChunkHeader {
    /// Read and sanity-check the header of the chunk starting at `off`
    pub fn read(buf: &[u8], off: usize) -> ChunkResult<Self> {
        let kind = u16_at(buf, off)?;
        let header_size = u16_at(buf, off + 2)? as usize;
        let size = u32_at(buf, off + 4)? as usize;

        if header_size < CHUNK_HEADER_SIZE || size < header_size {
            return Err(format!(
                "bad chunk 0x{:04x} at offset {} (header {}, size {})",
                kind, off, header_size, size
            ));
        }
        if off.checked_add(size).is_none_or(|end| end > buf.len()) {
            return Err(format!(
                "chunk 0x{:04x} at offset {} overruns buffer ({} > {})",
                kind,
                off,
                size,
                buf.len() - off
            ));
        }

        Ok(Self {
            kind,
            header_size,
            size,
        })
    }
}

/// Iterate child chunks in `buf[start..end]`
pub(crate) fn children(buf: &[u8], start: usize, end: usize) -> ChunkResult<Vec<(usize, ChunkHeader)>> {
    let mut out = Vec::new();
    let mut pos = start;
    while pos + CHUNK_HEADER_SIZE <= end {
        let header = ChunkHeader::read(buf, pos)?;
        if pos + header.size > end {
            return Err(format!(
                "chunk 0x{:04x} at offset {} overruns its parent",
                header.kind, pos
            ));
        }
        out.push((pos, header));
        pos += header.size;
    }
    Ok(out)
}

/// Decoded string pool
#[derive(Debug, Default)]
pub(crate) struct StringPool {
    strings: Vec<String>,
}

impl StringPool {
    /// Decode the pool chunk starting at `off`
    pub fn parse(buf: &[u8], off: usize) -> ChunkResult<Self> {
        let header = ChunkHeader::read(buf, off)?;
        if header.kind != RES_STRING_POOL_TYPE {
            return Err(format!("expected string pool, found chunk 0x{:04x}", header.kind));
        }
        let chunk = &buf[off..off + header.size];

        let count = u32_at(chunk, 8)? as usize;
        let flags = u32_at(chunk, 16)?;
        let strings_start = u32_at(chunk, 20)? as usize;
        let utf8 = flags & UTF8_FLAG != 0;

        if count > chunk.len() / 4 {
            return Err(format!("string pool claims {} strings", count));
        }

        let mut strings = Vec::with_capacity(count);
        for i in 0..count {
            let rel = u32_at(chunk, header.header_size + i * 4)? as usize;
            let at = strings_start
                .checked_add(rel)
                .ok_or_else(|| "string offset overflow".to_string())?;
            let s = if utf8 {
                decode_utf8(chunk, at)?
            } else {
                decode_utf16(chunk, at)?
            };
            strings.push(s);
        }

        Ok(Self { strings })
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        if index == NO_INDEX {
            return None;
        }
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }
}

fn decode_utf8(chunk: &[u8], mut at: usize) -> ChunkResult<String> {
    // UTF-16 length first (unused), then UTF-8 byte length; each is one
    // byte, or two with the high bit set.
    let (_, used) = utf8_length(chunk, at)?;
    at += used;
    let (len, used) = utf8_length(chunk, at)?;
    at += used;

    let bytes = chunk
        .get(at..at + len)
        .ok_or_else(|| format!("string at offset {} overruns pool", at))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn utf8_length(chunk: &[u8], at: usize) -> ChunkResult<(usize, usize)> {
    let first = u8_at(chunk, at)? as usize;
    if first & 0x80 != 0 {
        let second = u8_at(chunk, at + 1)? as usize;
        Ok((((first & 0x7F) << 8) | second, 2))
    } else {
        Ok((first, 1))
    }
}

fn decode_utf16(chunk: &[u8], mut at: usize) -> ChunkResult<String> {
    let first = u16_at(chunk, at)? as usize;
    let len = if first & 0x8000 != 0 {
        let second = u16_at(chunk, at + 2)? as usize;
        at += 4;
        ((first & 0x7FFF) << 16) | second
    } else {
        at += 2;
        first
    };

    let bytes = chunk
        .get(at..at + len * 2)
        .ok_or_else(|| format!("string at offset {} overruns pool", at))?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// A typed resource value (`Res_value`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResValue {
    Null,
    /// Reference to another resource id (`@0x7f010000`)
    Reference(u32),
    String(String),
    Int(u32),
    Bool(bool),
    Other { data_type: u8, data: u32 },
}

impl ResValue {
    /// Build from a raw (type, data) pair, resolving string indices
    pub(crate) fn from_raw(data_type: u8, data: u32, pool: &StringPool) -> Self {
        match data_type {
            TYPE_NULL => Self::Null,
            TYPE_REFERENCE => Self::Reference(data),
            TYPE_STRING => pool
                .get(data)
                .map(|s| Self::String(s.to_string()))
                .unwrap_or(Self::Null),
            TYPE_INT_DEC | TYPE_INT_HEX => Self::Int(data),
            TYPE_INT_BOOLEAN => Self::Bool(data != 0),
            _ => Self::Other { data_type, data },
        }
    }

    /// Literal text of a non-reference value
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
