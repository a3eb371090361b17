// src/packages/android/arsc.rs

//! Compiled resource table (`resources.arsc`) reader
//!
//! Keeps only simple (non-bag) entries with their configuration
//! qualifiers, which is enough to resolve labels and icon paths.

use super::Locale;
use super::chunk::{
    ChunkHeader, ChunkResult, NO_INDEX, RES_STRING_POOL_TYPE, RES_TABLE_PACKAGE_TYPE,
    RES_TABLE_TYPE, RES_TABLE_TYPE_TYPE, ResValue, StringPool, children, u8_at, u16_at, u32_at,
};
use crate::packages::DecodeError;
use std::collections::HashMap;

// ResTable_type flags
const FLAG_SPARSE: u8 = 0x01;
const FLAG_OFFSET16: u8 = 0x02;

// ResTable_entry flags
const ENTRY_FLAG_COMPLEX: u16 = 0x0001;
const ENTRY_FLAG_COMPACT: u16 = 0x0008;

const DENSITY_MEDIUM: u16 = 160;
const DENSITY_ANY: u16 = 0xFFFE;
const DENSITY_NONE: u16 = 0xFFFF;

/// Reference chains longer than this are treated as unresolvable
const MAX_REFERENCE_DEPTH: usize = 8;

/// Configuration qualifiers that matter for label and icon selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub density: u16,
}

impl Config {
    fn read(data: &[u8], at: usize) -> ChunkResult<Self> {
        let size = u32_at(data, at)? as usize;
        let mut config = Self::default();
        if size >= 12 {
            config.language = [u8_at(data, at + 8)?, u8_at(data, at + 9)?];
            config.country = [u8_at(data, at + 10)?, u8_at(data, at + 11)?];
        }
        if size >= 16 {
            config.density = u16_at(data, at + 14)?;
        }
        Ok(config)
    }

    fn is_default_locale(&self) -> bool {
        self.language == [0, 0] && self.country == [0, 0]
    }
}

#[derive(Debug)]
struct TypeChunk {
    type_id: u8,
    config: Config,
    /// entry index -> (data type, data)
    entries: HashMap<u16, (u8, u32)>,
}

#[derive(Debug)]
struct Package {
    id: u8,
    types: Vec<TypeChunk>,
}

#[derive(Debug)]
pub struct ResourceTable {
    strings: StringPool,
    packages: Vec<Package>,
}

impl ResourceTable {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        Self::parse_chunks(data).map_err(DecodeError::ResourceTable)
    }

    fn parse_chunks(data: &[u8]) -> ChunkResult<Self> {
        let header = ChunkHeader::read(data, 0)?;
        if header.kind != RES_TABLE_TYPE {
            return Err(format!("not a resource table (chunk 0x{:04x})", header.kind));
        }

        let mut strings = None;
        let mut packages = Vec::new();
        for (off, chunk) in children(data, header.header_size, header.size)? {
            match chunk.kind {
                RES_STRING_POOL_TYPE if strings.is_none() => {
                    strings = Some(StringPool::parse(data, off)?);
                }
                RES_TABLE_PACKAGE_TYPE => packages.push(parse_package(data, off, chunk)?),
                _ => {}
            }
        }

        Ok(Self {
            strings: strings.ok_or_else(|| "missing global string pool".to_string())?,
            packages,
        })
    }

    /// Resolve a resource id to text
    ///
    /// With a locale, only values qualified for that language (exact
    /// country first, then language-only) are considered, and `None`
    /// means the resource has no translation for it. Without one, the
    /// unqualified value is preferred.
    pub fn resolve_string(&self, id: u32, locale: Option<&Locale>) -> Option<String> {
        self.resolve_string_at(id, locale, 0)
    }

    fn resolve_string_at(&self, id: u32, locale: Option<&Locale>, depth: usize) -> Option<String> {
        if depth > MAX_REFERENCE_DEPTH {
            return None;
        }

        let candidates = self.candidates(id);
        let (_, data_type, data) = match locale {
            Some(locale) => candidates
                .iter()
                .find(|(c, _, _)| c.language == locale.language && c.country == locale.country)
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|(c, _, _)| c.language == locale.language && c.country == [0, 0])
                })?,
            None => candidates
                .iter()
                .find(|(c, _, _)| c.is_default_locale())
                .or_else(|| candidates.first())?,
        };

        match ResValue::from_raw(*data_type, *data, &self.strings) {
            ResValue::Reference(next) => self
                .resolve_string_at(next, locale, depth + 1)
                .or_else(|| self.resolve_string_at(next, None, depth + 1)),
            value => value.as_text(),
        }
    }

    /// File paths a resource id can resolve to, best match for
    /// `density` first
    ///
    /// Exact or next-higher densities rank first, then lower ones, then
    /// density-independent variants (usually adaptive icon XML).
    pub fn resolve_files(&self, id: u32, density: u16) -> Vec<String> {
        let mut ranked = Vec::new();
        self.collect_files(id, density, 0, &mut ranked);
        ranked.sort_by_key(|(rank, _)| *rank);

        let mut paths: Vec<String> = Vec::with_capacity(ranked.len());
        for (_, path) in ranked {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    fn collect_files(&self, id: u32, density: u16, depth: usize, out: &mut Vec<((u8, u32), String)>) {
        if depth > MAX_REFERENCE_DEPTH {
            return;
        }
        for (config, data_type, data) in self.candidates(id) {
            match ResValue::from_raw(data_type, data, &self.strings) {
                ResValue::String(path) => out.push((density_rank(config.density, density), path)),
                ResValue::Reference(next) => self.collect_files(next, density, depth + 1, out),
                _ => {}
            }
        }
    }

    /// Every configured value of a resource id
    fn candidates(&self, id: u32) -> Vec<(Config, u8, u32)> {
        let package_id = (id >> 24) as u8;
        let type_id = (id >> 16) as u8;
        let entry = (id & 0xFFFF) as u16;

        self.packages
            .iter()
            .filter(|p| p.id == package_id)
            .flat_map(|p| p.types.iter())
            .filter(|t| t.type_id == type_id)
            .filter_map(|t| {
                t.entries
                    .get(&entry)
                    .map(|&(data_type, data)| (t.config, data_type, data))
            })
            .collect()
    }
}

fn density_rank(density: u16, target: u16) -> (u8, u32) {
    match density {
        DENSITY_ANY | DENSITY_NONE => (2, 0),
        0 => density_rank(DENSITY_MEDIUM, target),
        d if d >= target => (0, u32::from(d - target)),
        d => (1, u32::from(target - d)),
    }
}

fn parse_package(data: &[u8], off: usize, chunk: ChunkHeader) -> ChunkResult<Package> {
    let id = u32_at(data, off + 8)?;
    let id = u8::try_from(id).map_err(|_| format!("package id {} out of range", id))?;

    let mut types = Vec::new();
    for (child_off, child) in children(data, off + chunk.header_size, off + chunk.size)? {
        if child.kind == RES_TABLE_TYPE_TYPE {
            types.push(parse_type(data, child_off, child)?);
        }
    }

    Ok(Package { id, types })
}

fn parse_type(data: &[u8], off: usize, chunk: ChunkHeader) -> ChunkResult<TypeChunk> {
    let type_id = u8_at(data, off + 8)?;
    let flags = u8_at(data, off + 9)?;
    let count = u32_at(data, off + 12)? as usize;
    let entries_start = u32_at(data, off + 16)? as usize;
    let config = Config::read(data, off + 20)?;

    let end = off + chunk.size;
    let offsets_at = off + chunk.header_size;
    if count > chunk.size / 2 {
        return Err(format!("type chunk claims {} entries", count));
    }

    let mut entries = HashMap::new();
    for i in 0..count {
        let (index, rel) = if flags & FLAG_SPARSE != 0 {
            let index = u16_at(data, offsets_at + i * 4)?;
            let rel = u16_at(data, offsets_at + i * 4 + 2)? as usize * 4;
            (index, rel)
        } else if flags & FLAG_OFFSET16 != 0 {
            let raw = u16_at(data, offsets_at + i * 2)?;
            if raw == 0xFFFF {
                continue;
            }
            (i as u16, raw as usize * 4)
        } else {
            let raw = u32_at(data, offsets_at + i * 4)?;
            if raw == NO_INDEX {
                continue;
            }
            (i as u16, raw as usize)
        };

        let at = off + entries_start + rel;
        if at + 8 > end {
            return Err(format!("entry {} of type {} overruns chunk", index, type_id));
        }
        if let Some(value) = read_entry_value(data, at, end)? {
            entries.insert(index, value);
        }
    }

    Ok(TypeChunk {
        type_id,
        config,
        entries,
    })
}

/// Read a simple entry's value; complex (bag) entries yield `None`
fn read_entry_value(data: &[u8], at: usize, end: usize) -> ChunkResult<Option<(u8, u32)>> {
    let size = u16_at(data, at)? as usize;
    let flags = u16_at(data, at + 2)?;

    if flags & ENTRY_FLAG_COMPACT != 0 {
        // Compact entries store the type in the high byte of flags
        return Ok(Some(((flags >> 8) as u8, u32_at(data, at + 4)?)));
    }
    if flags & ENTRY_FLAG_COMPLEX != 0 {
        return Ok(None);
    }

    let value_at = at + size;
    if value_at + 8 > end {
        return Err("entry value overruns chunk".to_string());
    }
    Ok(Some((u8_at(data, value_at + 3)?, u32_at(data, value_at + 4)?)))
}
