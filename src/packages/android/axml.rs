// src/packages/android/axml.rs

//! Compiled (binary) XML reader
//!
//! Only element structure and attributes are kept; text nodes and
//! namespace scopes are skipped. That is all the manifest fields need.

use super::chunk::{
    ChunkHeader, ChunkResult, RES_STRING_POOL_TYPE, RES_XML_END_ELEMENT_TYPE,
    RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE, RES_XML_TYPE, ResValue, StringPool,
    children, u16_at, u32_at,
};
use crate::packages::DecodeError;

/// Minimum size of one attribute record
const ATTRIBUTE_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub namespace: Option<String>,
    pub name: String,
    /// Framework attribute id from the resource map, when present
    pub resource_id: Option<u32>,
    pub value: ResValue,
}

#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: String,
    /// Nesting depth; the document root is 0
    pub depth: usize,
    pub attributes: Vec<XmlAttribute>,
}

impl XmlElement {
    /// Look up an attribute by plain name
    pub fn attr(&self, name: &str) -> Option<&ResValue> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.value)
    }

    /// Look up an `android:` attribute
    ///
    /// Obfuscated manifests may strip attribute names, so the framework
    /// resource id is matched first.
    pub fn android_attr(&self, name: &str, resource_id: u32) -> Option<&ResValue> {
        self.attributes
            .iter()
            .find(|a| a.resource_id == Some(resource_id))
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|a| a.name == name && a.namespace.is_some())
            })
            .map(|a| &a.value)
    }
}

/// Flattened element list in document order
#[derive(Debug, Default)]
pub struct XmlDocument {
    pub elements: Vec<XmlElement>,
}

impl XmlDocument {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        Self::parse_chunks(data).map_err(DecodeError::BinaryXml)
    }

    fn parse_chunks(data: &[u8]) -> ChunkResult<Self> {
        let header = ChunkHeader::read(data, 0)?;
        if header.kind != RES_XML_TYPE {
            return Err(format!("not a binary XML document (chunk 0x{:04x})", header.kind));
        }

        let mut pool = StringPool::default();
        let mut resource_map: Vec<u32> = Vec::new();
        let mut elements = Vec::new();
        let mut depth = 0usize;

        for (off, chunk) in children(data, header.header_size, header.size)? {
            match chunk.kind {
                RES_STRING_POOL_TYPE => pool = StringPool::parse(data, off)?,
                RES_XML_RESOURCE_MAP_TYPE => {
                    let count = (chunk.size - chunk.header_size) / 4;
                    resource_map = (0..count)
                        .map(|i| u32_at(data, off + chunk.header_size + i * 4))
                        .collect::<ChunkResult<_>>()?;
                }
                RES_XML_START_ELEMENT_TYPE => {
                    let element = parse_start_element(data, off, chunk, depth, &pool, &resource_map)?;
                    elements.push(element);
                    depth += 1;
                }
                RES_XML_END_ELEMENT_TYPE => depth = depth.saturating_sub(1),
                _ => {}
            }
        }

        Ok(Self { elements })
    }

    /// The document element
    pub fn root(&self) -> Option<&XmlElement> {
        self.elements.iter().find(|e| e.depth == 0)
    }

    /// First element with `name` at `depth`
    pub fn find(&self, name: &str, depth: usize) -> Option<&XmlElement> {
        self.elements
            .iter()
            .find(|e| e.depth == depth && e.name == name)
    }
}

fn parse_start_element(
    data: &[u8],
    off: usize,
    chunk: ChunkHeader,
    depth: usize,
    pool: &StringPool,
    resource_map: &[u32],
) -> ChunkResult<XmlElement> {
    let ext = off + chunk.header_size;
    let end = off + chunk.size;

    let name_index = u32_at(data, ext + 4)?;
    let attribute_start = u16_at(data, ext + 8)? as usize;
    let attribute_size = u16_at(data, ext + 10)? as usize;
    let attribute_count = u16_at(data, ext + 12)? as usize;

    if attribute_count > 0 && attribute_size < ATTRIBUTE_SIZE {
        return Err(format!("attribute record too small ({} bytes)", attribute_size));
    }

    let name = pool
        .get(name_index)
        .ok_or_else(|| format!("element name index {} out of range", name_index))?
        .to_string();

    let mut attributes = Vec::with_capacity(attribute_count);
    for i in 0..attribute_count {
        let at = ext + attribute_start + i * attribute_size;
        if at + ATTRIBUTE_SIZE > end {
            return Err(format!("attribute {} of <{}> overruns element", i, name));
        }

        let ns = u32_at(data, at)?;
        let attr_name = u32_at(data, at + 4)?;
        let raw_value = u32_at(data, at + 8)?;
        let data_type = data[at + 15];
        let value_data = u32_at(data, at + 16)?;

        let mut value = ResValue::from_raw(data_type, value_data, pool);
        if value == ResValue::Null
            && let Some(raw) = pool.get(raw_value)
        {
            value = ResValue::String(raw.to_string());
        }

        attributes.push(XmlAttribute {
            namespace: pool.get(ns).map(str::to_string),
            name: pool.get(attr_name).unwrap_or_default().to_string(),
            resource_id: resource_map.get(attr_name as usize).copied(),
            value,
        });
    }

    Ok(XmlElement {
        name,
        depth,
        attributes,
    })
}
