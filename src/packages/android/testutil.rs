// src/packages/android/testutil.rs

//! Builders for compiled manifests and resource tables used in tests

use std::collections::HashMap;

pub(crate) const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn chunk(kind: u16, header: &[u8], body: &[u8]) -> Vec<u8> {
    let header_size = 8 + header.len();
    let mut out = Vec::with_capacity(header_size + body.len());
    put_u16(&mut out, kind);
    put_u16(&mut out, header_size as u16);
    put_u32(&mut out, (header_size + body.len()) as u32);
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    out
}

/// Encode a string pool chunk
pub(crate) fn string_pool(strings: &[&str], utf8: bool) -> Vec<u8> {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(data.len() as u32);
        if utf8 {
            let chars = s.chars().count();
            let bytes = s.as_bytes();
            push_utf8_len(&mut data, chars);
            push_utf8_len(&mut data, bytes.len());
            data.extend_from_slice(bytes);
            data.push(0);
        } else {
            let units: Vec<u16> = s.encode_utf16().collect();
            put_u16(&mut data, units.len() as u16);
            for u in units {
                put_u16(&mut data, u);
            }
            put_u16(&mut data, 0);
        }
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let header_size = 28u32;
    let strings_start = header_size + 4 * strings.len() as u32;
    let mut header = Vec::new();
    put_u32(&mut header, strings.len() as u32);
    put_u32(&mut header, 0);
    put_u32(&mut header, if utf8 { 1 << 8 } else { 0 });
    put_u32(&mut header, strings_start);
    put_u32(&mut header, 0);

    let mut body = Vec::new();
    for off in offsets {
        put_u32(&mut body, off);
    }
    body.extend_from_slice(&data);
    chunk(0x0001, &header, &body)
}

fn push_utf8_len(out: &mut Vec<u8>, len: usize) {
    if len > 0x7F {
        out.push(((len >> 8) as u8) | 0x80);
        out.push(len as u8);
    } else {
        out.push(len as u8);
    }
}

/// Attribute value in a test manifest
#[derive(Debug, Clone)]
pub(crate) enum Val {
    Str(&'static str),
    Int(u32),
    Ref(u32),
}

/// Attribute: (name, android resource id, value)
pub(crate) type Attr = (&'static str, Option<u32>, Val);

pub(crate) struct Element {
    pub name: &'static str,
    pub attrs: Vec<Attr>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: &'static str, attrs: Vec<Attr>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }
}

struct Pool {
    strings: Vec<&'static str>,
    index: HashMap<&'static str, u32>,
}

impl Pool {
    fn intern(&mut self, s: &'static str) -> u32 {
        if let Some(i) = self.index.get(s) {
            return *i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s);
        self.index.insert(s, i);
        i
    }
}

/// Compile an element tree to binary XML
///
/// Attributes with a resource id get their names interned first so the
/// resource map lines up with the string pool.
pub(crate) fn axml(root: &Element) -> Vec<u8> {
    let mut pool = Pool {
        strings: Vec::new(),
        index: HashMap::new(),
    };
    let mut res_ids = Vec::new();
    collect_res_names(root, &mut pool, &mut res_ids);
    pool.intern("android");
    pool.intern(ANDROID_NS);

    let mut body = Vec::new();
    emit_element(root, &mut pool, &mut body);

    let prefix = pool.intern("android");
    let uri = pool.intern(ANDROID_NS);
    let mut ns = Vec::new();
    put_u32(&mut ns, 1);
    put_u32(&mut ns, 0xFFFF_FFFF);
    let mut ns_body = Vec::new();
    put_u32(&mut ns_body, prefix);
    put_u32(&mut ns_body, uri);

    let mut map_body = Vec::new();
    for id in &res_ids {
        put_u32(&mut map_body, *id);
    }

    let mut content = string_pool(&pool.strings, false);
    content.extend(chunk(0x0180, &[], &map_body));
    content.extend(chunk(0x0100, &ns, &ns_body));
    content.extend(body);
    content.extend(chunk(0x0101, &ns, &ns_body));
    chunk(0x0003, &[], &content)
}

fn collect_res_names(el: &Element, pool: &mut Pool, ids: &mut Vec<u32>) {
    for (name, res_id, _) in &el.attrs {
        if let Some(id) = res_id
            && !pool.index.contains_key(name)
        {
            pool.intern(name);
            ids.push(*id);
        }
    }
    for child in &el.children {
        collect_res_names(child, pool, ids);
    }
}

fn emit_element(el: &Element, pool: &mut Pool, out: &mut Vec<u8>) {
    let uri = pool.intern(ANDROID_NS);
    let name = pool.intern(el.name);

    let mut node = Vec::new();
    put_u32(&mut node, 1);
    put_u32(&mut node, 0xFFFF_FFFF);

    let mut ext = Vec::new();
    put_u32(&mut ext, 0xFFFF_FFFF);
    put_u32(&mut ext, name);
    put_u16(&mut ext, 20);
    put_u16(&mut ext, 20);
    put_u16(&mut ext, el.attrs.len() as u16);
    put_u16(&mut ext, 0);
    put_u16(&mut ext, 0);
    put_u16(&mut ext, 0);

    for (attr_name, res_id, value) in &el.attrs {
        let ns = if res_id.is_some() { uri } else { 0xFFFF_FFFF };
        put_u32(&mut ext, ns);
        put_u32(&mut ext, pool.intern(attr_name));
        let (raw, data_type, data) = match value {
            Val::Str(s) => {
                let i = pool.intern(s);
                (i, 0x03u8, i)
            }
            Val::Int(n) => (0xFFFF_FFFF, 0x10, *n),
            Val::Ref(id) => (0xFFFF_FFFF, 0x01, *id),
        };
        put_u32(&mut ext, raw);
        put_u16(&mut ext, 8);
        ext.push(0);
        ext.push(data_type);
        put_u32(&mut ext, data);
    }
    out.extend(chunk(0x0102, &node, &ext));

    for child in &el.children {
        emit_element(child, pool, out);
    }

    let mut end = Vec::new();
    put_u32(&mut end, 0xFFFF_FFFF);
    put_u32(&mut end, name);
    out.extend(chunk(0x0103, &node, &end));
}

/// Configuration qualifiers for a test type chunk
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Config {
    pub language: [u8; 2],
    pub country: [u8; 2],
    pub density: u16,
}

impl Config {
    pub fn locale(language: &str, country: &str) -> Self {
        let mut config = Self::default();
        config.language.copy_from_slice(&language.as_bytes()[..2]);
        if !country.is_empty() {
            config.country.copy_from_slice(&country.as_bytes()[..2]);
        }
        config
    }

    pub fn density(density: u16) -> Self {
        Self {
            density,
            ..Self::default()
        }
    }
}

/// One typed entry: (entry index, data type, data)
pub(crate) type Entry = (u16, u8, u32);

pub(crate) struct TypeSpec {
    pub type_id: u8,
    pub config: Config,
    pub entries: Vec<Entry>,
    pub sparse: bool,
}

impl TypeSpec {
    pub fn new(type_id: u8, config: Config, entries: Vec<Entry>) -> Self {
        Self {
            type_id,
            config,
            entries,
            sparse: false,
        }
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }
}

fn type_chunk(spec: &TypeSpec) -> Vec<u8> {
    let count = if spec.sparse {
        spec.entries.len() as u32
    } else {
        spec.entries.iter().map(|e| e.0 as u32 + 1).max().unwrap_or(0)
    };

    let mut config = vec![0u8; 64];
    config[0..4].copy_from_slice(&64u32.to_le_bytes());
    config[8..10].copy_from_slice(&spec.config.language);
    config[10..12].copy_from_slice(&spec.config.country);
    config[14..16].copy_from_slice(&spec.config.density.to_le_bytes());

    let header_size = 8 + 12 + config.len();
    let entries_start = header_size + 4 * count as usize;

    let mut header = Vec::new();
    header.push(spec.type_id);
    header.push(if spec.sparse { 0x01 } else { 0x00 });
    put_u16(&mut header, 0);
    put_u32(&mut header, count);
    put_u32(&mut header, entries_start as u32);
    header.extend_from_slice(&config);

    let mut offsets = Vec::new();
    let mut data = Vec::new();
    if spec.sparse {
        for (index, data_type, value) in &spec.entries {
            put_u16(&mut offsets, *index);
            put_u16(&mut offsets, (data.len() / 4) as u16);
            push_entry(&mut data, *data_type, *value);
        }
    } else {
        let mut slots = vec![0xFFFF_FFFFu32; count as usize];
        for (index, data_type, value) in &spec.entries {
            slots[*index as usize] = data.len() as u32;
            push_entry(&mut data, *data_type, *value);
        }
        for slot in slots {
            put_u32(&mut offsets, slot);
        }
    }

    let mut body = offsets;
    body.extend(data);
    chunk(0x0201, &header, &body)
}

fn push_entry(out: &mut Vec<u8>, data_type: u8, data: u32) {
    put_u16(out, 8);
    put_u16(out, 0);
    put_u32(out, 0);
    put_u16(out, 8);
    out.push(0);
    out.push(data_type);
    put_u32(out, data);
}

/// Compile a single-package resource table
pub(crate) fn arsc(global_strings: &[&str], package_id: u8, types: &[TypeSpec]) -> Vec<u8> {
    let type_names = string_pool(&["string", "mipmap", "drawable"], false);
    let key_names = string_pool(&["app_name", "ic_launcher"], false);

    let mut header = Vec::new();
    put_u32(&mut header, package_id as u32);
    let mut name = [0u8; 256];
    for (i, unit) in "com.example.app".encode_utf16().enumerate() {
        name[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    header.extend_from_slice(&name);
    put_u32(&mut header, 288);
    put_u32(&mut header, 0);
    put_u32(&mut header, 288 + type_names.len() as u32);
    put_u32(&mut header, 0);
    put_u32(&mut header, 0);

    let mut body = type_names;
    body.extend(key_names);
    for spec in types {
        body.extend(type_chunk(spec));
    }
    let package = chunk(0x0200, &header, &body);

    let mut table_header = Vec::new();
    put_u32(&mut table_header, 1);
    let mut table_body = string_pool(global_strings, true);
    table_body.extend(package);
    chunk(0x0002, &table_header, &table_body)
}
