// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use plist::{Dictionary, Value};
use sideload::packages::DecoderSet;
use sideload::{Catalog, SqliteStorage, StagedUpload};
use std::io::{Cursor, Write};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

/// Create a catalog over a fresh store.
///
/// Returns (TempDir, Catalog) - keep the TempDir alive to prevent cleanup.
pub fn setup_catalog(delete_enabled: bool) -> (TempDir, Catalog) {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open(dir.path()).unwrap();
    let catalog = Catalog::new(Arc::new(storage), DecoderSet::default(), delete_enabled);
    (dir, catalog)
}

/// Stage `bytes` as an upload named `file_name`
pub fn stage(catalog: &Catalog, file_name: &str, bytes: &[u8]) -> StagedUpload {
    let mut upload = catalog.stage(file_name).unwrap();
    upload.as_file_mut().write_all(bytes).unwrap();
    upload.as_file_mut().flush().unwrap();
    upload
}

fn zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A 1x1 RGBA PNG
pub fn png() -> Vec<u8> {
    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(kind);
        hasher.update(data);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(kind);
        out.extend_from_slice(data);
        out.extend_from_slice(&hasher.finalize().to_be_bytes());
    }

    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&[0, 0x11, 0x22, 0x33, 0xFF]).unwrap();
    let idat = encoder.finish().unwrap();

    let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
    chunk(&mut out, b"IHDR", &ihdr);
    chunk(&mut out, b"IDAT", &idat);
    chunk(&mut out, b"IEND", &[]);
    out
}

/// Build an IPA with an XML Info.plist and one icon
pub fn ipa(identifier: &str, name: &str, version: &str, build: &str) -> Vec<u8> {
    let mut primary = Dictionary::new();
    primary.insert(
        "CFBundleIconFiles".to_string(),
        Value::Array(vec![Value::String("AppIcon60x60".to_string())]),
    );
    let mut icons = Dictionary::new();
    icons.insert("CFBundlePrimaryIcon".to_string(), Value::Dictionary(primary));

    let mut info = Dictionary::new();
    info.insert("CFBundleIdentifier".to_string(), Value::String(identifier.to_string()));
    info.insert("CFBundleDisplayName".to_string(), Value::String(name.to_string()));
    info.insert("CFBundleShortVersionString".to_string(), Value::String(version.to_string()));
    info.insert("CFBundleVersion".to_string(), Value::String(build.to_string()));
    info.insert("CFBundleIcons".to_string(), Value::Dictionary(icons));

    let mut plist = Vec::new();
    Value::Dictionary(info).to_writer_xml(&mut plist).unwrap();
    let icon = png();

    zip(&[
        ("Payload/App.app/Info.plist", &plist),
        ("Payload/App.app/AppIcon60x60@2x.png", &icon),
        ("Payload/App.app/App", b"\xCF\xFA\xED\xFE"),
    ])
}

const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";
const ICON_PATH: &str = "res/mipmap-xxxhdpi/ic_launcher.png";

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn res_chunk(kind: u16, header: &[u8], body: &[u8]) -> Vec<u8> {
    let header_size = 8 + header.len();
    let mut out = Vec::new();
    put_u16(&mut out, kind);
    put_u16(&mut out, header_size as u16);
    put_u32(&mut out, (header_size + body.len()) as u32);
    out.extend_from_slice(header);
    out.extend_from_slice(body);
    out
}

fn utf16_pool(strings: &[&str]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for s in strings {
        offsets.push(data.len() as u32);
        let units: Vec<u16> = s.encode_utf16().collect();
        put_u16(&mut data, units.len() as u16);
        for u in units {
            put_u16(&mut data, u);
        }
        put_u16(&mut data, 0);
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let mut header = Vec::new();
    put_u32(&mut header, strings.len() as u32);
    put_u32(&mut header, 0);
    put_u32(&mut header, 0);
    put_u32(&mut header, 28 + 4 * strings.len() as u32);
    put_u32(&mut header, 0);

    let mut body = Vec::new();
    for off in offsets {
        put_u32(&mut body, off);
    }
    body.extend_from_slice(&data);
    res_chunk(0x0001, &header, &body)
}

/// (namespace index or NONE, name index, data type, data)
type RawAttr = (u32, u32, u8, u32);

const NONE: u32 = 0xFFFF_FFFF;
const TYPE_STRING: u8 = 0x03;
const TYPE_INT_DEC: u8 = 0x10;

fn start_element(name: u32, attrs: &[RawAttr]) -> Vec<u8> {
    let mut node = Vec::new();
    put_u32(&mut node, 1);
    put_u32(&mut node, NONE);

    let mut ext = Vec::new();
    put_u32(&mut ext, NONE);
    put_u32(&mut ext, name);
    put_u16(&mut ext, 20);
    put_u16(&mut ext, 20);
    put_u16(&mut ext, attrs.len() as u16);
    put_u16(&mut ext, 0);
    put_u16(&mut ext, 0);
    put_u16(&mut ext, 0);
    for &(ns, attr_name, data_type, data) in attrs {
        put_u32(&mut ext, ns);
        put_u32(&mut ext, attr_name);
        put_u32(&mut ext, if data_type == TYPE_STRING { data } else { NONE });
        put_u16(&mut ext, 8);
        ext.push(0);
        ext.push(data_type);
        put_u32(&mut ext, data);
    }
    res_chunk(0x0102, &node, &ext)
}

fn end_element(name: u32) -> Vec<u8> {
    let mut node = Vec::new();
    put_u32(&mut node, 1);
    put_u32(&mut node, NONE);
    let mut ext = Vec::new();
    put_u32(&mut ext, NONE);
    put_u32(&mut ext, name);
    res_chunk(0x0103, &node, &ext)
}

/// Compile a minimal AndroidManifest.xml with literal label and icon
fn manifest(package: &str, label: &str, version_name: &str, version_code: u32) -> Vec<u8> {
    // Names carrying a resource id come first so the resource map lines up
    let strings = [
        "versionCode",
        "versionName",
        "label",
        "icon",
        "android",
        ANDROID_NS,
        "manifest",
        "package",
        "application",
        package,
        version_name,
        label,
        ICON_PATH,
    ];
    let resource_ids = [0x0101_021b, 0x0101_021c, 0x0101_0001, 0x0101_0002];
    let ns = 5;

    let mut map = Vec::new();
    for id in resource_ids {
        put_u32(&mut map, id);
    }

    let mut ns_node = Vec::new();
    put_u32(&mut ns_node, 1);
    put_u32(&mut ns_node, NONE);
    let mut ns_body = Vec::new();
    put_u32(&mut ns_body, 4);
    put_u32(&mut ns_body, ns);

    let mut content = utf16_pool(&strings);
    content.extend(res_chunk(0x0180, &[], &map));
    content.extend(res_chunk(0x0100, &ns_node, &ns_body));
    content.extend(start_element(
        6,
        &[
            (ns, 0, TYPE_INT_DEC, version_code),
            (ns, 1, TYPE_STRING, 10),
            (NONE, 7, TYPE_STRING, 9),
        ],
    ));
    content.extend(start_element(
        8,
        &[(ns, 2, TYPE_STRING, 11), (ns, 3, TYPE_STRING, 12)],
    ));
    content.extend(end_element(8));
    content.extend(end_element(6));
    content.extend(res_chunk(0x0101, &ns_node, &ns_body));
    res_chunk(0x0003, &[], &content)
}

/// Build an APK without a resource table; label and icon are literals
pub fn apk(package: &str, label: &str, version_name: &str, version_code: u32) -> Vec<u8> {
    let manifest = manifest(package, label, version_name, version_code);
    let icon = png();
    zip(&[
        ("AndroidManifest.xml", &manifest),
        (ICON_PATH, &icon),
        ("classes.dex", b"dex\n035\0"),
    ])
}
