//! Canonical JSON and SHA-256 hashing.
//!
//! This module implements the reproducibility policy for IrisAtlas artifacts:
//! - Canonicalization: object keys sorted, no whitespace, normalized numbers
//! - SHA-256 hashing of canonical text, raw bytes, and files
//! - The manifest integrity hash, computed over every field except itself

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Computes the SHA-256 hash of the canonical form of a JSON value.
///
/// ```text
/// value_hash = hex(SHA256(canonical(value)))
/// ```
///
/// # Example
/// ```
/// use irisatlas_spec::hash::canonical_value_hash;
///
/// let a = serde_json::json!({"x": 1, "y": 2});
/// let b = serde_json::json!({"y": 2, "x": 1});
/// assert_eq!(canonical_value_hash(&a), canonical_value_hash(&b));
/// ```
pub fn canonical_value_hash(value: &serde_json::Value) -> String {
    sha256_hex(canonicalize_json(value).as_bytes())
}

/// Computes the integrity hash of a manifest-shaped JSON object.
///
/// The `manifest_sha256` field, if present, is excluded before hashing, so
/// the hash of a stored manifest can be recomputed and compared with the
/// stored value.
pub fn manifest_hash(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut content = map.clone();
            content.remove(crate::manifest::MANIFEST_HASH_FIELD);
            canonical_value_hash(&serde_json::Value::Object(content))
        }
        other => canonical_value_hash(other),
    }
}

/// Canonicalizes a JSON value into a deterministic string.
///
/// The output:
/// - Sorts object keys lexicographically
/// - Uses `,` and `:` as the only separators, with no whitespace
/// - Formats integer-valued floats without a fractional part
/// - Escapes strings minimally
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => out.push_str(&format_number(n)),
        serde_json::Value::String(s) => write_string(s, out),
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

/// Formats a number so that equal values always render identically.
fn format_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if !f.is_finite() => "null".to_string(),
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        // Display for f64 is the shortest representation that round-trips
        Some(f) => format!("{}", f),
        None => "null".to_string(),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\x20' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Computes a SHA-256 hash of arbitrary data as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    to_hex(&digest)
}

/// Computes the SHA-256 hash of a file's contents, streaming in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
