use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use crate::error::ArcError;

/// Copies `source` to `dest`, carrying over the modification time.
pub fn copy_preserving_mtime(source: &Path, dest: &Path) -> Result<u64, ArcError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|err| ArcError::Filesystem(err.to_string()))?;
    }
    let bytes = fs::copy(source, dest).map_err(|err| {
        ArcError::Filesystem(format!(
            "copy {} -> {}: {err}",
            source.display(),
            dest.display()
        ))
    })?;
    let modified = fs::metadata(source)
        .and_then(|meta| meta.modified())
        .map_err(|err| ArcError::Filesystem(err.to_string()))?;
    fs::File::options()
        .write(true)
        .open(dest)
        .and_then(|file| file.set_modified(modified))
        .map_err(|err| ArcError::Filesystem(err.to_string()))?;
    Ok(bytes)
}

/// Pretty JSON with four-space indentation, written via a temp file.
/// Non-ASCII characters are written as `\uXXXX` escapes.
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<(), ArcError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ArcError::Filesystem(err.to_string()))?;
    }
    let mut content = Vec::new();
    let mut serializer =
        Serializer::with_formatter(&mut content, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|err| ArcError::Filesystem(err.to_string()))?;
    let content = String::from_utf8(content)
        .map(|text| escape_non_ascii(&text))
        .map_err(|err| ArcError::Filesystem(err.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &content).map_err(|err| ArcError::Filesystem(err.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|err| ArcError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Non-ASCII text only occurs inside JSON strings, so escaping every such
/// character keeps the document valid.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
            continue;
        }
        for unit in ch.encode_utf16(&mut units).iter() {
            out.push_str(&format!("\\u{unit:04x}"));
        }
    }
    out
}
