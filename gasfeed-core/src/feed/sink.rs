//! JSON persistence for the price mapping.
//!
//! Writes are atomic: serialize, write to `{path}.tmp`, then rename over the
//! target. A reader sees either the previous file or the new one.

use super::transform::PriceMapping;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_OUTPUT_PATH: &str = "./src/historicalGasPrices.json";

/// Errors from persisting the mapping.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub bytes: usize,
    /// BLAKE3 of the written JSON, hex encoded.
    pub data_hash: String,
}

impl WriteReceipt {
    pub fn for_bytes(data: &[u8]) -> Self {
        Self {
            bytes: data.len(),
            data_hash: blake3::hash(data).to_hex().to_string(),
        }
    }
}

/// Destination for a finished mapping.
pub trait MappingSink {
    fn write(&self, mapping: &PriceMapping) -> Result<WriteReceipt, WriteError>;
}

/// Single-line JSON with `", "` between entries and `": "` after keys, the
/// layout already committed by consumers of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }
}

/// JSON encoding used for the output file.
pub fn encode_mapping(mapping: &PriceMapping) -> Result<Vec<u8>, WriteError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    mapping.serialize(&mut ser)?;
    Ok(buf)
}

/// Writes the mapping as JSON to a fixed path, replacing any prior content.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl MappingSink for JsonFileSink {
    fn write(&self, mapping: &PriceMapping) -> Result<WriteReceipt, WriteError> {
        let data = encode_mapping(mapping)?;
        write_atomic(&self.path, &self.tmp_path(), &data)?;
        Ok(WriteReceipt::for_bytes(&data))
    }
}

/// Write `data` to `tmp` and rename it over `path`.
///
/// The parent directory must already exist.
pub(crate) fn write_atomic(path: &Path, tmp: &Path, data: &[u8]) -> Result<(), WriteError> {
    fs::write(tmp, data).map_err(|source| {
        let _ = fs::remove_file(tmp);
        WriteError::Io {
            path: tmp.to_path_buf(),
            source,
        }
    })?;

    fs::rename(tmp, path).map_err(|source| {
        let _ = fs::remove_file(tmp);
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample() -> PriceMapping {
        PriceMapping {
            prices: BTreeMap::from([(1598832000, 42_000_000_000), (1598918400, 39_000_000_000)]),
            latest: 1598918400,
        }
    }

    #[test]
    fn writes_json_and_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("historicalGasPrices.json");
        let sink = JsonFileSink::new(&path);

        let receipt = sink.write(&sample()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            r#"{"1598832000": 42000000000, "1598918400": 39000000000, "latest": 1598918400}"#
        );
        assert_eq!(receipt.bytes, written.len());
        assert!(!sink.tmp_path().exists());
    }

    #[test]
    fn replaces_existing_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");
        fs::write(&path, "x".repeat(4096)).unwrap();

        JsonFileSink::new(&path)
            .write(&PriceMapping {
                prices: BTreeMap::new(),
                latest: 7,
            })
            .unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"latest": 7}"#);
    }

    #[test]
    fn same_mapping_same_hash() {
        let tmp = TempDir::new().unwrap();
        let sink = JsonFileSink::new(tmp.path().join("out.json"));
        let a = sink.write(&sample()).unwrap();
        let b = sink.write(&sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nested_values_use_spaced_separators() {
        let value = serde_json::json!({"a": [1, 2], "b": {"c": 3}});
        let mut buf = Vec::new();
        value
            .serialize(&mut serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), r#"{"a": [1, 2], "b": {"c": 3}}"#);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_tmp_write_is_cleaned_up() {
        // The tmp name points at /dev/full, so the write fails with ENOSPC.
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("out.json");
        let sink = JsonFileSink::new(&path);
        std::os::unix::fs::symlink("/dev/full", sink.tmp_path()).unwrap();

        assert!(matches!(sink.write(&sample()), Err(WriteError::Io { .. })));
        assert!(fs::symlink_metadata(sink.tmp_path()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_a_write_error() {
        let tmp = TempDir::new().unwrap();
        let sink = JsonFileSink::new(tmp.path().join("no_such_dir").join("out.json"));
        assert!(matches!(sink.write(&sample()), Err(WriteError::Io { .. })));
    }
}
