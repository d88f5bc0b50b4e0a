//! Result sinks: pretty JSON files and the console.
//!
//! Files are UTF-8 with non-ASCII text written as-is, indented with four
//! spaces, and named `<prefix>_<base>.json` (or `<base>.json` without a
//! prefix).

use crate::Error;
use crate::history::log::write_atomic;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Serialize with four-space indentation.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| Error::Decode(e.to_string()))
}

/// Writes result files into one directory.
#[derive(Debug, Clone)]
pub struct JsonSink {
    dir: PathBuf,
}

impl JsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, prefix: Option<&str>, base: &str) -> PathBuf {
        let name = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}_{base}.json"),
            _ => format!("{base}.json"),
        };
        self.dir.join(name)
    }

    /// Write `records` and return the file path. Creates the directory.
    pub fn save<T: Serialize + ?Sized>(
        &self,
        prefix: Option<&str>,
        base: &str,
        records: &T,
    ) -> Result<PathBuf, Error> {
        let path = self.path_for(prefix, base);
        let json = to_pretty_json(records)?;
        write_atomic(&path, json.as_bytes())?;
        info!("Saved results to {}", path.display());
        Ok(path)
    }
}

/// Prints results to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn print<T: Serialize + ?Sized>(&self, title: &str, records: &T) -> Result<(), Error> {
        let json = to_pretty_json(records)?;
        if !title.is_empty() {
            println!("{title}");
        }
        println!("{json}");
        Ok(())
    }
}
