//! JSON persistence of conversation logs.
//!
//! A saved log is a JSON array of [`ModelMessage`] in conversation order.
//! Loading it and resubmitting it continues the conversation.

use super::message::ModelMessage;
use crate::Error;
use std::path::Path;
use tracing::debug;

pub fn to_json(messages: &[ModelMessage]) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(messages)?)
}

pub fn from_json(json: &str) -> Result<Vec<ModelMessage>, Error> {
    Ok(serde_json::from_str(json)?)
}

/// Atomic write: serialize to a temp file next to `path`, then rename.
pub fn save_log(path: &Path, messages: &[ModelMessage]) -> Result<(), Error> {
    write_atomic(path, to_json(messages)?.as_bytes())?;
    debug!("Saved {} message(s) to {}", messages.len(), path.display());
    Ok(())
}

pub fn load_log(path: &Path) -> Result<Vec<ModelMessage>, Error> {
    let json = std::fs::read_to_string(path)?;
    let messages = from_json(&json)?;
    debug!("Loaded {} message(s) from {}", messages.len(), path.display());
    Ok(messages)
}

/// Write `bytes` to `path` via a sibling `.tmp` file and a rename, creating
/// parent directories as needed.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)
}
