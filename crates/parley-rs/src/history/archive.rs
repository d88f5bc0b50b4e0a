//! Durable archive of completed question/answer exchanges.
//!
//! One JSON file holds every record. Ids are assigned on insert as one past
//! the largest existing id, so they stay unique across process restarts.

use super::log::write_atomic;
use crate::Error;
use crate::api::Usage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationRecord {
    pub id: u64,
    pub question: String,
    pub answer: String,
    pub model_used: String,
    #[serde(default)]
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ConversationArchive {
    path: PathBuf,
    records: Vec<ConversationRecord>,
}

impl ConversationArchive {
    /// Open the archive at `path`. A missing file is an empty archive.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record and persist the archive. Returns the stored record.
    pub fn add(
        &mut self,
        question: impl Into<String>,
        answer: impl Into<String>,
        model_used: impl Into<String>,
        usage: Usage,
    ) -> Result<&ConversationRecord, Error> {
        let id = self.records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        self.records.push(ConversationRecord {
            id,
            question: question.into(),
            answer: answer.into(),
            model_used: model_used.into(),
            usage,
            created_at: Utc::now(),
        });
        let json = serde_json::to_string_pretty(&self.records)?;
        if let Err(e) = write_atomic(&self.path, json.as_bytes()) {
            self.records.pop();
            return Err(e.into());
        }
        debug!("Archived conversation {id} to {}", self.path.display());
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn all(&self) -> &[ConversationRecord] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&ConversationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
