//! Persisted progress cursor over the link list. One instance owns the
//! progress file for the duration of a run; nothing else writes it.

use std::fs;
use std::ops::Range;
use std::path::PathBuf;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::fsio;

pub const PROGRESS_FILE: &str = "progress_state.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Index of the first link not yet fully processed and flushed.
    pub next_index: usize,
    pub chunk_size: usize,
    pub completed: bool,
}

#[derive(Debug)]
pub struct ResumeManager {
    path: PathBuf,
    total: usize,
    state: ProgressState,
}

impl ResumeManager {
    /// Reads the progress file, or starts a fresh cursor at index 0. The
    /// caller's `chunk_size` wins over the persisted one; a persisted cursor
    /// beyond the end of the link list is refused as corrupt rather than
    /// clamped.
    pub fn load_or_init(
        path: impl Into<PathBuf>,
        total: usize,
        chunk_size: usize,
    ) -> Result<Self, StateError> {
        let path = path.into();
        let chunk_size = chunk_size.max(1);

        let state = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let mut state: ProgressState = serde_json::from_str(&text)?;
            if state.next_index > total {
                return Err(StateError::Corrupt(format!(
                    "progress cursor {} exceeds link count {}",
                    state.next_index, total
                )));
            }
            state.chunk_size = chunk_size;
            state.completed = state.next_index == total;
            info!(
                "Resumed previous session: {}/{} links processed.",
                state.next_index, total
            );
            state
        } else {
            info!("No progress file found. Starting fresh.");
            ProgressState {
                next_index: 0,
                chunk_size,
                completed: total == 0,
            }
        };

        Ok(ResumeManager { path, total, state })
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// The next contiguous slice of unprocessed link indices; empty when the
    /// whole list is done.
    pub fn next_chunk(&self) -> Range<usize> {
        if self.state.completed {
            return self.state.next_index..self.state.next_index;
        }
        let end = (self.state.next_index + self.state.chunk_size).min(self.total);
        self.state.next_index..end
    }

    /// Advances the cursor past exactly one link and persists immediately.
    ///
    /// Per-item, not per-chunk: a crash mid-chunk never reprocesses items
    /// already saved. The caller must have flushed the corresponding output
    /// before calling this (write-then-advance).
    pub fn commit_one(&mut self) -> Result<(), StateError> {
        if self.state.next_index >= self.total {
            return Err(StateError::Corrupt(
                "progress cursor is already at the end of the link list".into(),
            ));
        }
        self.state.next_index += 1;
        self.state.completed = self.state.next_index == self.total;
        self.persist()
    }

    fn persist(&self) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(&self.state)?;
        fsio::write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }
}
