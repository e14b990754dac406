//! Result sinks.
//!
//! A [`ResultSink`] receives every [`ScoringRecord`] as soon as it is
//! produced. The session owns its sink for the whole run: it calls
//! [`ResultSink::begin`] before the first round and [`ResultSink::finish`]
//! when the run ends, on success and on error alike.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use altruism_types::{AgentId, GameKind, ScoringRecord, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Errors a result sink can raise.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Writing to the underlying file failed.
    #[error("sink I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[error("failed to serialize record: {source}")]
    Serialize {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// A record arrived after [`ResultSink::finish`].
    #[error("sink is already closed")]
    Closed,
}

/// Session-level facts handed to a sink before the first record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHeader {
    /// The session identifier.
    pub session: SessionId,
    /// Scenario name.
    pub scenario: String,
    /// Game family.
    pub game: GameKind,
    /// Seated players, in seat order.
    pub players: Vec<AgentId>,
    /// Round budget.
    pub rounds: u32,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
}

/// Append-only destination for scoring records.
pub trait ResultSink: Send {
    /// Called once before the first round.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the sink cannot be prepared.
    fn begin(&mut self, _header: &SessionHeader) -> Result<(), SinkError> {
        Ok(())
    }

    /// Store one record.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the record cannot be stored.
    fn record(&mut self, round: u32, agent: &AgentId, record: &ScoringRecord)
    -> Result<(), SinkError>;

    /// Called once when the session ends. Later records are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if buffered output cannot be flushed.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One stored record with its round and agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: u32,
    /// The scored agent.
    pub agent: AgentId,
    /// The score.
    pub record: ScoringRecord,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    header: Option<SessionHeader>,
    records: Vec<RoundRecord>,
    finished: bool,
}

impl MemorySink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The header passed to `begin`, if the session started.
    pub const fn header(&self) -> Option<&SessionHeader> {
        self.header.as_ref()
    }

    /// Records in arrival order.
    pub fn records(&self) -> &[RoundRecord] {
        &self.records
    }

    /// Whether `finish` has been called.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Take the stored records.
    pub fn into_records(self) -> Vec<RoundRecord> {
        self.records
    }
}

impl ResultSink for MemorySink {
    fn begin(&mut self, header: &SessionHeader) -> Result<(), SinkError> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn record(
        &mut self,
        round: u32,
        agent: &AgentId,
        record: &ScoringRecord,
    ) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Closed);
        }
        self.records.push(RoundRecord {
            round,
            agent: agent.clone(),
            record: record.clone(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }
}

/// One line of a JSON Lines results file.
#[derive(Debug, Serialize)]
struct ResultLine<'a> {
    session: Option<SessionId>,
    scenario: Option<&'a str>,
    round: u32,
    agent: &'a AgentId,
    recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    record: &'a ScoringRecord,
}

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    header: Option<SessionHeader>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Results file opened");
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            header: None,
        })
    }

    /// Path of the results file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonlSink {
    fn begin(&mut self, header: &SessionHeader) -> Result<(), SinkError> {
        self.header = Some(header.clone());
        Ok(())
    }

    fn record(
        &mut self,
        round: u32,
        agent: &AgentId,
        record: &ScoringRecord,
    ) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        let line = ResultLine {
            session: self.header.as_ref().map(|h| h.session),
            scenario: self.header.as_ref().map(|h| h.scenario.as_str()),
            round,
            agent,
            recorded_at: Utc::now(),
            record,
        };
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "Results file closed");
        }
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), error = %e, "Failed to flush results file");
            }
        }
    }
}
