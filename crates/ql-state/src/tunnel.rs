use chrono::{DateTime, Utc};
use ql_core::{codes, QuillError};
use ql_save::TunnelRecord;

/// One pending return point of a tunnel dive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelFrame {
    pub return_passage: String,
    pub position: usize,
    /// Volatile; never persisted.
    pub entered_at: Option<DateTime<Utc>>,
}

impl TunnelFrame {
    pub fn new(return_passage: impl Into<String>, position: usize) -> Self {
        Self {
            return_passage: return_passage.into(),
            position,
            entered_at: Some(Utc::now()),
        }
    }

    pub fn to_record(&self) -> TunnelRecord {
        TunnelRecord {
            return_passage: self.return_passage.clone(),
            position: self.position,
        }
    }

    pub fn from_record(record: TunnelRecord) -> Self {
        Self {
            return_passage: record.return_passage,
            position: record.position,
            entered_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelStack {
    frames: Vec<TunnelFrame>,
    limit: usize,
}

impl TunnelStack {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[TunnelFrame] {
        &self.frames
    }

    pub fn push(&mut self, frame: TunnelFrame) -> Result<(), QuillError> {
        if self.frames.len() >= self.limit {
            let recent = self
                .frames
                .iter()
                .rev()
                .take(3)
                .map(|frame| format!("{}@{}", frame.return_passage, frame.position))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(QuillError::new(
                codes::TUNNEL_OVERFLOW,
                format!(
                    "Tunnel depth limit {} reached while entering from \"{}\" (most recent: {}).",
                    self.limit, frame.return_passage, recent
                ),
            )
            .suggest("Check for a tunnel that never returns."));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<TunnelFrame, QuillError> {
        self.frames.pop().ok_or_else(|| {
            QuillError::new(
                codes::TUNNEL_UNDERFLOW,
                "Tunnel return with no pending tunnel.",
            )
            .suggest("Only return from passages entered as a tunnel.")
        })
    }

    pub fn peek(&self) -> Option<&TunnelFrame> {
        self.frames.last()
    }

    pub(crate) fn replace_frames(&mut self, frames: Vec<TunnelFrame>) {
        self.frames = frames;
    }
}
