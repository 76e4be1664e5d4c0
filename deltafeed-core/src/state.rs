//! Sinks that accumulate streamed text into chat and story state.
//!
//! Both follow the same rule: whatever text arrived stays, whether the stream completed, failed
//! or was cancelled. `settle` is called with the stream's result to close out the turn.

use serde::{Deserialize, Serialize};

use crate::consumer::{DeltaSink, Outcome};
use crate::decoder::Completion;
use crate::error::CoreResult;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Set when the reply was cut short.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "phase", content = "reason")]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Complete,
    Interrupted(String),
}

fn interruption_reason(result: &CoreResult<Outcome>) -> Option<String> {
    match result {
        Ok(Outcome::Completed(_)) => None,
        Ok(Outcome::Cancelled) => Some("cancelled".to_string()),
        Err(e) => Some(e.to_string()),
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
    pending: String,
    phase: Phase,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the user's message and get ready for the reply.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message {
            role: Role::User,
            content: content.into(),
            interrupted: false,
        });
        self.pending.clear();
        self.phase = Phase::Streaming;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Reply text received so far for the current turn.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Close out the turn. A completed stream was already committed by `on_done`; anything
    /// else keeps the partial reply, flagged as interrupted.
    pub fn settle(&mut self, result: &CoreResult<Outcome>) {
        let Some(reason) = interruption_reason(result) else {
            return;
        };
        if self.phase != Phase::Streaming {
            return;
        }
        if !self.pending.is_empty() {
            self.messages.push(Message {
                role: Role::Assistant,
                content: std::mem::take(&mut self.pending),
                interrupted: true,
            });
        }
        self.phase = Phase::Interrupted(reason);
    }
}

impl DeltaSink for Conversation {
    fn on_delta(&mut self, text: &str) {
        self.pending.push_str(text);
    }

    fn on_done(&mut self, _completion: Completion) {
        if !self.pending.is_empty() {
            self.messages.push(Message {
                role: Role::Assistant,
                content: std::mem::take(&mut self.pending),
                interrupted: false,
            });
        }
        self.phase = Phase::Complete;
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    #[default]
    Draft,
    Generating,
    Generated,
    Interrupted,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub text: String,
    pub status: SegmentStatus,
}

/// A story made of numbered segments, one of which may be streaming.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Document {
    segments: Vec<Segment>,
    active: Option<usize>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear segment `index` (growing the document if needed) and route deltas into it.
    pub fn begin(&mut self, index: usize) {
        if self.segments.len() <= index {
            self.segments.resize_with(index + 1, Segment::default);
        }
        let seg = &mut self.segments[index];
        seg.text.clear();
        seg.status = SegmentStatus::Generating;
        self.active = Some(index);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Full text of every segment, blank-line separated.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn settle(&mut self, result: &CoreResult<Outcome>) {
        if interruption_reason(result).is_none() {
            return;
        }
        if let Some(i) = self.active.take() {
            self.segments[i].status = SegmentStatus::Interrupted;
        }
    }
}

impl DeltaSink for Document {
    fn on_delta(&mut self, text: &str) {
        match self.active {
            Some(i) => self.segments[i].text.push_str(text),
            None => tracing::debug!("delta with no active segment ignored"),
        }
    }

    fn on_done(&mut self, _completion: Completion) {
        if let Some(i) = self.active.take() {
            self.segments[i].status = SegmentStatus::Generated;
        }
    }
}
