//! Per-step frame emission for an external visualizer.
//!
//! The environment never depends on a sink for correctness; the default is
//! [`NoopSink`].

use serde::{Deserialize, Serialize};

use crate::field::FieldParameters;
use crate::types::Position;

/// Snapshot of one environment step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Step count after the step that produced this frame.
    pub step: u32,
    pub agents: Vec<Position>,
    pub satellites: Vec<Position>,
    pub estimate: FieldParameters,
    pub truth: FieldParameters,
    pub kl: f64,
    pub reward: f64,
}

/// Receives frames as the environment steps.
pub trait FrameSink {
    fn emit(&mut self, frame: &Frame);
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl FrameSink for NoopSink {
    fn emit(&mut self, _frame: &Frame) {}
}

/// Keeps every frame in memory.
#[derive(Debug, Default, Clone)]
pub struct FrameRecorder {
    pub frames: Vec<Frame>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Serializes all frames as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.frames)
    }
}

impl FrameSink for FrameRecorder {
    fn emit(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
    }
}

impl<F: FnMut(&Frame)> FrameSink for F {
    fn emit(&mut self, frame: &Frame) {
        self(frame)
    }
}
