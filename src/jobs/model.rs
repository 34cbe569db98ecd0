use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::styles::{self, DEFAULT_STYLE, Style};

pub type JobId = Uuid;

/// Job lifecycle. Variants are declared in the order a job moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Starting,
    ImprovingPrompt,
    Generating,
    Saving,
    Completed,
    Error,
}

impl JobState {
    fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::ImprovingPrompt => 1,
            Self::Generating => 2,
            Self::Saving => 3,
            Self::Completed | Self::Error => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Forward moves only; `Error` is reachable from every non-terminal state.
    pub fn can_advance_to(self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Error || next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::ImprovingPrompt => "improving_prompt",
            Self::Generating => "generating",
            Self::Saving => "saving",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_style() -> String {
    DEFAULT_STYLE.to_string()
}

fn default_true() -> bool {
    true
}

fn default_side() -> u32 {
    1024
}

fn default_samples() -> u32 {
    1
}

/// Parameters of a submission, as accepted by both front ends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_true")]
    pub improve: bool,
    #[serde(default = "default_side")]
    pub width: u32,
    #[serde(default = "default_side")]
    pub height: u32,
    #[serde(default = "default_samples")]
    pub samples: u32,
}

impl JobRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            style: default_style(),
            improve: true,
            width: default_side(),
            height: default_side(),
            samples: default_samples(),
        }
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn improve(mut self, improve: bool) -> Self {
        self.improve = improve;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

/// One tracked request. Clones handed to readers are consistent snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub message: String,
    pub original_prompt: String,
    pub style_key: String,
    pub style_name: String,
    pub improve: bool,
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub improved_prompt: Option<String>,
    pub full_prompt: Option<String>,
    pub result: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(id: JobId, prompt: &str, request: &JobRequest, now: DateTime<Utc>) -> Self {
        let style = styles::resolve(&request.style);
        Self {
            id,
            state: JobState::Starting,
            message: "Preparing...".to_string(),
            original_prompt: prompt.to_string(),
            style_key: style.key.to_string(),
            style_name: style.name.to_string(),
            improve: request.improve,
            width: request.width,
            height: request.height,
            samples: request.samples,
            improved_prompt: None,
            full_prompt: None,
            result: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn style(&self) -> &'static Style {
        styles::resolve(&self.style_key)
    }

    /// `result` is non-empty iff completed, `error` is set iff errored.
    pub fn is_consistent(&self) -> bool {
        (self.result.is_empty() != (self.state == JobState::Completed))
            && (self.error.is_some() == (self.state == JobState::Error))
    }
}
