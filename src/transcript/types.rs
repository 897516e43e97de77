//! Transcript data types.
//!
//! A transcript is the ordered record of one evaluation session: every
//! action the subject performed and every message exchanged with it.
//! Scoring harnesses read this file back through `--trajectory_path`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of recordable action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "bash")]
    ShellCommand,
    #[serde(rename = "read_file")]
    FileRead,
    #[serde(rename = "write_file")]
    FileWrite,
    #[serde(rename = "goto_url")]
    BrowserNavigation,
    #[serde(rename = "send_message")]
    Message,
}

/// Tool names used by subject agents, mapped onto action kinds.
const TOOL_NAMES: &[(&str, ActionKind)] = &[
    ("bash", ActionKind::ShellCommand),
    ("execute_bash", ActionKind::ShellCommand),
    ("run_command", ActionKind::ShellCommand),
    ("read_file", ActionKind::FileRead),
    ("write_file", ActionKind::FileWrite),
    ("goto_url", ActionKind::BrowserNavigation),
    ("browse", ActionKind::BrowserNavigation),
    ("send_message", ActionKind::Message),
    ("finish", ActionKind::Message),
];

impl ActionKind {
    /// Looks up the action kind for a subject-side tool name.
    pub fn from_tool_name(name: &str) -> Option<Self> {
        TOOL_NAMES
            .iter()
            .find(|(tool, _)| tool.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShellCommand => "bash",
            Self::FileRead => "read_file",
            Self::FileWrite => "write_file",
            Self::BrowserNavigation => "goto_url",
            Self::Message => "send_message",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored an exchanged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    /// The other side of the conversation.
    pub fn counterpart(&self) -> Self {
        match self {
            Self::User => Self::Agent,
            Self::Agent => Self::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

/// Structured payload of an action, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionPayload {
    #[serde(rename = "bash")]
    ShellCommand { command: String, output: String },
    #[serde(rename = "read_file")]
    FileRead { path: String, content: String },
    #[serde(rename = "write_file")]
    FileWrite { path: String, content: String },
    #[serde(rename = "goto_url")]
    BrowserNavigation { url: String },
    #[serde(rename = "send_message")]
    Message {
        role: Role,
        recipient: String,
        content: String,
    },
}

impl ActionPayload {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ShellCommand { .. } => ActionKind::ShellCommand,
            Self::FileRead { .. } => ActionKind::FileRead,
            Self::FileWrite { .. } => ActionKind::FileWrite,
            Self::BrowserNavigation { .. } => ActionKind::BrowserNavigation,
            Self::Message { .. } => ActionKind::Message,
        }
    }
}

/// One recorded action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub payload: ActionPayload,
    pub timestamp: DateTime<Utc>,
}

impl Action {
    pub fn new(payload: ActionPayload) -> Self {
        Self {
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.payload.kind()
    }
}

/// Raw message exchanged with the subject, kept alongside the actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangedMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Complete record of one evaluation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Task this session evaluated.
    pub task_name: String,

    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Wall-clock duration in seconds, set when the session closes.
    #[serde(default)]
    pub duration: f64,

    /// Actions in order of occurrence.
    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub action_count: usize,

    #[serde(default)]
    pub messages: Vec<ExchangedMessage>,
}

impl Transcript {
    pub fn new(task_name: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            start_time: Utc::now(),
            end_time: None,
            duration: 0.0,
            actions: Vec::new(),
            action_count: 0,
            messages: Vec::new(),
        }
    }

    /// Whether the session has been closed.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Actions of one kind, in order.
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(move |a| a.kind() == kind)
    }
}
