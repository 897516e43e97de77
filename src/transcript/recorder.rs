//! Transcript recorder.
//!
//! Append-only builder for one session's transcript. Actions are kept in
//! the order they were recorded; `finish` closes the session and hands
//! back the immutable transcript.

use std::time::Instant;

use chrono::Utc;

use super::types::{Action, ActionPayload, ExchangedMessage, Role, Transcript};

/// Accumulates actions and messages for a single task session.
pub struct TranscriptRecorder {
    transcript: Transcript,
    started: Instant,
}

impl TranscriptRecorder {
    /// Starts recording a session for the given task.
    pub fn new(task_name: &str) -> Self {
        Self {
            transcript: Transcript::new(task_name),
            started: Instant::now(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.transcript.task_name
    }

    /// Appends an action stamped with the current time.
    pub fn record(&mut self, payload: ActionPayload) {
        self.transcript.actions.push(Action::new(payload));
    }

    pub fn record_shell(&mut self, command: impl Into<String>, output: impl Into<String>) {
        self.record(ActionPayload::ShellCommand {
            command: command.into(),
            output: output.into(),
        });
    }

    pub fn record_file_read(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.record(ActionPayload::FileRead {
            path: path.into(),
            content: content.into(),
        });
    }

    pub fn record_file_write(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.record(ActionPayload::FileWrite {
            path: path.into(),
            content: content.into(),
        });
    }

    pub fn record_navigation(&mut self, url: impl Into<String>) {
        self.record(ActionPayload::BrowserNavigation { url: url.into() });
    }

    /// Records one exchanged message, both as an action and in the raw
    /// message log.
    pub fn record_message(&mut self, role: Role, content: &str, message_id: Option<String>) {
        self.record(ActionPayload::Message {
            role,
            recipient: role.counterpart().to_string(),
            content: content.to_string(),
        });
        self.transcript.messages.push(ExchangedMessage {
            role,
            content: content.to_string(),
            message_id,
            timestamp: Utc::now(),
        });
    }

    pub fn actions(&self) -> &[Action] {
        &self.transcript.actions
    }

    pub fn len(&self) -> usize {
        self.transcript.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.actions.is_empty()
    }

    /// Closes the session and returns the finished transcript.
    pub fn finish(mut self) -> Transcript {
        self.transcript.end_time = Some(Utc::now());
        self.transcript.duration = self.started.elapsed().as_secs_f64();
        self.transcript.action_count = self.transcript.actions.len();
        self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::types::ActionKind;

    #[test]
    fn test_records_in_order() {
        let mut recorder = TranscriptRecorder::new("sde-create-new-repo");
        recorder.record_shell("git init", "Initialized empty Git repository");
        recorder.record_file_write("/workspace/README.md", "# repo");
        recorder.record_navigation("http://the-agent-company.com:8929");

        let kinds: Vec<ActionKind> = recorder.actions().iter().map(Action::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::ShellCommand,
                ActionKind::FileWrite,
                ActionKind::BrowserNavigation
            ]
        );

        let timestamps: Vec<_> = recorder.actions().iter().map(|a| a.timestamp).collect();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_message_goes_to_both_logs() {
        let mut recorder = TranscriptRecorder::new("pm-send-hello-message");
        recorder.record_message(Role::User, "Say hello in #general", Some("m-1".into()));
        recorder.record_message(Role::Agent, "Done", None);

        let transcript = recorder.finish();
        assert_eq!(transcript.action_count, 2);
        assert_eq!(transcript.messages.len(), 2);
        assert_eq!(transcript.messages[0].message_id.as_deref(), Some("m-1"));

        match &transcript.actions[1].payload {
            ActionPayload::Message {
                role,
                recipient,
                content,
            } => {
                assert_eq!(*role, Role::Agent);
                assert_eq!(recipient, "user");
                assert_eq!(content, "Done");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_finish_without_actions() {
        let recorder = TranscriptRecorder::new("example");
        assert!(recorder.is_empty());

        let transcript = recorder.finish();
        assert!(transcript.is_finished());
        assert_eq!(transcript.action_count, 0);
        assert!(transcript.duration >= 0.0);
    }
}
