//! Transcript recording and persistence.
//!
//! - `types`: transcript, action and message records
//! - `recorder`: append-only builder used during a live exchange
//! - `storage`: JSON save/load and the archive of precomputed transcripts

pub mod recorder;
pub mod storage;
pub mod types;

pub use recorder::TranscriptRecorder;
pub use storage::{load_transcript, save_transcript, transcript_file_name, TranscriptArchive};
pub use types::{Action, ActionKind, ActionPayload, ExchangedMessage, Role, Transcript};
