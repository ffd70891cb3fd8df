//! Workflows spanning several repositories and the image storage.

pub mod articles;
pub mod event_recording;

pub use event_recording::{log_event, RecordEventCommand};
