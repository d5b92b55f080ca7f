//! Session controller: one conversation, one in-flight submission at a time

mod controller;
mod conversation;
mod events;
mod state;
mod transcript;

pub use controller::{Session, SubmissionHandle};
pub use conversation::Conversation;
pub use events::{SessionEvent, SessionOutcome};
pub use state::SessionState;
pub use transcript::{Annotation, AnnotationLevel, Transcript};
