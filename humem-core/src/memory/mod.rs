//! Memory data model: persisted records and the in-process short-term buffer.

pub mod record;
pub mod short_term;

pub use record::{ConflictCandidate, MemoryRecord, RecordMetadata, SupersessionReason};
pub use short_term::{ShortTermBuffer, ShortTermEntry};
