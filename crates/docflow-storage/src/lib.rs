//! Document/Job/AuditLog persistence over SQLite.

pub mod audit;
pub mod documents;
pub mod error;
pub mod jobs;
pub mod models;

pub use audit::AuditRepository;
pub use documents::DocumentRepository;
pub use error::{StorageError, StorageResult};
pub use jobs::JobRepository;
pub use models::{AuditLogEntry, Document, Job, ProcessingStatus};
