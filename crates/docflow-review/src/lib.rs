//! Priority + deadline-ordered human review queue with race-free claim
//! semantics (C8).

pub mod model;
pub mod reason;
pub mod repository;

pub use model::{deadline_from_now, priority_for_deadline, ReviewItem, ReviewStatus, DEFAULT_SLA_MINUTES};
pub use reason::classify;
pub use repository::{DashboardStats, Decision, ReviewRepository};
