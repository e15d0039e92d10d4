//! Task broker boundary (§6): a fire-and-forget enqueue trait plus an
//! in-process channel implementation standing in for the real broker
//! (Celery/Redis in the original system).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One unit of intake work, matching the original system's task payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessTask {
    /// The job created for this attempt.
    pub job_id: String,
    /// The document to process.
    pub document_id: String,
    /// MIME type of the source bytes.
    pub content_type: String,
    /// Raw source bytes.
    pub file_bytes: Vec<u8>,
}

/// Fire-and-forget enqueue boundary. Retries with exponential backoff
/// bounded at 5 attempts are the broker's responsibility, not the worker's
/// (see `SPEC_FULL.md` §6); this trait models only the handoff.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Hand a task off for asynchronous processing.
    async fn enqueue(&self, task: ProcessTask);
}

/// An in-process `mpsc`-backed broker. Stands in for a real broker so the
/// binary is runnable standalone; the worker's run loop drains the
/// receiving half.
#[derive(Clone)]
pub struct ChannelTaskBroker {
    sender: mpsc::UnboundedSender<ProcessTask>,
}

impl ChannelTaskBroker {
    /// Create a broker and its paired receiver.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProcessTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TaskBroker for ChannelTaskBroker {
    async fn enqueue(&self, task: ProcessTask) {
        // An unbounded channel never blocks the caller; a closed receiver
        // (worker loop shut down) just drops the task silently, matching
        // fire-and-forget semantics.
        let _ = self.sender.send(task);
    }
}
