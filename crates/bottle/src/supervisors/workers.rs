//! 🧵 Workers: the ones who actually read the poetry while the Supervisor takes the credit.
//!
//! One worker per topic. Each owns its queue's delivery stream and its topic's
//! accumulator outright, so nothing here needs a lock. The only shared things are the
//! read-only topic registry and the sink, and the sink brings its own locks. 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::report::TopicReport;

mod topic_worker;
pub(crate) use topic_worker::TopicWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// `start` consumes the worker and hands back the task running it. The task ends when
/// the worker's input ends, with a report of what it did.
pub(crate) trait Worker {
    fn start(self) -> JoinHandle<Result<TopicReport>>;
}
