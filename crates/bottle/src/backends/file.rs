//! 📂 File backends: fragments from a file, poems into files.
//!
//! The broker half replays an NDJSON file of fragments through real queues and then
//! shuts the queues so everything drains. The sink half keeps one NDJSON file per
//! table, one poem per line. Neither asks for a database. Both ask for a disk. 🦆

mod file_broker;
mod file_sink;

pub(crate) use file_broker::FileBroker;
pub(crate) use file_sink::FilePoemSink;
pub use file_broker::FileBrokerConfig;
pub use file_sink::FileSinkConfig;
