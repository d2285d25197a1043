//! 🔌 Backends: where the real I/O happens.
//!
//! 📮 Brokers pour fragments in, 🗄️ sinks swallow poems whole.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Need fragments from RAM? From a file someone
//! left on the desk? Need poems written to disk, to memory, or POSTed to some storage
//! service that swears it has a 99.9% SLA? We've got a backend for that.
//!
//! 🦆 The duck is here because every file must have one. This is law.

pub(crate) mod broker;
pub(crate) mod sink;
pub(crate) mod in_mem;
pub(crate) mod file;
pub(crate) mod http;

pub(crate) use broker::{Broker, BrokerBackend, Delivery, DeliveryStream};
pub(crate) use sink::{PoemSink, SinkBackend};

// 🎯 Re-export backend-specific configs so callers can do `backends::FileSinkConfig`
// instead of spelunking into `backends::file::file_sink::FileSinkConfig`.
pub use file::{FileBrokerConfig, FileSinkConfig};
pub use http::HttpSinkConfig;
