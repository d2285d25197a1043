//! # Previously, on Bottle...
//!
//! 🎬 The fragments needed somewhere to wait. The poems needed somewhere to land.
//! Nobody wanted to stand up a message broker and a database just to run a unit test.
//! So this module was born: a broker and a sink that live entirely in RAM,
//! gone the moment you blink.
//!
//! [`InMemoryBroker`] keeps durable-for-the-process queues over `async-channel` and
//! counts every ack and reject in a ledger. [`InMemoryPoemSink`] keeps every stored
//! poem behind an `Arc<Mutex<...>>` so callers can inspect what arrived.
//!
//! 🦆
//!
//! ⚠️ The broker backs the tests and the `InMemory` config. The sink is for
//! tests. If you deploy the sink to prod, please also deploy a therapist.

mod in_mem_broker;
mod in_mem_sink;

pub(crate) use in_mem_broker::InMemoryBroker;
pub(crate) use in_mem_sink::InMemoryPoemSink;
