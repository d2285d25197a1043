//! 📡 HTTP backend: poems POSTed to a storage service, one request per poem.
//!
//! For when the poems live behind somebody else's API and the only thing we're
//! allowed to touch is a URL and maybe a password. 🦆

mod http_sink;

pub(crate) use http_sink::HttpPoemSink;
pub use http_sink::HttpSinkConfig;
