//! Speedgauge - network speed measurement client
//!
//! Connectivity monitoring, server directory, the measurement pipeline and
//! the result history it feeds.

pub mod config;
pub mod connectivity;
pub mod directory;
pub mod network_monitor;
pub mod output;
pub mod results;
pub mod storage;
pub mod testing;
