// Wire types exchanged with the transport layer
pub mod common;
pub mod metrics;
