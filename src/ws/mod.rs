//! Real-time client connections

pub mod handler;
pub mod protocol;
