//! `tp-domain`: configuration and trace-event types shared by the
//! toolport crates.

pub mod config;
pub mod trace;
