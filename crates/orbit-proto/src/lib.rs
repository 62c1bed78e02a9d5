//! Shared types and the pure player logic for orbit.
//!
//! Nothing in this crate touches a runtime, a socket, or a clock of its own:
//! callers pass `Instant`s in and receive decisions back, so every transition
//! can be driven from a plain `#[test]`.

pub mod config;
pub mod error;
pub mod machine;
pub mod platform;
pub mod playlist;
pub mod poll;
pub mod protocol;
pub mod sink;
pub mod state;
