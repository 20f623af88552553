//! Channel access control for trellis.
//!
//! Decides who may see, list, post in, and reconfigure a channel. Every
//! channel-scoped HTTP route goes through [`engine`] or [`guard`] before it
//! touches channel data.

pub mod dm;
pub mod engine;
pub mod error;
pub mod guard;

pub use error::{AccessError, DenialReason, Result};
