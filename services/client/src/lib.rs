//! Robot Teaching Operator Client
//!
//! Connects a teaching session to the robot backend and drives it from a
//! terminal: channel plumbing, file uploads, voice playback and rendering.
//! The `client` binary wires these together.

pub mod audio;
pub mod config;
pub mod connection;
pub mod render;
pub mod runtime;
pub mod upload;
