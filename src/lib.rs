//! Headless driving simulation core.
//!
//! [`sim::Simulation`] wires the pieces together; the WebSocket front end in
//! [`net`] feeds it controls and commands and streams frame snapshots back.

pub mod camera;
pub mod config;
pub mod error;
pub mod math;
pub mod mirrors;
pub mod net;
pub mod physics;
pub mod presentation;
pub mod scene;
pub mod session;
pub mod sim;
pub mod state;
pub mod vehicle;
pub mod weather;

pub use error::{Error, Result};
