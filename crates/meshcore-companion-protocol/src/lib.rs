//! MeshCore Companion Radio Protocol
//!
//! This crate provides types and utilities for talking to MeshCore companion
//! radio firmware. It is a pure codec: no I/O and no async. Every frame
//! starts with a code byte.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): start with a [`CommandCode`]
//! - **Responses** (device → host): codes `0..=20`, sent in reply to a command
//! - **Push notifications** (device → host): codes `0x80..=0x8C`, sent
//!   whenever something happens on the mesh
//!
//! Both device → host kinds decode into one [`Notification`] enum.
//!
//! # Example
//!
//! ```rust
//! use meshcore_companion_protocol::{Command, Notification};
//!
//! let frame = Command::GetDeviceTime.encode().unwrap();
//! assert_eq!(frame, vec![5]);
//!
//! let reply = Notification::decode(9, &[0x64, 0, 0, 0]).unwrap();
//! assert_eq!(reply, Notification::CurrentTime(100));
//! ```

mod codes;
mod commands;
mod constants;
mod error;
mod frame;
mod notifications;
mod types;
pub mod wire;

pub use codes::*;
pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use notifications::*;
pub use types::*;
