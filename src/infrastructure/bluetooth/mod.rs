//! Bluetooth Module
//!
//! Spoofed beacon advertising: frame layout, the transmit/fuzz state
//! machine and the radio backends it drives.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    BeaconService                     │
//! │  (single task: operator commands + periodic ticks)   │
//! └─────────────────────────┬────────────────────────────┘
//!                           │
//!                           ▼
//!                ┌─────────────────────┐
//!                │  BeaconController   │
//!                │  - state / counter  │
//!                │  - session address  │
//!                └─────┬─────────┬─────┘
//!                      │         │
//!                      ▼         ▼
//!              ┌──────────┐  ┌─────────────────────┐
//!              │ Protocol │  │  BeaconTransport    │
//!              │ - frames │  │  - Windows publisher│
//!              │ - fuzzing│  │  - dry run          │
//!              └──────────┘  └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Advertisement layout and payload mutation
//! - [`transport`] - Radio abstraction and its error type
//! - [`controller`] - Transmit/fuzz state machine
//! - [`service`] - Task that schedules ticks and serializes commands
//! - [`dry_run`] - Transport that only logs
//! - `publisher` - Windows advertisement publisher (Windows only)

pub mod controller;
pub mod dry_run;
pub mod protocol;
#[cfg(windows)]
pub mod publisher;
pub mod service;
pub mod transport;

// Re-export main service for convenience
pub use service::{BeaconHandle, BeaconService};
