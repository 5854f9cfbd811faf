//! CryoCon Simulation Library
//!
//! This crate provides an in-memory CryoCon 22C for exercising sessions
//! without physical hardware. [`VirtualController`] implements
//! [`cryo_session::Transport`], answers queries in the instrument's reply
//! format, applies writes to its state, and records every command line it
//! receives.
//!
//! # Example
//!
//! ```rust
//! use cryo_session::{DeviceSession, Topology};
//! use cryo_sim::VirtualController;
//!
//! let mut session = DeviceSession::new(VirtualController::new(), Topology::cryocon_22c());
//! session.connect().unwrap();
//!
//! assert_eq!(session.temperature("sample").unwrap(), 295.0);
//! assert!(session.transport().is_locked());
//!
//! session.disconnect().unwrap();
//! assert!(!session.transport().is_locked());
//! ```

pub mod controller;

pub use controller::{VirtualController, VirtualControllerConfig, VirtualInput, VirtualLoop};
