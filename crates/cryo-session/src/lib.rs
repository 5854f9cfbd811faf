//! CryoCon Session Library
//!
//! This crate drives a CryoCon 22C temperature controller over a blocking,
//! line-oriented transport.
//!
//! # Architecture
//!
//! - [`Transport`]: `query(text) -> text` plus open/close; [`SerialTransport`]
//!   implements it over a serial port
//! - [`ChannelRegistry`]: resolves canonical tokens, seeded aliases and
//!   device display names to inputs
//! - [`LoopSources`]: which input feeds which loop, and the reverse lookup
//! - [`DeviceSession`]: connection lifecycle and every device operation
//! - [`AutoRange`]: one-step heater range controller
//!
//! Sessions are synchronous and single-owner: every I/O method takes
//! `&mut self` and blocks until the reply arrives or the transport times out.
//! Transport failures are returned as [`SessionError::Communication`] and
//! never retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use cryo_session::{AutoRange, DeviceSession, SerialTransport, Topology, TransportConfig};
//!
//! let transport = SerialTransport::new(TransportConfig::new("/dev/ttyUSB0"));
//! let mut session = DeviceSession::new(transport, Topology::cryocon_22c());
//! session.connect()?;
//!
//! let temp = session.temperature("a")?;
//! println!("input A: {temp}");
//!
//! session.set_temperature("a", 300.0)?;
//! AutoRange::default().adjust(&mut session, None)?;
//!
//! session.disconnect()?;
//! # Ok::<(), cryo_session::SessionError>(())
//! ```

pub mod autorange;
pub mod error;
pub mod loops;
pub mod registry;
pub mod session;
pub mod topology;
pub mod transport;

pub use autorange::{AutoRange, RangeChange};
pub use error::{SessionError, TransportError};
pub use loops::LoopSources;
pub use registry::ChannelRegistry;
pub use session::DeviceSession;
pub use topology::Topology;
pub use transport::{SerialTransport, Transport, TransportConfig};
