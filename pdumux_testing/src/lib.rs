//! Test doubles and fixtures for exercising a [`pdumux::RxEngine`].
//!
//! The recording consumer and transport capture every callback the engine
//! makes so tests can assert on delivery order and credit accounting.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use pdumux_testing::{RecordingConsumer, RecordingTransport, frame};
//!
//! let consumer = Arc::new(RecordingConsumer::default());
//! let transport = Arc::new(RecordingTransport::default());
//! let bytes = frame(0x10, b"hi");
//! assert_eq!(bytes.len(), 10);
//! # let _ = (consumer, transport);
//! ```

pub mod consumers;
pub mod frames;
pub mod logging;
pub mod metrics;
pub mod transport;

pub use consumers::{Event, RecordingConsumer};
pub use frames::{frame, frame_with_endianness, frames};
pub use logging::{LoggerHandle, logger};
pub use metrics::{CounterSample, counter_total, counters, debugging_recorder_setup};
pub use transport::RecordingTransport;
