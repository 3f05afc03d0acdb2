//! # Fanout
//!
//! Frame-distribution core.
//!
//! Responsibilities:
//! - Track device sessions and their attached consumers
//! - Open/close hardware connections without holding the process lock
//! - Fan each driver frame out to every attached consumer's queue
//! - Drain each queue on its own delivery pump, in FIFO order
//!
//! ## Example
//!
//! ```ignore
//! let registry = SessionRegistry::new(driver);
//! let consumer = Consumer::spawn(&registry, "viz", QueuePolicy::Unbounded, LogOutput::new("viz"));
//! consumer.select_device(1)?;
//! // ... frames flow ...
//! consumer.shutdown().await;
//! ```

mod critical;
pub mod consumer;
pub mod error;
pub mod metrics;
mod pump;
pub mod registry;

pub use consumer::Consumer;
pub use contracts::{ConsumerId, DeviceId, Frame, FrameRef, QueuePolicy};
pub use error::{FanoutError, Result};
pub use metrics::{describe_metrics, ConsumerMetrics, ConsumerSnapshot};
pub use registry::{SessionInfo, SessionPhase, SessionRegistry};
