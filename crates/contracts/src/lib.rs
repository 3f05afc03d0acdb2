//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Uses the driver timestamp (seconds, f64) as the capture clock
//! - `frame_index` is the driver's monotonically increasing sample counter

mod blueprint;
mod consumer_id;
mod device;
mod device_id;
mod error;
mod frame;
mod output;

pub use blueprint::*;
pub use consumer_id::ConsumerId;
pub use device::{ContactCallback, ContactReport, DeviceDriver, DeviceEnumerator, DeviceManager};
pub use device_id::DeviceId;
pub use error::*;
pub use frame::{Contact, ContactState, Frame, FrameRef, Point2};
pub use output::{FrameOutput, LocalFrameOutput};
