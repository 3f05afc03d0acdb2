//! # Outputs
//!
//! Output collaborators for consumer delivery pumps:
//! - `LogOutput`: frame summaries through tracing
//! - `ListOutput`: per-contact 12-value records
//! - `FileOutput`: JSON-lines capture, readable by the replay driver
//! - `NetworkOutput`: UDP datagrams (JSON or bincode)
//! - `ChannelOutput`: in-process `mpsc` receiver
//!
//! `spawn_consumer` / `ConsumerGroup` build outputs from `ConsumerConfig`.

pub mod error;
pub mod factory;
pub mod outputs;

pub use contracts::FrameOutput;
pub use error::OutputError;
pub use factory::{spawn_consumer, ConsumerGroup};
pub use outputs::{
    encode_contacts, ChannelOutput, FileOutput, FileOutputConfig, ListOutput, LogOutput,
    FrameEnvelope, NetworkFormat, NetworkOutput, NetworkOutputConfig, RECORD_LEN,
};
