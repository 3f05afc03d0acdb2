//! Output implementations
//!
//! Contains LogOutput, ListOutput, FileOutput, NetworkOutput and ChannelOutput.

mod channel;
mod file;
mod list;
mod log;
mod network;

pub use self::channel::ChannelOutput;
pub use self::file::{FileOutput, FileOutputConfig};
pub use self::list::{encode_contacts, ListOutput, RECORD_LEN};
pub use self::log::LogOutput;
pub use self::network::{FrameEnvelope, NetworkFormat, NetworkOutput, NetworkOutputConfig};
