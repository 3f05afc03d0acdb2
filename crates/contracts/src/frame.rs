//! Frame - one sampling instant of a multitouch surface
//!
//! Contact records as reported by the driver, and the immutable frame that
//! the distribution core shares between subscriber queues.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::DeviceId;

/// Shared, immutable frame handle.
///
/// Cloning retains, dropping releases; the frame is deallocated when the last
/// queue (or pump) holding it lets go.
pub type FrameRef = Arc<Frame>;

/// Lifecycle state of a tracked contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactState {
    NotTracking,
    StartInRange,
    HoverInRange,
    MakeTouch,
    Touching,
    BreakTouch,
    LingerInRange,
    OutOfRange,
}

impl ContactState {
    /// Numeric driver code (0..=7)
    pub fn code(self) -> i32 {
        match self {
            Self::NotTracking => 0,
            Self::StartInRange => 1,
            Self::HoverInRange => 2,
            Self::MakeTouch => 3,
            Self::Touching => 4,
            Self::BreakTouch => 5,
            Self::LingerInRange => 6,
            Self::OutOfRange => 7,
        }
    }

    /// Decode a driver code; unknown codes map to `None`
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NotTracking),
            1 => Some(Self::StartInRange),
            2 => Some(Self::HoverInRange),
            3 => Some(Self::MakeTouch),
            4 => Some(Self::Touching),
            5 => Some(Self::BreakTouch),
            6 => Some(Self::LingerInRange),
            7 => Some(Self::OutOfRange),
            _ => None,
        }
    }
}

/// Normalized 2D vector (0..1 for positions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One tracked touch point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Driver-assigned contact identifier, stable while the finger is tracked
    pub identifier: i32,

    /// Driver frame counter carried on the contact itself
    pub frame: i32,

    /// Lifecycle state
    pub state: ContactState,

    /// Normalized position
    pub position: Point2,

    /// Normalized velocity
    pub velocity: Point2,

    /// Contact size (pressure proxy)
    pub size: f32,

    /// Ellipse orientation (radians)
    pub angle: f32,

    /// Ellipse major axis
    pub major_axis: f32,

    /// Ellipse minor axis
    pub minor_axis: f32,
}

/// Immutable snapshot of all contacts reported in one sampling instant.
///
/// Fully populated at construction; there are no mutators, so readers on any
/// thread need no synchronization on its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    device: DeviceId,
    frame_index: u64,
    timestamp: f64,
    contacts: Vec<Contact>,
}

impl Frame {
    /// Build a frame from a snapshot of contact records
    pub fn new(device: DeviceId, frame_index: u64, timestamp: f64, contacts: Vec<Contact>) -> Self {
        Self {
            device,
            frame_index,
            timestamp,
            contacts,
        }
    }

    /// Build a shared frame with a single owner
    pub fn create(
        device: DeviceId,
        frame_index: u64,
        timestamp: f64,
        contacts: &[Contact],
    ) -> FrameRef {
        Arc::new(Self::new(device, frame_index, timestamp, contacts.to_vec()))
    }

    /// Source device
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Monotonically increasing driver frame index
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Capture timestamp (driver clock, seconds)
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Contacts in driver order
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// Number of contacts
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// True when no finger is on the surface
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(identifier: i32) -> Contact {
        Contact {
            identifier,
            frame: 1,
            state: ContactState::Touching,
            position: Point2::new(0.5, 0.5),
            velocity: Point2::default(),
            size: 0.3,
            angle: 1.57,
            major_axis: 10.0,
            minor_axis: 8.0,
        }
    }

    #[test]
    fn test_state_codes() {
        for code in 0..=7 {
            let state = ContactState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(ContactState::from_code(8), None);
        assert_eq!(ContactState::from_code(-1), None);
    }

    #[test]
    fn test_create_copies_contacts() {
        let contacts = vec![contact(1), contact(2)];
        let frame = Frame::create("dev".into(), 42, 1.5, &contacts);

        assert_eq!(Arc::strong_count(&frame), 1);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.frame_index(), 42);
        assert_eq!(frame.device(), &DeviceId::from("dev"));
        assert_eq!(frame.contacts()[1].identifier, 2);
    }

    #[test]
    fn test_frame_serde_shape() {
        let frame = Frame::new("dev".into(), 1, 0.25, vec![contact(3)]);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["device"], "dev");
        assert_eq!(json["contacts"][0]["state"], "touching");
    }
}
