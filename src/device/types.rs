use serde::{Deserialize, Serialize};

/// Which end of the capture pipeline a binding feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Video capture source (camera)
    Source,
    /// Audio capture input feeding the transport's audio sink (microphone)
    Sink,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Source, DeviceKind::Sink];
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Source => write!(f, "source"),
            DeviceKind::Sink => write!(f, "sink"),
        }
    }
}

/// Opaque handle to a capture device, issued by the device provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(String);

impl DeviceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A capture device currently bound to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceBinding {
    pub kind: DeviceKind,
    pub handle: DeviceHandle,
    pub attached: bool,
}

/// Outcome of the per-kind permission requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceGrants {
    pub source: bool,
    pub sink: bool,
}

impl DeviceGrants {
    pub fn all() -> Self {
        Self {
            source: true,
            sink: true,
        }
    }

    pub fn is_granted(&self, kind: DeviceKind) -> bool {
        match kind {
            DeviceKind::Source => self.source,
            DeviceKind::Sink => self.sink,
        }
    }
}
