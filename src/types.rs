use std::{fmt, time::Instant};

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub timestamp: Instant,
}

/// A video input as reported by the capture platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoDevice {
    pub device_id: String,
    pub label: String,
}

impl VideoDevice {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            label: label.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Scanning,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Scanning => "SCANNING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisResult {
    pub text: String,
    /// Local wall-clock time of completion, `HH:MM:SS`.
    pub timestamp: String,
}

/// Negotiated settings of an open stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// The device the user (or auto-selection) picked. Shared by the enumerator
/// and the stream controller through the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    device_id: Option<String>,
}

impl Selection {
    pub fn current(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.device_id.is_none()
    }

    pub fn set(&mut self, device_id: impl Into<String>) {
        self.device_id = Some(device_id.into());
    }

    pub fn clear(&mut self) {
        self.device_id = None;
    }
}
