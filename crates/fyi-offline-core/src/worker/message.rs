use std::str::FromStr;

use super::ControlMessageError;

/// Out-of-band command sent by the hosting page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Activate the newly installed version without waiting for old clients.
    SkipWaiting,
}

impl ControlMessage {
    pub const SKIP_WAITING: &'static str = "SKIP_WAITING";
}

impl FromStr for ControlMessage {
    type Err = ControlMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            Self::SKIP_WAITING => Ok(Self::SkipWaiting),
            other => Err(ControlMessageError::Unknown(other.to_string())),
        }
    }
}
