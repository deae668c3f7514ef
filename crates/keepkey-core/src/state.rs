//! Bridge lifecycle state
//!
//! The state is exchanged as a bare integer code, matching what web apps
//! polling `/status` already expect.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Lifecycle state of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BridgeState {
    /// The HTTP server failed to start
    Error,
    /// Nothing has been observed yet
    #[default]
    Initializing,
    /// Server stopped and no device attached
    NoDevices,
    /// Server stopped with a device attached
    DeviceConnected,
    /// Server accepting requests
    BridgeOnline,
}

impl BridgeState {
    /// Integer code of this state
    pub fn code(self) -> i8 {
        match self {
            BridgeState::Error => -1,
            BridgeState::Initializing => 0,
            BridgeState::NoDevices => 1,
            BridgeState::DeviceConnected => 2,
            BridgeState::BridgeOnline => 3,
        }
    }

    /// Parse an integer code
    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            -1 => Ok(BridgeState::Error),
            0 => Ok(BridgeState::Initializing),
            1 => Ok(BridgeState::NoDevices),
            2 => Ok(BridgeState::DeviceConnected),
            3 => Ok(BridgeState::BridgeOnline),
            other => Err(Error::UnknownStateCode(other)),
        }
    }

    /// Default human-readable status line
    pub fn label(self) -> &'static str {
        match self {
            BridgeState::Error => "bridge error",
            BridgeState::Initializing => "preInit",
            BridgeState::NoDevices => "no devices",
            BridgeState::DeviceConnected => "keepkey connected",
            BridgeState::BridgeOnline => "bridge online",
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for BridgeState {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i8(self.code())
    }
}

impl<'de> Deserialize<'de> for BridgeState {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = i8::deserialize(deserializer)?;
        BridgeState::from_code(code).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_values() {
        assert_eq!(BridgeState::Error.code(), -1);
        assert_eq!(BridgeState::Initializing.code(), 0);
        assert_eq!(BridgeState::BridgeOnline.code(), 3);
        assert_eq!(BridgeState::default(), BridgeState::Initializing);
    }

    #[test]
    fn test_serializes_as_integer() {
        let json = serde_json::to_string(&BridgeState::DeviceConnected).unwrap();
        assert_eq!(json, "2");

        let state: BridgeState = serde_json::from_str("-1").unwrap();
        assert_eq!(state, BridgeState::Error);
    }

    #[test]
    fn test_rejects_unknown_code() {
        assert_eq!(
            BridgeState::from_code(7),
            Err(Error::UnknownStateCode(7))
        );
        assert!(serde_json::from_str::<BridgeState>("9").is_err());
    }
}
