//! Link-layer disconnect reason codes.
//!
//! Raw codes from the radio are converted here, once, into a closed
//! classification. Nothing past this module looks at numeric codes except
//! to print them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Unspecified,
    /// Authentication failures that point at the password or network name.
    WrongCredentials { code: u8 },
    Inactive,
    ApFull,
    Timeout,
    BeaconLost,
    NoApFound,
    Rejected,
    Other(u8),
}

impl DisconnectReason {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => DisconnectReason::Unspecified,
            2 | 3 | 6 | 7 | 15 | 23 | 203 | 205 => DisconnectReason::WrongCredentials { code },
            4 => DisconnectReason::Inactive,
            5 => DisconnectReason::ApFull,
            8 => DisconnectReason::Timeout,
            201 => DisconnectReason::BeaconLost,
            202 => DisconnectReason::NoApFound,
            204 => DisconnectReason::Rejected,
            other => DisconnectReason::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            DisconnectReason::Unspecified => 1,
            DisconnectReason::WrongCredentials { code } => *code,
            DisconnectReason::Inactive => 4,
            DisconnectReason::ApFull => 5,
            DisconnectReason::Timeout => 8,
            DisconnectReason::BeaconLost => 201,
            DisconnectReason::NoApFound => 202,
            DisconnectReason::Rejected => 204,
            DisconnectReason::Other(code) => *code,
        }
    }

    /// Human-readable explanation shown in logs and on the portal page.
    pub fn message(&self) -> String {
        match self {
            DisconnectReason::Unspecified => "Connection failed for an unspecified reason".into(),
            DisconnectReason::WrongCredentials { code: 2 | 3 | 6 } => {
                "Wrong password or WiFi network name".into()
            }
            DisconnectReason::WrongCredentials { code: 23 } => {
                "Too many failed attempts, check the WiFi password".into()
            }
            DisconnectReason::WrongCredentials { .. } => "Wrong WiFi password".into(),
            DisconnectReason::Inactive => "Disconnected by the router (inactive)".into(),
            DisconnectReason::ApFull => "Router has too many devices connected".into(),
            DisconnectReason::Timeout => "Connection timed out".into(),
            DisconnectReason::BeaconLost => "WiFi signal lost".into(),
            DisconnectReason::NoApFound => "WiFi network not found".into(),
            DisconnectReason::Rejected => "Router rejected the connection".into(),
            DisconnectReason::Other(code) => format!("Connection failed (code: {code})"),
        }
    }

    /// Reasons that clear up on their own once the router is back.
    pub fn is_transient(&self) -> bool {
        !matches!(self, DisconnectReason::WrongCredentials { .. })
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (reason {})", self.message(), self.code())
    }
}
