//! Closed set of connectivity failures that are surfaced to the user.
//!
//! Everything else in the crate propagates `anyhow::Error`. `LinkError` exists
//! because these failures are rendered into the setup portal banner and must be
//! matched on when choosing the next connection step.

use std::fmt;

use crate::wifi::reason::DisconnectReason;

#[derive(Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The scan returned nothing at all.
    NoNetworksVisible,
    /// Networks are visible but not the stored one.
    TargetNotFound { ssid: String },
    /// The stored network is visible but below the signal threshold.
    WeakSignal { rssi: i32 },
    /// The stored network uses a security mode the radio cannot join.
    UnsupportedSecurity { ssid: String },
    /// The last attempt failed with a reason code from the radio.
    AuthReasonCoded(DisconnectReason),
    /// The neighbourhood no longer matches the stored fingerprint.
    RelocationDetected,
    /// Every discovery attempt failed.
    DiscoveryExhausted { attempts: u32 },
    /// The server `Date` header could not be parsed.
    TimeParseFailure { header: String },
}

impl LinkError {
    /// Whether retrying the same network might succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::NoNetworksVisible
            | LinkError::TargetNotFound { .. }
            | LinkError::WeakSignal { .. }
            | LinkError::DiscoveryExhausted { .. }
            | LinkError::TimeParseFailure { .. } => true,
            LinkError::AuthReasonCoded(reason) => reason.is_transient(),
            LinkError::UnsupportedSecurity { .. } | LinkError::RelocationDetected => false,
        }
    }

    /// Text for the setup portal. Failures that retrying cannot fix are
    /// flagged so the user knows the settings have to change.
    pub fn banner(&self) -> String {
        if self.is_retryable() {
            self.to_string()
        } else {
            format!("Action needed: {self}")
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::NoNetworksVisible => write!(
                f,
                "No WiFi networks found. Check that the router is powered on and in range."
            ),
            LinkError::TargetNotFound { ssid } => write!(
                f,
                "Network '{ssid}' not found. Make sure it is a 2.4GHz network (5GHz is not supported)."
            ),
            LinkError::WeakSignal { rssi } => write!(
                f,
                "WiFi signal too weak ({rssi} dBm). Move the lamp closer to the router."
            ),
            LinkError::UnsupportedSecurity { ssid } => write!(
                f,
                "Network '{ssid}' uses WPA3 only. Switch the router to WPA2/WPA3 mixed mode."
            ),
            LinkError::AuthReasonCoded(reason) => write!(f, "{}", reason.message()),
            LinkError::RelocationDetected => write!(
                f,
                "Lamp appears to have moved. Please select the WiFi network for this location."
            ),
            LinkError::DiscoveryExhausted { attempts } => {
                write!(f, "Server discovery failed after {attempts} attempts")
            }
            LinkError::TimeParseFailure { header } => {
                write!(f, "Could not parse server time from '{header}'")
            }
        }
    }
}

impl std::error::Error for LinkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_password_is_not_retryable() {
        let err = LinkError::AuthReasonCoded(DisconnectReason::from_code(15));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_target_not_found_mentions_band() {
        let err = LinkError::TargetNotFound {
            ssid: "HomeNet".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("HomeNet"));
        assert!(text.contains("2.4GHz"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_relocation_requires_user() {
        assert!(!LinkError::RelocationDetected.is_retryable());
        assert!(LinkError::RelocationDetected.banner().starts_with("Action needed: "));
    }

    #[test]
    fn test_banner_for_transient_failures_is_plain() {
        let lost = LinkError::AuthReasonCoded(DisconnectReason::BeaconLost);
        assert!(lost.is_retryable());
        assert_eq!(lost.banner(), "WiFi signal lost");
        let weak = LinkError::WeakSignal { rssi: -90 };
        assert_eq!(weak.banner(), weak.to_string());
    }
}
