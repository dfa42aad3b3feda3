//! Classification of a failed connection attempt.

use super::ScanEntry;
use super::reason::DisconnectReason;
use crate::common::constants::HIGHEST_PORTABLE_CHANNEL;
use crate::error::LinkError;

/// Pick the first applicable explanation for a failed attempt.
///
/// Checks run in a fixed order: nothing visible, target missing, weak signal,
/// unsupported security, then the radio's disconnect reason. With no recorded
/// reason the failure is reported as unspecified.
pub fn diagnose(
    scan: &[ScanEntry],
    target: Option<&str>,
    last_reason: Option<DisconnectReason>,
    weak_signal_threshold: i32,
) -> LinkError {
    if scan.is_empty() {
        return LinkError::NoNetworksVisible;
    }

    if let Some(target) = target {
        let Some(entry) = strongest(scan, target) else {
            return LinkError::TargetNotFound {
                ssid: target.to_string(),
            };
        };

        if entry.rssi < weak_signal_threshold {
            return LinkError::WeakSignal { rssi: entry.rssi };
        }

        if !entry.security.is_supported() {
            return LinkError::UnsupportedSecurity {
                ssid: target.to_string(),
            };
        }

        if entry.channel > HIGHEST_PORTABLE_CHANNEL {
            log_warning!(
                "'{}' is on channel {}, which some regions do not allow",
                target,
                entry.channel
            );
        }
    }

    LinkError::AuthReasonCoded(last_reason.unwrap_or(DisconnectReason::Unspecified))
}

fn strongest<'a>(scan: &'a [ScanEntry], ssid: &str) -> Option<&'a ScanEntry> {
    scan.iter()
        .filter(|entry| entry.ssid == ssid)
        .max_by_key(|entry| entry.rssi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wifi::SecurityMode;

    const THRESHOLD: i32 = -85;

    fn scan() -> Vec<ScanEntry> {
        vec![ScanEntry::new("HomeNet", -60), ScanEntry::new("Cafe", -70)]
    }

    #[test]
    fn test_empty_scan_wins() {
        let reason = Some(DisconnectReason::from_code(15));
        assert_eq!(
            diagnose(&[], Some("HomeNet"), reason, THRESHOLD),
            LinkError::NoNetworksVisible
        );
    }

    #[test]
    fn test_target_missing() {
        assert_eq!(
            diagnose(&scan(), Some("Elsewhere"), None, THRESHOLD),
            LinkError::TargetNotFound {
                ssid: "Elsewhere".to_string()
            }
        );
    }

    #[test]
    fn test_weak_signal_uses_strongest_entry() {
        let entries = vec![ScanEntry::new("HomeNet", -92), ScanEntry::new("HomeNet", -88)];
        assert_eq!(
            diagnose(&entries, Some("HomeNet"), None, THRESHOLD),
            LinkError::WeakSignal { rssi: -88 }
        );
    }

    #[test]
    fn test_weak_signal_checked_before_security() {
        let mut entry = ScanEntry::new("HomeNet", -90);
        entry.security = SecurityMode::Wpa3Psk;
        assert!(matches!(
            diagnose(&[entry], Some("HomeNet"), None, THRESHOLD),
            LinkError::WeakSignal { .. }
        ));
    }

    #[test]
    fn test_wpa3_only_unsupported() {
        let mut entry = ScanEntry::new("HomeNet", -50);
        entry.security = SecurityMode::Wpa3Psk;
        assert!(matches!(
            diagnose(&[entry], Some("HomeNet"), None, THRESHOLD),
            LinkError::UnsupportedSecurity { .. }
        ));
    }

    #[test]
    fn test_falls_back_to_reason_code() {
        let reason = DisconnectReason::from_code(204);
        assert_eq!(
            diagnose(&scan(), Some("HomeNet"), Some(reason), THRESHOLD),
            LinkError::AuthReasonCoded(reason)
        );
        assert_eq!(
            diagnose(&scan(), Some("HomeNet"), None, THRESHOLD),
            LinkError::AuthReasonCoded(DisconnectReason::Unspecified)
        );
    }

    #[test]
    fn test_high_channel_is_only_a_warning() {
        crate::logger::Log::set_enabled(false);
        let mut entry = ScanEntry::new("HomeNet", -50);
        entry.channel = 13;
        assert!(matches!(
            diagnose(&[entry], Some("HomeNet"), None, THRESHOLD),
            LinkError::AuthReasonCoded(_)
        ));
    }
}
