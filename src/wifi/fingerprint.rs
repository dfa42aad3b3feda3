//! Relocation detection from the set of neighbouring networks.
//!
//! After every successful connection the strongest few neighbours (never the
//! target network itself) are stored. Later, a scan that shares none of them
//! means the lamp was carried somewhere else and stored credentials are
//! unlikely to work.
//!
//! A single shared neighbour is enough to count as "same location". That is
//! permissive in dense areas, and kept deliberately loose.

use anyhow::Result;
use std::collections::HashSet;

use super::{ScanEntry, WifiRadio};
use crate::common::constants::{FINGERPRINT_MAX_NEIGHBORS, FINGERPRINT_MAX_SSID_LEN, NS_FINGERPRINT};
use crate::storage::{KeyValueStore, Namespace, SharedStore, StoredValue};

const KEY_COUNT: &str = "count";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationMatch {
    /// At least one stored neighbour is visible.
    Same,
    /// Stored set is non-empty and nothing in it is visible.
    Moved,
    /// Nothing stored yet.
    Unknown,
    /// The scan came back empty, which usually means it failed.
    ScanFailed,
}

impl LocationMatch {
    /// Only a positive `Moved` counts as relocation.
    pub fn is_same_location(self) -> bool {
        !matches!(self, LocationMatch::Moved)
    }
}

/// Ordered neighbour names, strongest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    neighbors: Vec<String>,
}

impl Fingerprint {
    pub fn from_neighbors<I, S>(neighbors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            neighbors: neighbors.into_iter().map(Into::into).collect(),
        }
    }

    /// Strongest distinct neighbours from a scan, skipping hidden networks and
    /// `exclude` (the network we are joined to).
    pub fn capture(scan: &[ScanEntry], exclude: Option<&str>) -> Self {
        let mut sorted: Vec<&ScanEntry> = scan.iter().collect();
        sorted.sort_by(|a, b| b.rssi.cmp(&a.rssi));

        let mut seen = HashSet::new();
        let neighbors = sorted
            .into_iter()
            .filter(|entry| !entry.ssid.is_empty())
            .filter(|entry| Some(entry.ssid.as_str()) != exclude)
            .map(|entry| truncate_ssid(&entry.ssid))
            .filter(|ssid| seen.insert(ssid.clone()))
            .take(FINGERPRINT_MAX_NEIGHBORS)
            .collect();

        Self { neighbors }
    }

    pub fn neighbors(&self) -> &[String] {
        &self.neighbors
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn compare(&self, scan: &[ScanEntry]) -> LocationMatch {
        if self.neighbors.is_empty() {
            return LocationMatch::Unknown;
        }
        if scan.is_empty() {
            return LocationMatch::ScanFailed;
        }
        let visible: HashSet<String> = scan.iter().map(|e| truncate_ssid(&e.ssid)).collect();
        if self.neighbors.iter().any(|n| visible.contains(n)) {
            LocationMatch::Same
        } else {
            LocationMatch::Moved
        }
    }
}

fn truncate_ssid(ssid: &str) -> String {
    ssid.chars().take(FINGERPRINT_MAX_SSID_LEN).collect()
}

/// Persisted fingerprint in the `wifi_fp` namespace.
pub struct FingerprintStore {
    store: SharedStore,
    current: Fingerprint,
}

impl FingerprintStore {
    /// Load the stored fingerprint. Unreadable entries are treated as absent.
    pub fn load(store: SharedStore) -> Result<Self> {
        let count = store.get_i64(NS_FINGERPRINT, KEY_COUNT)?.unwrap_or(0).max(0) as usize;
        let mut neighbors = Vec::new();
        for index in 0..count.min(FINGERPRINT_MAX_NEIGHBORS) {
            if let Some(ssid) = store.get_string(NS_FINGERPRINT, &format!("n{index}"))? {
                neighbors.push(ssid);
            }
        }
        Ok(Self {
            store,
            current: Fingerprint { neighbors },
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.current
    }

    /// Compare an existing scan against the stored neighbours.
    pub fn check(&self, scan: &[ScanEntry]) -> LocationMatch {
        self.current.compare(scan)
    }

    /// Scan and report whether we are still where the fingerprint was taken.
    pub fn is_same_location(&self, radio: &mut dyn WifiRadio) -> bool {
        let scan = radio.scan();
        let result = self.check(&scan);
        match result {
            LocationMatch::Moved => log_warning!(
                "None of {} stored neighbours visible, lamp was moved",
                self.current.neighbors.len()
            ),
            LocationMatch::ScanFailed => {
                log_debug!("Fingerprint scan returned nothing, assuming same location")
            }
            _ => {}
        }
        result.is_same_location()
    }

    /// Scan and store the current neighbours, excluding `exclude_target`.
    pub fn refresh(&mut self, radio: &mut dyn WifiRadio, exclude_target: Option<&str>) -> Result<()> {
        let scan = radio.scan();
        self.refresh_from_scan(&scan, exclude_target)
    }

    /// Replace the stored fingerprint. An empty scan keeps the previous one.
    pub fn refresh_from_scan(&mut self, scan: &[ScanEntry], exclude_target: Option<&str>) -> Result<()> {
        if scan.is_empty() {
            log_debug!("Empty scan, keeping previous fingerprint");
            return Ok(());
        }

        let fingerprint = Fingerprint::capture(scan, exclude_target);
        let mut entries = Namespace::new();
        entries.insert(
            KEY_COUNT.to_string(),
            StoredValue::Integer(fingerprint.neighbors.len() as i64),
        );
        for (index, ssid) in fingerprint.neighbors.iter().enumerate() {
            entries.insert(format!("n{index}"), StoredValue::Text(ssid.clone()));
        }
        self.store.replace_namespace(NS_FINGERPRINT, entries)?;

        log_decorated!("Location fingerprint saved ({} neighbours)", fingerprint.neighbors.len());
        for ssid in &fingerprint.neighbors {
            log_indented!("{}", ssid);
        }
        self.current = fingerprint;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.store.clear_namespace(NS_FINGERPRINT)?;
        self.current = Fingerprint::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn entries(names: &[(&str, i32)]) -> Vec<ScanEntry> {
        names.iter().map(|(n, r)| ScanEntry::new(n, *r)).collect()
    }

    #[test]
    fn test_capture_keeps_four_strongest_without_target() {
        let scan = entries(&[
            ("HomeNet", -40),
            ("A", -80),
            ("B", -50),
            ("", -45),
            ("C", -60),
            ("B", -70),
            ("D", -55),
            ("E", -90),
        ]);
        let fp = Fingerprint::capture(&scan, Some("HomeNet"));
        assert_eq!(fp.neighbors(), ["B", "D", "C", "A"]);
    }

    #[test]
    fn test_capture_truncates_long_names() {
        let long = "x".repeat(40);
        let fp = Fingerprint::capture(&[ScanEntry::new(&long, -50)], None);
        assert_eq!(fp.neighbors()[0].len(), FINGERPRINT_MAX_SSID_LEN);
    }

    #[test]
    fn test_compare_outcomes() {
        let fp = Fingerprint::from_neighbors(["A", "B"]);
        assert_eq!(fp.compare(&entries(&[("Z", -50), ("B", -80)])), LocationMatch::Same);
        assert_eq!(fp.compare(&entries(&[("Z", -50)])), LocationMatch::Moved);
        assert_eq!(fp.compare(&[]), LocationMatch::ScanFailed);
        assert_eq!(
            Fingerprint::default().compare(&entries(&[("Z", -50)])),
            LocationMatch::Unknown
        );
        assert!(LocationMatch::ScanFailed.is_same_location());
        assert!(LocationMatch::Unknown.is_same_location());
        assert!(!LocationMatch::Moved.is_same_location());
    }

    #[test]
    fn test_refresh_persists_and_reloads() {
        crate::logger::Log::set_enabled(false);
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut fps = FingerprintStore::load(store.clone()).unwrap();
        assert!(fps.fingerprint().is_empty());

        fps.refresh_from_scan(&entries(&[("HomeNet", -40), ("A", -60), ("B", -70)]), Some("HomeNet"))
            .unwrap();

        let reloaded = FingerprintStore::load(store.clone()).unwrap();
        assert_eq!(reloaded.fingerprint().neighbors(), ["A", "B"]);
        assert_eq!(store.get_i64(NS_FINGERPRINT, "count").unwrap(), Some(2));
    }

    #[test]
    fn test_refresh_overwrites_wholesale_and_empty_scan_keeps_old() {
        crate::logger::Log::set_enabled(false);
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut fps = FingerprintStore::load(store.clone()).unwrap();
        fps.refresh_from_scan(&entries(&[("A", -60), ("B", -61), ("C", -62), ("D", -63)]), None)
            .unwrap();
        fps.refresh_from_scan(&entries(&[("E", -60)]), None).unwrap();
        assert_eq!(store.get_string(NS_FINGERPRINT, "n3").unwrap(), None);

        fps.refresh_from_scan(&[], None).unwrap();
        assert_eq!(fps.fingerprint().neighbors(), ["E"]);
    }

    #[test]
    fn test_clear() {
        crate::logger::Log::set_enabled(false);
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut fps = FingerprintStore::load(store.clone()).unwrap();
        fps.refresh_from_scan(&entries(&[("A", -60)]), None).unwrap();
        fps.clear().unwrap();
        assert!(fps.fingerprint().is_empty());
        assert!(store.entries(NS_FINGERPRINT).unwrap().is_empty());
    }

    #[test]
    fn test_is_same_location_scans_the_radio() {
        use crate::clock::SimulatedClock;
        use crate::common::constants::test_constants::*;
        use crate::wifi::sim::SimEnvironment;

        crate::logger::Log::set_enabled(false);
        let env = SimEnvironment::at_home(SimulatedClock::shared(), TEST_HOME_SSID, &TEST_NEIGHBORS);
        let mut radio = env.radio();
        let mut fps = FingerprintStore::load(Arc::new(MemoryStore::new())).unwrap();

        // Nothing stored yet is not relocation.
        assert!(fps.is_same_location(&mut radio));

        fps.refresh(&mut radio, Some(TEST_HOME_SSID)).unwrap();
        assert!(fps.is_same_location(&mut radio));

        // A failed scan is not relocation either.
        env.set_scan_fails(true);
        assert!(fps.is_same_location(&mut radio));

        env.set_scan_fails(false);
        env.set_visible(
            TEST_FOREIGN_NETWORKS
                .iter()
                .map(|name| ScanEntry::new(name, -60))
                .collect(),
        );
        assert!(!fps.is_same_location(&mut radio));

        // One familiar neighbour among strangers is enough.
        let mut mixed: Vec<ScanEntry> = TEST_FOREIGN_NETWORKS
            .iter()
            .map(|name| ScanEntry::new(name, -60))
            .collect();
        mixed.push(ScanEntry::new(TEST_NEIGHBORS[3], -90));
        env.set_visible(mixed);
        assert!(fps.is_same_location(&mut radio));
    }

    proptest! {
        #[test]
        fn prop_any_shared_neighbor_means_same_location(
            stored in prop::collection::vec("[a-z]{1,8}", 1..=4),
            others in prop::collection::vec("[A-Z]{1,8}", 0..10),
            pick in any::<prop::sample::Index>(),
        ) {
            let fp = Fingerprint::from_neighbors(stored.clone());
            let mut scan: Vec<ScanEntry> = others.iter().map(|s| ScanEntry::new(s, -70)).collect();
            let picked: &String = pick.get(&stored);
            scan.push(ScanEntry::new(picked, -80));
            prop_assert_eq!(fp.compare(&scan), LocationMatch::Same);
        }

        #[test]
        fn prop_disjoint_sets_mean_moved(
            stored in prop::collection::vec("[a-z]{1,8}", 1..=4),
            others in prop::collection::vec("[A-Z]{1,8}", 1..10),
        ) {
            let fp = Fingerprint::from_neighbors(stored);
            let scan: Vec<ScanEntry> = others.iter().map(|s| ScanEntry::new(s, -70)).collect();
            prop_assert_eq!(fp.compare(&scan), LocationMatch::Moved);
        }

        #[test]
        fn prop_capture_never_contains_target(
            names in prop::collection::vec(("[a-c]{1,2}", -95i32..-30), 0..12),
        ) {
            let scan: Vec<ScanEntry> = names.iter().map(|(n, r)| ScanEntry::new(n, *r)).collect();
            let fp = Fingerprint::capture(&scan, Some("a"));
            prop_assert!(fp.neighbors().len() <= FINGERPRINT_MAX_NEIGHBORS);
            prop_assert!(!fp.neighbors().iter().any(|n| n == "a"));
        }
    }
}
