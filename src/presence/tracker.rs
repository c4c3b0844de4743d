//! Presence lifecycle state machine.
//!
//! Each identity moves through untracked → present → absent → departed. The
//! tracker owns the only cross-cycle memory (missed ping counters); everything
//! else is written through a [`PresenceStore`] as it happens.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::db::TrackedIdentity;
use crate::error::ConfigError;
use crate::models::{DeviceState, MetadataUpdate, Observation, PresenceStatus};
use crate::settings::PresenceSettings;

use super::{filter::SignalFloor, store::PresenceStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub ping_timeout: u32,
    pub departure_threshold: u32,
    pub rssi_floor: i32,
}

impl From<&PresenceSettings> for TrackerConfig {
    fn from(settings: &PresenceSettings) -> Self {
        Self {
            ping_timeout: settings.ping_timeout,
            departure_threshold: settings.departure_threshold,
            rssi_floor: settings.rssi_floor,
        }
    }
}

impl TrackerConfig {
    /// `absent` needs at least one miss, and `departed` has to come after it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_timeout == 0 {
            return Err(ConfigError::NotPositive {
                field: "ping_timeout",
            });
        }
        if self.departure_threshold <= self.ping_timeout {
            return Err(ConfigError::ThresholdOrder {
                ping_timeout: self.ping_timeout,
                departure: self.departure_threshold,
            });
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&PresenceSettings::default())
    }
}

pub struct PresenceTracker {
    config: TrackerConfig,
    floor: SignalFloor,
    states: HashMap<String, DeviceState>,
}

impl PresenceTracker {
    /// `config` is expected to have passed [`TrackerConfig::validate`].
    pub fn new(config: TrackerConfig) -> Self {
        debug_assert!(
            config.validate().is_ok(),
            "invalid tracker thresholds: {config:?}"
        );
        Self {
            floor: SignalFloor::new(config.rssi_floor),
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, identity: &str) -> Option<&DeviceState> {
        self.states.get(identity)
    }

    /// Resume watching identities that were still tracked when the process
    /// last stopped. Each starts again at zero missed pings. Returns how many
    /// were added.
    pub fn restore(&mut self, identities: &[TrackedIdentity]) -> usize {
        let mut restored = 0;
        for tracked in identities {
            if !self.states.contains_key(&tracked.identity) {
                self.states.insert(
                    tracked.identity.clone(),
                    DeviceState::seen_at(tracked.last_event_at),
                );
                restored += 1;
            }
        }
        restored
    }

    pub async fn advance<S>(&mut self, observations: Vec<Observation>, store: &S) -> usize
    where
        S: PresenceStore + ?Sized,
    {
        self.advance_at(observations, Utc::now(), store).await
    }

    /// Runs one scan cycle and returns how many observations passed the
    /// signal floor.
    ///
    /// Store failures are logged per identity and never abort the cycle.
    pub async fn advance_at<S>(
        &mut self,
        observations: Vec<Observation>,
        now: DateTime<Utc>,
        store: &S,
    ) -> usize
    where
        S: PresenceStore + ?Sized,
    {
        let accepted = self.floor.apply(observations);
        let accepted_count = accepted.len();

        // Collapse repeated sightings of one identity, keeping the strongest.
        let mut seen: BTreeMap<String, Observation> = BTreeMap::new();
        for observation in accepted {
            match seen.get(&observation.identity) {
                Some(existing) if existing.signal_strength >= observation.signal_strength => {}
                _ => {
                    seen.insert(observation.identity.clone(), observation);
                }
            }
        }

        for (identity, observation) in &seen {
            match self.states.get_mut(identity) {
                Some(state) => {
                    state.missed_pings = 0;
                    state.last_seen = now;
                }
                None => {
                    debug!("{identity} entered range");
                    self.states.insert(identity.clone(), DeviceState::seen_at(now));
                }
            }

            if let Err(err) = store
                .record_presence(
                    identity,
                    PresenceStatus::Present,
                    Some(observation.signal_strength),
                    now,
                )
                .await
            {
                warn!("Failed to record presence for {identity}: {err:#}");
            }

            if observation.has_metadata() {
                if let Err(err) = store
                    .record_metadata(identity, MetadataUpdate::from(observation), now)
                    .await
                {
                    warn!("Failed to record metadata for {identity}: {err:#}");
                }
            }
        }

        let mut missed: Vec<String> = self
            .states
            .keys()
            .filter(|identity| !seen.contains_key(*identity))
            .cloned()
            .collect();
        missed.sort();

        for identity in missed {
            let Some(state) = self.states.get_mut(&identity) else {
                continue;
            };
            state.missed_pings += 1;
            let missed_pings = state.missed_pings;

            let status = if missed_pings >= self.config.departure_threshold {
                self.states.remove(&identity);
                PresenceStatus::Departed
            } else if missed_pings == self.config.ping_timeout {
                PresenceStatus::Absent
            } else {
                continue;
            };

            debug!("{identity} is now {status} after {missed_pings} missed pings");
            if let Err(err) = store.record_presence(&identity, status, None, now).await {
                warn!("Failed to record {status} for {identity}: {err:#}");
            }
        }

        accepted_count
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        presence: Mutex<Vec<(String, PresenceStatus, Option<i32>)>>,
        metadata: Mutex<Vec<(String, MetadataUpdate)>>,
        fail_for: Option<String>,
    }

    impl RecordingStore {
        fn failing_for(identity: &str) -> Self {
            Self {
                fail_for: Some(identity.to_string()),
                ..Self::default()
            }
        }

        fn drain(&self) -> Vec<(String, PresenceStatus)> {
            self.presence
                .lock()
                .unwrap()
                .drain(..)
                .map(|(identity, status, _)| (identity, status))
                .collect()
        }

        fn statuses_for(events: &[(String, PresenceStatus)], identity: &str) -> Vec<PresenceStatus> {
            events
                .iter()
                .filter(|(id, _)| id == identity)
                .map(|(_, status)| *status)
                .collect()
        }
    }

    #[async_trait]
    impl PresenceStore for RecordingStore {
        async fn record_presence(
            &self,
            identity: &str,
            status: PresenceStatus,
            signal_strength: Option<i32>,
            _at: DateTime<Utc>,
        ) -> Result<()> {
            if self.fail_for.as_deref() == Some(identity) {
                bail!("disk full");
            }
            self.presence
                .lock()
                .unwrap()
                .push((identity.to_string(), status, signal_strength));
            Ok(())
        }

        async fn record_metadata(
            &self,
            identity: &str,
            update: MetadataUpdate,
            _at: DateTime<Utc>,
        ) -> Result<()> {
            self.metadata
                .lock()
                .unwrap()
                .push((identity.to_string(), update));
            Ok(())
        }
    }

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(TrackerConfig {
            ping_timeout: 3,
            departure_threshold: 5,
            rssi_floor: -80,
        })
    }

    fn sighting(identity: &str) -> Vec<Observation> {
        vec![Observation::new(identity, -60)]
    }

    #[test]
    fn thresholds_must_be_ordered() {
        let zero_timeout = TrackerConfig {
            ping_timeout: 0,
            departure_threshold: 5,
            rssi_floor: -80,
        };
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::NotPositive { field: "ping_timeout" })
        ));

        let inverted = TrackerConfig {
            ping_timeout: 5,
            departure_threshold: 5,
            rssi_floor: -80,
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));

        assert!(TrackerConfig::default().validate().is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invalid tracker thresholds")]
    fn tracker_rejects_unordered_thresholds() {
        PresenceTracker::new(TrackerConfig {
            ping_timeout: 4,
            departure_threshold: 2,
            rssi_floor: -80,
        });
    }

    #[tokio::test]
    async fn first_sighting_emits_present() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        let accepted = tracker.advance(sighting("D1"), &store).await;

        assert_eq!(accepted, 1);
        assert_eq!(store.drain(), vec![("D1".to_string(), PresenceStatus::Present)]);
        assert_eq!(tracker.state("D1").unwrap().missed_pings, 0);
    }

    #[tokio::test]
    async fn present_is_reasserted_every_cycle() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        for _ in 0..4 {
            tracker.advance(sighting("D1"), &store).await;
        }

        let events = store.drain();
        assert_eq!(
            RecordingStore::statuses_for(&events, "D1"),
            vec![PresenceStatus::Present; 4]
        );
    }

    #[tokio::test]
    async fn absence_and_departure_follow_thresholds() {
        let store = RecordingStore::default();
        let mut tracker = tracker();
        let mut per_cycle = Vec::new();

        // Seen in cycles 1-2, missing in cycles 3-7.
        for cycle in 1..=7 {
            let observations = if cycle <= 2 { sighting("D1") } else { Vec::new() };
            tracker.advance(observations, &store).await;
            per_cycle.push(RecordingStore::statuses_for(&store.drain(), "D1"));
        }

        assert_eq!(per_cycle[0], vec![PresenceStatus::Present]);
        assert_eq!(per_cycle[1], vec![PresenceStatus::Present]);
        assert!(per_cycle[2].is_empty());
        assert!(per_cycle[3].is_empty());
        assert_eq!(per_cycle[4], vec![PresenceStatus::Absent]);
        assert!(per_cycle[5].is_empty());
        assert_eq!(per_cycle[6], vec![PresenceStatus::Departed]);
        assert!(tracker.state("D1").is_none());
    }

    #[tokio::test]
    async fn missed_pings_count_silently_between_thresholds() {
        let store = RecordingStore::default();
        let mut tracker = PresenceTracker::new(TrackerConfig {
            ping_timeout: 2,
            departure_threshold: 6,
            rssi_floor: -80,
        });

        tracker.advance(sighting("D1"), &store).await;
        for _ in 0..5 {
            tracker.advance(Vec::new(), &store).await;
        }

        let events = store.drain();
        assert_eq!(
            RecordingStore::statuses_for(&events, "D1"),
            vec![PresenceStatus::Present, PresenceStatus::Absent]
        );
        assert_eq!(tracker.state("D1").unwrap().missed_pings, 5);
    }

    #[tokio::test]
    async fn return_after_absence_resets_counter() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        tracker.advance(sighting("D1"), &store).await;
        for _ in 0..3 {
            tracker.advance(Vec::new(), &store).await;
        }
        tracker.advance(sighting("D1"), &store).await;
        assert_eq!(tracker.state("D1").unwrap().missed_pings, 0);

        // A fresh run of misses has to reach the timeout again.
        tracker.advance(Vec::new(), &store).await;
        tracker.advance(Vec::new(), &store).await;

        let events = store.drain();
        assert_eq!(
            RecordingStore::statuses_for(&events, "D1"),
            vec![
                PresenceStatus::Present,
                PresenceStatus::Absent,
                PresenceStatus::Present
            ]
        );
    }

    #[tokio::test]
    async fn sighting_after_departure_starts_fresh() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        tracker.advance(sighting("D1"), &store).await;
        for _ in 0..5 {
            tracker.advance(Vec::new(), &store).await;
        }
        assert!(tracker.state("D1").is_none());
        store.drain();

        tracker.advance(sighting("D1"), &store).await;
        assert_eq!(store.drain(), vec![("D1".to_string(), PresenceStatus::Present)]);
        assert_eq!(tracker.state("D1").unwrap().missed_pings, 0);
    }

    #[tokio::test]
    async fn weak_signals_never_reach_the_state_machine() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        let accepted = tracker
            .advance(vec![Observation::new("far", -85)], &store)
            .await;

        assert_eq!(accepted, 0);
        assert!(store.drain().is_empty());
        assert!(tracker.state("far").is_none());
    }

    #[tokio::test]
    async fn weak_sighting_counts_as_a_miss() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        tracker.advance(sighting("D1"), &store).await;
        tracker
            .advance(vec![Observation::new("D1", -95)], &store)
            .await;

        assert_eq!(tracker.state("D1").unwrap().missed_pings, 1);
    }

    #[tokio::test]
    async fn duplicate_sightings_record_once_with_strongest_signal() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        tracker
            .advance(
                vec![Observation::new("D1", -70), Observation::new("D1", -45)],
                &store,
            )
            .await;

        let recorded = store.presence.lock().unwrap().clone();
        assert_eq!(
            recorded,
            vec![("D1".to_string(), PresenceStatus::Present, Some(-45))]
        );
    }

    #[tokio::test]
    async fn metadata_is_only_recorded_when_present() {
        let store = RecordingStore::default();
        let mut tracker = tracker();

        let mut named = Observation::new("named", -50);
        named.display_name = Some("Badge 7".into());
        tracker
            .advance(vec![named, Observation::new("bare", -50)], &store)
            .await;

        let metadata = store.metadata.lock().unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].0, "named");
        assert_eq!(metadata[0].1.display_name.as_deref(), Some("Badge 7"));
    }

    #[tokio::test]
    async fn store_failure_does_not_abort_the_cycle() {
        let store = RecordingStore::failing_for("broken");
        let mut tracker = tracker();

        let accepted = tracker
            .advance(
                vec![Observation::new("broken", -50), Observation::new("fine", -50)],
                &store,
            )
            .await;

        assert_eq!(accepted, 2);
        assert_eq!(store.drain(), vec![("fine".to_string(), PresenceStatus::Present)]);
        assert!(tracker.state("broken").is_some());
    }

    #[tokio::test]
    async fn restored_identities_resume_at_zero_misses() {
        let store = RecordingStore::default();
        let mut tracker = tracker();
        let restored = tracker.restore(&[TrackedIdentity {
            identity: "D9".into(),
            status: PresenceStatus::Present,
            last_event_at: Utc::now(),
        }]);
        assert_eq!(restored, 1);

        for _ in 0..3 {
            tracker.advance(Vec::new(), &store).await;
        }

        assert_eq!(store.drain(), vec![("D9".to_string(), PresenceStatus::Absent)]);
    }
}
