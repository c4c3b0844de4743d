use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::prelude::*;

use crate::error::ScanError;
use crate::models::Observation;
use crate::vendor::KNOWN_VENDORS;

use super::backend::ScanBackend;

const FAILURE_RATE: f64 = 0.05;
const NAMES: &[&str] = &["Phone", "Watch", "Laptop", "Earbuds", "Badge", "Sensor"];

struct SimulatedDevice {
    identity: String,
    display_name: Option<String>,
    in_range: bool,
    base_signal: i32,
}

/// Fake radio for running without hardware. Devices keep stable identities
/// and wander in and out of range between cycles.
pub struct SimulatedBackend {
    rng: StdRng,
    devices: Vec<SimulatedDevice>,
    failure_rate: f64,
    wait_for_window: bool,
}

impl SimulatedBackend {
    pub fn new(population: usize) -> Self {
        Self::with_rng(population, StdRng::from_entropy())
    }

    pub fn seeded(population: usize, seed: u64) -> Self {
        Self::with_rng(population, StdRng::seed_from_u64(seed))
    }

    fn with_rng(population: usize, mut rng: StdRng) -> Self {
        let devices = (0..population)
            .map(|index| {
                let prefix = if rng.gen_bool(0.7) {
                    let (oui, _, _) = KNOWN_VENDORS[rng.gen_range(0..KNOWN_VENDORS.len())];
                    oui.to_string()
                } else {
                    format!("{:06X}", rng.gen_range(0..0x0100_0000u32))
                };
                let tail: u32 = rng.gen_range(0..0x0100_0000);
                SimulatedDevice {
                    identity: format_mac(&prefix, tail),
                    display_name: rng
                        .gen_bool(0.5)
                        .then(|| format!("{} {}", NAMES[index % NAMES.len()], index + 1)),
                    in_range: rng.gen_bool(0.6),
                    base_signal: rng.gen_range(-90..=-40),
                }
            })
            .collect();

        Self {
            rng,
            devices,
            failure_rate: FAILURE_RATE,
            wait_for_window: true,
        }
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// Return immediately instead of sleeping for the scan window.
    pub fn without_waiting(mut self) -> Self {
        self.wait_for_window = false;
        self
    }
}

fn format_mac(prefix: &str, tail: u32) -> String {
    let digits = format!("{prefix}{tail:06X}");
    digits
        .as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).into_owned())
        .collect::<Vec<_>>()
        .join(":")
}

#[async_trait]
impl ScanBackend for SimulatedBackend {
    async fn scan(&mut self, duration: Duration) -> Result<Vec<Observation>, ScanError> {
        if self.wait_for_window {
            tokio::time::sleep(duration).await;
        }

        if self.rng.gen_bool(self.failure_rate) {
            return Err(ScanError::Transient("simulated adapter hiccup".into()));
        }

        let now = Utc::now();
        let mut observations = Vec::new();
        for device in &mut self.devices {
            if self.rng.gen_bool(0.15) {
                device.in_range = !device.in_range;
            }
            if !device.in_range {
                continue;
            }

            let jitter = self.rng.gen_range(-8..=8);
            let mut observation = Observation::new(&device.identity, device.base_signal + jitter);
            observation.observed_at = now;
            observation.display_name = device.display_name.clone();
            observations.push(observation);
        }
        Ok(observations)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[tokio::test]
    async fn identities_are_stable_across_cycles() {
        let mut backend = SimulatedBackend::seeded(20, 7)
            .with_failure_rate(0.0)
            .without_waiting();
        let population: HashSet<String> = backend
            .devices
            .iter()
            .map(|device| device.identity.clone())
            .collect();

        for _ in 0..10 {
            let cycle = backend.scan(Duration::ZERO).await.unwrap();
            assert!(cycle.iter().all(|obs| population.contains(&obs.identity)));
        }
    }

    #[tokio::test]
    async fn always_failing_adapter_reports_transient_errors() {
        let mut backend = SimulatedBackend::seeded(3, 1)
            .with_failure_rate(1.0)
            .without_waiting();
        assert!(matches!(
            backend.scan(Duration::ZERO).await,
            Err(ScanError::Transient(_))
        ));
    }

    #[test]
    fn identities_look_like_mac_addresses() {
        assert_eq!(format_mac("A4C138", 0x0A0B0C), "A4:C1:38:0A:0B:0C");
    }
}
