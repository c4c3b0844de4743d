use crate::models::Observation;

/// Drops observations weaker than a fixed signal floor.
///
/// The same floor has to be applied on every cycle; a device hovering around
/// a floor that moves would flap between present and absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalFloor {
    floor: i32,
}

impl SignalFloor {
    pub fn new(floor: i32) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> i32 {
        self.floor
    }

    pub fn accepts(&self, observation: &Observation) -> bool {
        observation.signal_strength >= self.floor
    }

    pub fn apply(&self, observations: Vec<Observation>) -> Vec<Observation> {
        observations
            .into_iter()
            .filter(|observation| self.accepts(observation))
            .collect()
    }
}
