//! Alerting latch
//!
//! Tracks one video's intrusion episode. An episode starts on the first
//! sampled frame with a subject inside a zone and ends on the first sampled
//! frame without one. Only the transition into an episode raises an alert
//! under [`AlertPolicy::Episode`].

use std::str::FromStr;

/// When a sampled in-zone frame produces an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertPolicy {
    /// Once per episode
    #[default]
    Episode,
    /// Every in-zone sampled frame
    EverySample,
}

impl FromStr for AlertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episode" => Ok(Self::Episode),
            "every_sample" | "every-sample" => Ok(Self::EverySample),
            other => Err(format!("unknown alert policy: {}", other)),
        }
    }
}

/// Latch state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatchState {
    #[default]
    Clear,
    Alerting,
}

/// Per-video alerting latch
#[derive(Debug, Clone, Default)]
pub struct AlertLatch {
    policy: AlertPolicy,
    state: LatchState,
}

impl AlertLatch {
    pub fn new(policy: AlertPolicy) -> Self {
        Self {
            policy,
            state: LatchState::Clear,
        }
    }

    pub fn state(&self) -> LatchState {
        self.state
    }

    /// Feed one sampled frame's verdict; returns true when an alert is due
    pub fn observe(&mut self, intruding: bool) -> bool {
        let prev = self.state;
        self.state = if intruding {
            LatchState::Alerting
        } else {
            LatchState::Clear
        };

        match (self.policy, prev, self.state) {
            (_, _, LatchState::Clear) => false,
            (AlertPolicy::EverySample, _, LatchState::Alerting) => true,
            (AlertPolicy::Episode, LatchState::Clear, LatchState::Alerting) => true,
            (AlertPolicy::Episode, LatchState::Alerting, LatchState::Alerting) => false,
        }
    }

    /// Forget the current episode
    pub fn reset(&mut self) {
        self.state = LatchState::Clear;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alerts(latch: &mut AlertLatch, verdicts: &[bool]) -> usize {
        verdicts.iter().filter(|&&v| latch.observe(v)).count()
    }

    #[test]
    fn test_lingering_subject_alerts_once() {
        let mut latch = AlertLatch::new(AlertPolicy::Episode);
        assert_eq!(alerts(&mut latch, &[true; 8]), 1);
        assert_eq!(latch.state(), LatchState::Alerting);
    }

    #[test]
    fn test_leave_and_reenter_alerts_twice() {
        let mut latch = AlertLatch::new(AlertPolicy::Episode);
        assert_eq!(
            alerts(&mut latch, &[false, true, true, false, false, true, true]),
            2
        );
    }

    #[test]
    fn test_every_sample_policy() {
        let mut latch = AlertLatch::new(AlertPolicy::EverySample);
        assert_eq!(alerts(&mut latch, &[true, true, false, true]), 3);
    }

    #[test]
    fn test_reset_starts_new_episode() {
        let mut latch = AlertLatch::new(AlertPolicy::Episode);
        assert!(latch.observe(true));
        latch.reset();
        assert!(latch.observe(true));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("episode".parse::<AlertPolicy>().unwrap(), AlertPolicy::Episode);
        assert_eq!(
            "EVERY_SAMPLE".parse::<AlertPolicy>().unwrap(),
            AlertPolicy::EverySample
        );
        assert!("sometimes".parse::<AlertPolicy>().is_err());
    }
}
