use tracing::info;

/// Operator acknowledgment of the current alarm episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgment {
    Unacknowledged,
    Acknowledged,
}

/// Tracks whether the alarm banner still needs to be shown for the current episode.
///
/// An episode starts when an observation flips the alarm condition
/// (`alarm_enabled && alarm_state == Alarm`) from false to true, and ends on the
/// first observation where the condition no longer holds. The banner shows at
/// most once per episode: a reset acknowledges it for the rest of the episode.
#[derive(Debug, Clone)]
pub struct AlarmGate {
    acknowledgment: Acknowledgment,
    last_observed: bool,
}

impl AlarmGate {
    pub fn new() -> Self {
        Self {
            acknowledgment: Acknowledgment::Acknowledged,
            last_observed: false,
        }
    }

    /// Feed one server observation of the alarm condition.
    pub fn observe(&mut self, condition: bool) {
        if condition && !self.last_observed {
            info!("Alarm episode started");
            self.acknowledgment = Acknowledgment::Unacknowledged;
        } else if !condition {
            self.acknowledgment = Acknowledgment::Acknowledged;
        }
        self.last_observed = condition;
    }

    /// Operator reset. Does not end the episode; only a cleared observation does.
    pub fn acknowledge(&mut self) {
        self.acknowledgment = Acknowledgment::Acknowledged;
    }

    /// Put back a previously captured acknowledgment (command rollback).
    pub fn restore(&mut self, acknowledgment: Acknowledgment) {
        self.acknowledgment = acknowledgment;
    }

    pub fn acknowledgment(&self) -> Acknowledgment {
        self.acknowledgment
    }

    /// Whether the banner should be rendered for the condition as it holds right now.
    pub fn banner_visible(&self, condition_now: bool) -> bool {
        condition_now && self.acknowledgment == Acknowledgment::Unacknowledged
    }
}

impl Default for AlarmGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_transition_raises_banner() {
        let mut gate = AlarmGate::new();
        assert!(!gate.banner_visible(false));

        gate.observe(true);
        assert_eq!(gate.acknowledgment(), Acknowledgment::Unacknowledged);
        assert!(gate.banner_visible(true));
    }

    #[test]
    fn test_reset_hides_banner_for_rest_of_episode() {
        let mut gate = AlarmGate::new();
        gate.observe(true);
        gate.acknowledge();
        assert!(!gate.banner_visible(true));

        // Server still reports the same episode
        gate.observe(true);
        assert!(!gate.banner_visible(true));
    }

    #[test]
    fn test_new_episode_after_clear_raises_again() {
        let mut gate = AlarmGate::new();
        gate.observe(true);
        gate.acknowledge();
        gate.observe(false);
        assert_eq!(gate.acknowledgment(), Acknowledgment::Acknowledged);

        gate.observe(true);
        assert!(gate.banner_visible(true));
    }

    #[test]
    fn test_condition_clearing_acknowledges() {
        let mut gate = AlarmGate::new();
        gate.observe(true);
        gate.observe(false);
        assert_eq!(gate.acknowledgment(), Acknowledgment::Acknowledged);
        assert!(!gate.banner_visible(false));
    }

    #[test]
    fn test_banner_requires_condition_now() {
        let mut gate = AlarmGate::new();
        gate.observe(true);
        // Unacknowledged, but the condition no longer holds locally
        assert!(!gate.banner_visible(false));
    }

    #[test]
    fn test_restore_reverts_acknowledge() {
        let mut gate = AlarmGate::new();
        gate.observe(true);
        let prior = gate.acknowledgment();
        gate.acknowledge();
        gate.restore(prior);
        assert!(gate.banner_visible(true));
    }
}
