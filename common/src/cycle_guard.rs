use chrono::{DateTime, Duration, FixedOffset};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleGuardState {
    /// Time of the last power flip. `None` until the device first changes state.
    pub since: Option<DateTime<FixedOffset>>,
}

/// True once at least `min_cycle` has elapsed since the last flip.
///
/// A clock that reads earlier than `since` never permits the turn-off.
pub fn allowed_to_turn_off(
    state: &CycleGuardState,
    now: DateTime<FixedOffset>,
    min_cycle: Duration,
) -> bool {
    match state.since {
        Some(since) => now.signed_duration_since(since) >= min_cycle,
        None => true,
    }
}

#[derive(Debug, Clone)]
pub struct CycleGuard {
    min_cycle: Duration,
    state: CycleGuardState,
}

impl CycleGuard {
    pub fn new(min_cycle_secs: u64) -> Self {
        Self {
            min_cycle: Duration::seconds(min_cycle_secs as i64),
            state: CycleGuardState::default(),
        }
    }

    pub fn reset(&mut self, now: DateTime<FixedOffset>) {
        self.state.since = Some(now);
    }

    pub fn allowed_to_turn_off(&self, now: DateTime<FixedOffset>) -> bool {
        allowed_to_turn_off(&self.state, now, self.min_cycle)
    }

    pub fn remaining(&self, now: DateTime<FixedOffset>) -> Duration {
        match self.state.since {
            Some(since) => {
                let elapsed = now.signed_duration_since(since).max(Duration::zero());
                (self.min_cycle - elapsed).max(Duration::zero())
            }
            None => Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .timestamp_opt(1_767_600_000 + secs, 0)
            .unwrap()
    }

    #[test]
    fn fresh_guard_allows_turn_off() {
        let guard = CycleGuard::new(300);
        assert!(guard.allowed_to_turn_off(at(0)));
        assert_eq!(guard.remaining(at(0)), Duration::zero());
    }

    #[test]
    fn monotonic_in_elapsed_time() {
        let mut guard = CycleGuard::new(300);
        guard.reset(at(0));

        let results: Vec<bool> = (0..=600)
            .step_by(20)
            .map(|secs| guard.allowed_to_turn_off(at(secs)))
            .collect();
        let first_allowed = results.iter().position(|allowed| *allowed).unwrap();

        assert_eq!(first_allowed, 15);
        assert!(results[first_allowed..].iter().all(|allowed| *allowed));
        assert!(results[..first_allowed].iter().all(|allowed| !allowed));
    }

    #[test]
    fn earlier_clock_is_not_allowed() {
        let state = CycleGuardState { since: Some(at(0)) };
        assert!(!allowed_to_turn_off(&state, at(-10), Duration::seconds(300)));
    }

    #[test]
    fn reports_remaining_time() {
        let mut guard = CycleGuard::new(300);
        guard.reset(at(0));

        assert_eq!(guard.remaining(at(100)), Duration::seconds(200));
        assert_eq!(guard.remaining(at(400)), Duration::zero());
        assert_eq!(guard.remaining(at(-50)), Duration::seconds(300));
    }
}
