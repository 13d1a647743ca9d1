//! Per-symbol refractory cooldown.

use std::collections::HashMap;

use tracing::debug;

use surgelab_models::RefractoryConfig;

/// Suppresses candidate emission for a symbol after a confirmation, until
/// `confirm_ts + duration_s * 1000`. A pure map-and-compare; features and
/// confirmation buffers keep flowing while a symbol is blocked.
pub struct RefractoryManager {
    duration_ms: i64,
    extend_on_confirm: bool,
    block_until: HashMap<String, i64>,
}

impl RefractoryManager {
    pub fn new(config: &RefractoryConfig) -> Self {
        Self {
            duration_ms: i64::from(config.duration_s) * 1000,
            extend_on_confirm: config.extend_on_confirm,
            block_until: HashMap::new(),
        }
    }

    /// True iff `ts` falls strictly before the symbol's block deadline.
    /// A candidate at exactly the deadline is allowed.
    pub fn is_blocked(&self, symbol: &str, ts: i64) -> bool {
        self.block_until
            .get(symbol)
            .is_some_and(|&until| ts < until)
    }

    /// The symbol's current block deadline, if any.
    pub fn block_until(&self, symbol: &str) -> Option<i64> {
        self.block_until.get(symbol).copied()
    }

    /// Arm (or extend) the cooldown after a confirmation at `ts`.
    pub fn on_confirm(&mut self, symbol: &str, ts: i64) {
        let deadline = ts + self.duration_ms;
        match self.block_until.get_mut(symbol) {
            Some(until) => {
                if self.extend_on_confirm {
                    *until = deadline.max(*until);
                }
            }
            None => {
                self.block_until.insert(symbol.to_string(), deadline);
            }
        }
    }

    /// Record a suppressed candidate; diagnostic only, no state change.
    pub fn on_reject(&self, symbol: &str, candidate_ts: i64, blocked_until_ts: i64) {
        debug!(
            symbol,
            candidate_ts, blocked_until_ts, "candidate rejected by refractory"
        );
    }

    /// Drop all cooldown state (new session).
    pub fn reset(&mut self) {
        self.block_until.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RefractoryManager {
        RefractoryManager::new(&RefractoryConfig {
            duration_s: 45,
            extend_on_confirm: true,
        })
    }

    #[test]
    fn unknown_symbol_is_never_blocked() {
        let manager = manager();
        assert!(!manager.is_blocked("005930", 0));
    }

    #[test]
    fn blocks_for_duration_after_confirm() {
        let mut manager = manager();
        manager.on_confirm("005930", 100_000);
        assert!(manager.is_blocked("005930", 100_001));
        assert!(manager.is_blocked("005930", 144_999));
        assert_eq!(manager.block_until("005930"), Some(145_000));
    }

    #[test]
    fn deadline_itself_is_allowed() {
        let mut manager = manager();
        manager.on_confirm("005930", 100_000);
        assert!(!manager.is_blocked("005930", 145_000));
    }

    #[test]
    fn confirm_extends_deadline_when_enabled() {
        let mut manager = manager();
        manager.on_confirm("005930", 100_000);
        manager.on_confirm("005930", 120_000);
        assert_eq!(manager.block_until("005930"), Some(165_000));
    }

    #[test]
    fn earlier_confirm_never_shortens_deadline() {
        let mut manager = manager();
        manager.on_confirm("005930", 120_000);
        manager.on_confirm("005930", 100_000);
        assert_eq!(manager.block_until("005930"), Some(165_000));
    }

    #[test]
    fn without_extension_first_deadline_sticks() {
        let mut manager = RefractoryManager::new(&RefractoryConfig {
            duration_s: 45,
            extend_on_confirm: false,
        });
        manager.on_confirm("005930", 100_000);
        manager.on_confirm("005930", 120_000);
        assert_eq!(manager.block_until("005930"), Some(145_000));
    }

    #[test]
    fn symbols_are_independent() {
        let mut manager = manager();
        manager.on_confirm("005930", 100_000);
        assert!(manager.is_blocked("005930", 110_000));
        assert!(!manager.is_blocked("000660", 110_000));
    }
}
