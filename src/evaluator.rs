//! Maps `(latency, ProbeResult)` to `PulseStatus` using configured thresholds (§4.3).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::model::{ProbeResult, Pulse, PulseStatus, ResolvedTier, Tier};

/// Thresholds are shared, lock-guarded state rather than a value baked into the
/// evaluator at construction time: `POST /api/config/thresholds` hot-applies updates
/// here without requiring a scheduler restart (SPEC_FULL.md §12, Open Question 3).
#[derive(Clone)]
pub struct PulseEvaluator {
    thresholds: Arc<RwLock<HashMap<Tier, ResolvedTier>>>,
}

impl PulseEvaluator {
    pub fn new(thresholds: HashMap<Tier, ResolvedTier>) -> Self {
        PulseEvaluator {
            thresholds: Arc::new(RwLock::new(thresholds)),
        }
    }

    pub fn update_thresholds(&self, thresholds: HashMap<Tier, ResolvedTier>) {
        *self.thresholds.write().expect("thresholds lock poisoned") = thresholds;
    }

    /// Full snapshot of the live threshold table, backing `GET /api/config/thresholds`.
    pub fn all_thresholds(&self) -> HashMap<Tier, ResolvedTier> {
        self.thresholds.read().expect("thresholds lock poisoned").clone()
    }

    pub fn tier_config(&self, tier: Tier) -> ResolvedTier {
        self.thresholds
            .read()
            .expect("thresholds lock poisoned")
            .get(&tier)
            .cloned()
            .unwrap_or(ResolvedTier {
                healthy_max_ms: 200,
                warning_max_ms: 500,
                sustained_count: 3,
                flatline_threshold: 3,
            })
    }

    /// The evaluator never returns `Flatline`; that status is only assigned by the
    /// state machine. Latency is attached to the returned `Pulse` unconditionally.
    pub fn evaluate(&self, tier: Tier, latency_ms: i64, result: &ProbeResult) -> Pulse {
        let status = if result.success {
            let bounds = self.tier_config(tier);
            if latency_ms <= bounds.healthy_max_ms as i64 {
                PulseStatus::Healthy
            } else if latency_ms <= bounds.warning_max_ms as i64 {
                PulseStatus::Warning
            } else {
                PulseStatus::Critical
            }
        } else {
            PulseStatus::Critical
        };

        Pulse { status, latency_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HashMap<Tier, ResolvedTier> {
        let mut map = HashMap::new();
        map.insert(
            Tier::Standard,
            ResolvedTier {
                healthy_max_ms: 200,
                warning_max_ms: 500,
                sustained_count: 3,
                flatline_threshold: 3,
            },
        );
        map
    }

    fn success() -> ProbeResult {
        ProbeResult {
            success: true,
            has_response: true,
            http_status: 200,
            data: None,
            error: None,
        }
    }

    #[test]
    fn classifies_by_latency_band_on_success() {
        let evaluator = PulseEvaluator::new(thresholds());
        assert_eq!(
            evaluator.evaluate(Tier::Standard, 150, &success()).status,
            PulseStatus::Healthy
        );
        assert_eq!(
            evaluator.evaluate(Tier::Standard, 350, &success()).status,
            PulseStatus::Warning
        );
        assert_eq!(
            evaluator.evaluate(Tier::Standard, 900, &success()).status,
            PulseStatus::Critical
        );
    }

    #[test]
    fn failure_is_always_critical_never_flatline() {
        let evaluator = PulseEvaluator::new(thresholds());
        let failure = ProbeResult::transport_failure("connection refused");
        let pulse = evaluator.evaluate(Tier::Standard, 5, &failure);
        assert_eq!(pulse.status, PulseStatus::Critical);
    }

    #[test]
    fn hot_applies_updated_thresholds() {
        let evaluator = PulseEvaluator::new(thresholds());
        let mut updated = thresholds();
        updated.get_mut(&Tier::Standard).unwrap().healthy_max_ms = 50;
        evaluator.update_thresholds(updated);

        assert_eq!(
            evaluator.evaluate(Tier::Standard, 150, &success()).status,
            PulseStatus::Warning
        );
    }
}
