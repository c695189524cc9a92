//! Test helpers shared across the integration suite.

use std::collections::HashMap;

use pulsewatch::model::{Check, ResolvedTier, ServiceDescriptor, StrategyKind, Tier};

pub fn descriptor(name: &str, url: String, tier: Tier, check_name: &str, strategy: StrategyKind) -> ServiceDescriptor {
    ServiceDescriptor {
        name: name.to_string(),
        url,
        tier,
        probe_interval: 60,
        checks: vec![Check {
            name: check_name.to_string(),
            strategy,
            query: None,
            variables: None,
            timeout_ms: Some(2000),
        }],
        auth_token: None,
    }
}

pub fn thresholds_with(tier: Tier, healthy_max_ms: u64, warning_max_ms: u64, flatline_threshold: u32) -> HashMap<Tier, ResolvedTier> {
    let mut map = HashMap::new();
    map.insert(
        tier,
        ResolvedTier {
            healthy_max_ms,
            warning_max_ms,
            sustained_count: 3,
            flatline_threshold,
        },
    );
    map
}

pub fn all_tier_thresholds() -> HashMap<Tier, ResolvedTier> {
    let mut map = HashMap::new();
    for tier in [Tier::Critical, Tier::Standard, Tier::Low] {
        map.insert(
            tier,
            ResolvedTier {
                healthy_max_ms: 200,
                warning_max_ms: 500,
                sustained_count: 3,
                flatline_threshold: 3,
            },
        );
    }
    map
}
