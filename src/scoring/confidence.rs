use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::domain::gating::GatingStatus;
use crate::scoring::normalize::normalize;

/// Weighted combination of coverage, freshness, pillar availability
/// and (AFRICA) FX/liquidity stability, clamped to an integer 0..100
/// (spec §4.6 "Confidence"). Returns the blended score plus the named
/// components so the caller can fold them into the breakdown's
/// `confidence_components` map (spec §4.6 "Breakdown").
pub fn compute(
    gating: Option<&GatingStatus>,
    last_bar_date: Option<NaiveDate>,
    pillars_active: usize,
    pillars_total: usize,
) -> (i32, BTreeMap<String, f64>) {
    let mut components = BTreeMap::new();

    let coverage_component = gating.map(|g| g.coverage * 100.0).unwrap_or(0.0);
    components.insert("coverage".to_string(), coverage_component);

    let freshness_component = match last_bar_date {
        Some(date) => {
            let age_days = (Utc::now().date_naive() - date).num_days().max(0) as f64;
            normalize(age_days, 0.0, 10.0, true)
        }
        None => 0.0,
    };
    components.insert("freshness".to_string(), freshness_component);

    let availability_component = if pillars_total == 0 {
        0.0
    } else {
        (pillars_active as f64 / pillars_total as f64) * 100.0
    };
    components.insert("pillar_availability".to_string(), availability_component);

    let (score, stability_component) = match gating.and_then(|g| g.fx_risk.zip(g.liquidity_risk)) {
        Some((fx_risk, liquidity_risk)) => {
            let stability = (1.0 - (fx_risk + liquidity_risk) / 2.0).clamp(0.0, 1.0) * 100.0;
            let blended = coverage_component * 0.30
                + freshness_component * 0.25
                + availability_component * 0.20
                + stability * 0.25;
            (blended, Some(stability))
        }
        None => {
            let blended =
                coverage_component * 0.40 + freshness_component * 0.30 + availability_component * 0.30;
            (blended, None)
        }
    };
    if let Some(stability) = stability_component {
        components.insert("fx_liquidity_stability".to_string(), stability);
    }

    (score.round().clamp(0.0, 100.0) as i32, components)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_inputs_yield_zero_confidence() {
        let (confidence, _) = compute(None, None, 0, 2);
        assert_eq!(confidence, 0);
    }

    #[test]
    fn full_coverage_and_freshness_yields_high_confidence() {
        let gating = GatingStatus::no_data("X.US", "US_EU");
        let mut gating = gating;
        gating.coverage = 1.0;
        let (confidence, _) = compute(Some(&gating), Some(Utc::now().date_naive()), 2, 2);
        assert!(confidence > 60);
    }
}
