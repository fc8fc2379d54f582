//! Per-chart state and the pure reducer that guards it.

use serde::Serialize;

use crate::models::stats::{BundleSource, DataType, StatBundle};
use crate::services::sanitizer::{LabelSanitizer, DEFAULT_DEPARTMENTS};

/// How far a bundle can be believed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trust {
    /// Placeholder, synthetic, or fallback data.
    Low,
    /// Measured from the database.
    High,
}

impl Trust {
    pub fn of(bundle: &StatBundle) -> Self {
        if bundle.is_real_data && bundle.source == BundleSource::Database {
            Trust::High
        } else {
            Trust::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartState {
    Uninitialized,
    Populated { bundle: StatBundle, trust: Trust },
}

impl ChartState {
    pub fn populated(bundle: StatBundle) -> Self {
        let trust = Trust::of(&bundle);
        ChartState::Populated { bundle, trust }
    }

    /// Low-trust placeholder listing the default departments.
    pub fn default_departments() -> Self {
        ChartState::populated(StatBundle::default_departments(&DEFAULT_DEPARTMENTS))
    }

    pub fn bundle(&self) -> Option<&StatBundle> {
        match self {
            ChartState::Uninitialized => None,
            ChartState::Populated { bundle, .. } => Some(bundle),
        }
    }

    pub fn trust(&self) -> Option<Trust> {
        match self {
            ChartState::Uninitialized => None,
            ChartState::Populated { trust, .. } => Some(*trust),
        }
    }

    pub fn is_high_trust(&self) -> bool {
        self.trust() == Some(Trust::High)
    }
}

/// What the reducer did with an incoming bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The bundle replaced the displayed one.
    Accepted,
    /// Same content as displayed; nothing to re-render.
    Unchanged,
    /// Low-trust data arriving after real data.
    IgnoredLowTrust,
    /// Labels failed validation; the previous state is kept.
    Rejected { labels: Vec<String> },
    /// Labels failed validation on an empty chart; the default departments
    /// placeholder is shown instead.
    ReplacedWithDefaults { labels: Vec<String> },
}

impl Outcome {
    pub fn changed_display(&self) -> bool {
        matches!(self, Outcome::Accepted | Outcome::ReplacedWithDefaults { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: ChartState,
    pub outcome: Outcome,
}

impl Reduction {
    fn keep(state: &ChartState, outcome: Outcome) -> Self {
        Self {
            state: state.clone(),
            outcome,
        }
    }
}

/// Fold `incoming` into `state`.
///
/// * Administration bundles are re-validated whatever their trust; failing
///   labels never reach the display.
/// * Low-trust data fills an empty or low-trust chart, and is ignored once
///   the chart holds real data or `real_data_received` is set.
/// * High-trust data always replaces the display.
pub fn reduce(
    state: &ChartState,
    incoming: StatBundle,
    real_data_received: bool,
    sanitizer: &LabelSanitizer,
) -> Reduction {
    let trust = Trust::of(&incoming);

    if trust == Trust::Low && (real_data_received || state.is_high_trust()) {
        return Reduction::keep(state, Outcome::IgnoredLowTrust);
    }

    if incoming.data_type == DataType::Administration {
        let contaminated: Vec<String> = sanitizer
            .contaminated(incoming.labels.iter().map(String::as_str))
            .into_iter()
            .map(str::to_string)
            .collect();
        if !contaminated.is_empty() {
            return match state {
                ChartState::Uninitialized => Reduction {
                    state: ChartState::default_departments(),
                    outcome: Outcome::ReplacedWithDefaults {
                        labels: contaminated,
                    },
                },
                ChartState::Populated { .. } => Reduction::keep(
                    state,
                    Outcome::Rejected {
                        labels: contaminated,
                    },
                ),
            };
        }
    }

    if let ChartState::Populated { bundle, trust: current } = state {
        if *current == trust && bundle.fingerprint == incoming.fingerprint {
            return Reduction::keep(state, Outcome::Unchanged);
        }
    }

    Reduction {
        state: ChartState::Populated {
            bundle: incoming,
            trust,
        },
        outcome: Outcome::Accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stats::{DetailRecord, StatName};

    fn sanitizer() -> LabelSanitizer {
        LabelSanitizer::new(4).unwrap()
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn real(items: &[&str], values: Vec<i64>) -> StatBundle {
        StatBundle::measured(StatName::Administrations, labels(items), values)
    }

    fn synthetic() -> StatBundle {
        StatBundle::synthetic(
            StatName::Administrations,
            labels(&["Direction Générale", "Service Informatique"]),
            vec![3, 7],
        )
    }

    #[test]
    fn trust_requires_real_database_data() {
        assert_eq!(Trust::of(&real(&["Direction Commerciale"], vec![1])), Trust::High);
        assert_eq!(Trust::of(&synthetic()), Trust::Low);
        assert_eq!(
            Trust::of(&StatBundle::default_departments(&DEFAULT_DEPARTMENTS)),
            Trust::Low
        );
        let mut lying = synthetic();
        lying.is_real_data = true;
        assert_eq!(Trust::of(&lying), Trust::Low);
    }

    #[test]
    fn first_arrival_populates() {
        let r = reduce(&ChartState::Uninitialized, synthetic(), false, &sanitizer());
        assert_eq!(r.outcome, Outcome::Accepted);
        assert_eq!(r.state.trust(), Some(Trust::Low));
    }

    #[test]
    fn real_data_supersedes_provisional() {
        let provisional = ChartState::populated(synthetic());
        let r = reduce(
            &provisional,
            real(&["Direction Commerciale"], vec![4]),
            false,
            &sanitizer(),
        );
        assert_eq!(r.outcome, Outcome::Accepted);
        assert!(r.state.is_high_trust());
    }

    #[test]
    fn low_trust_never_regresses_high_trust() {
        let state = ChartState::populated(real(&["Direction Commerciale"], vec![4]));
        for latch in [false, true] {
            let r = reduce(&state, synthetic(), latch, &sanitizer());
            assert_eq!(r.outcome, Outcome::IgnoredLowTrust);
            assert_eq!(r.state, state);
        }
    }

    #[test]
    fn latch_vetoes_low_trust_even_on_low_chart() {
        let state = ChartState::populated(synthetic());
        let other = StatBundle::synthetic(
            StatName::Administrations,
            labels(&["Direction Technique"]),
            vec![1],
        );
        let r = reduce(&state, other, true, &sanitizer());
        assert_eq!(r.outcome, Outcome::IgnoredLowTrust);
        assert_eq!(r.state, state);
    }

    #[test]
    fn high_trust_replaces_high_trust() {
        let state = ChartState::populated(real(&["Direction Commerciale"], vec![4]));
        let r = reduce(
            &state,
            real(&["Direction Commerciale"], vec![5]),
            true,
            &sanitizer(),
        );
        assert_eq!(r.outcome, Outcome::Accepted);
        assert_eq!(r.state.bundle().map(|b| b.values().to_vec()), Some(vec![5]));
    }

    #[test]
    fn identical_content_is_unchanged() {
        let bundle = real(&["Direction Commerciale"], vec![4]);
        let state = ChartState::populated(bundle.clone());
        let r = reduce(&state, bundle, true, &sanitizer());
        assert_eq!(r.outcome, Outcome::Unchanged);
    }

    #[test]
    fn changed_details_replace_same_top_n() {
        let product = |quantity| DetailRecord::Product {
            product: "Z".to_string(),
            quantity,
        };
        let top = |quantity| {
            StatBundle::measured(StatName::TopProducts, labels(&["A"]), vec![5])
                .with_details(vec![product(quantity)])
        };
        let state = ChartState::populated(top(1));

        let r = reduce(&state, top(9), true, &sanitizer());

        assert_eq!(r.outcome, Outcome::Accepted);
        assert_eq!(r.state.bundle().map(|b| b.details.clone()), Some(vec![product(9)]));
    }

    #[test]
    fn contaminated_high_trust_is_discarded() {
        let state = ChartState::populated(real(&["Direction Commerciale"], vec![4]));
        let r = reduce(
            &state,
            real(&["Direction Commerciale", "Ely (2025)"], vec![4, 1]),
            true,
            &sanitizer(),
        );
        assert_eq!(
            r.outcome,
            Outcome::Rejected {
                labels: labels(&["Ely (2025)"])
            }
        );
        assert_eq!(r.state, state);
    }

    #[test]
    fn contaminated_first_arrival_shows_defaults() {
        let r = reduce(
            &ChartState::Uninitialized,
            real(&["B1", "Direction Commerciale"], vec![2, 1]),
            false,
            &sanitizer(),
        );
        assert!(matches!(r.outcome, Outcome::ReplacedWithDefaults { .. }));
        assert_eq!(r.state, ChartState::default_departments());
        assert!(r.outcome.changed_display());
    }

    #[test]
    fn non_administration_labels_are_not_scanned() {
        let users = StatBundle::measured(
            StatName::UserDeliveries,
            labels(&["Ely", "B1"]),
            vec![2, 1],
        );
        let r = reduce(&ChartState::Uninitialized, users, false, &sanitizer());
        assert_eq!(r.outcome, Outcome::Accepted);
    }
}
