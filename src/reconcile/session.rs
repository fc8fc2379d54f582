//! Dashboard session: the only mutable chart state on the client side.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::pagination::{PagedResult, Pagination};
use crate::models::stats::{DashboardSnapshot, DataType, DetailRecord, StatBundle, StatName};
use crate::services::sanitizer::LabelSanitizer;

use super::state::{reduce, ChartState, Outcome, Trust};

/// Number of categories in a distribution's primary view.
pub const PRIMARY_VIEW_LIMIT: usize = 10;

static UNINITIALIZED: ChartState = ChartState::Uninitialized;

/// Path a bundle travelled to reach the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// Payload embedded in the initial page.
    Embedded,
    /// Server-sent event after a write.
    Push,
    /// Polling request.
    Poll,
    /// Synthetic placeholder after the wait expired.
    Fallback,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Embedded => "embedded",
            Transport::Push => "push",
            Transport::Poll => "poll",
            Transport::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Arrival {
    pub transport: Transport,
    pub bundle: StatBundle,
}

/// Chart states plus the session-wide `real_data_received` latch.
///
/// The latch is shared through an `Arc` so a pending fallback can check it
/// without borrowing the session.
#[derive(Debug)]
pub struct DashboardSession {
    charts: BTreeMap<StatName, ChartState>,
    real_data_received: Arc<AtomicBool>,
    sanitizer: LabelSanitizer,
}

impl DashboardSession {
    pub fn new(sanitizer: LabelSanitizer) -> Self {
        Self {
            charts: BTreeMap::new(),
            real_data_received: Arc::new(AtomicBool::new(false)),
            sanitizer,
        }
    }

    pub fn real_data_received(&self) -> bool {
        self.real_data_received.load(Ordering::SeqCst)
    }

    /// Handle on the latch for tasks that outlive a borrow of the session.
    pub fn latch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.real_data_received)
    }

    pub fn state(&self, chart: StatName) -> &ChartState {
        self.charts.get(&chart).unwrap_or(&UNINITIALIZED)
    }

    /// Run one arrival through the reducer.
    pub fn apply(&mut self, arrival: Arrival) -> Outcome {
        let chart = arrival.bundle.name;
        let reduction = reduce(
            self.state(chart),
            arrival.bundle,
            self.real_data_received(),
            &self.sanitizer,
        );

        match &reduction.outcome {
            Outcome::IgnoredLowTrust => tracing::warn!(
                chart = %chart,
                transport = %arrival.transport,
                "Ignoring low-trust data after real data"
            ),
            Outcome::Rejected { labels } => tracing::warn!(
                chart = %chart,
                transport = %arrival.transport,
                rejected = labels.len(),
                "Discarding bundle with contaminated labels"
            ),
            Outcome::ReplacedWithDefaults { labels } => tracing::warn!(
                chart = %chart,
                transport = %arrival.transport,
                rejected = labels.len(),
                "Contaminated first arrival, showing default departments"
            ),
            Outcome::Accepted | Outcome::Unchanged => tracing::debug!(
                chart = %chart,
                transport = %arrival.transport,
                outcome = ?reduction.outcome,
                "Bundle reconciled"
            ),
        }

        if reduction.state.trust() == Some(Trust::High) {
            self.real_data_received.store(true, Ordering::SeqCst);
        }
        self.charts.insert(chart, reduction.state);
        reduction.outcome
    }

    /// Apply every bundle of a snapshot in statistic order.
    pub fn apply_snapshot(
        &mut self,
        transport: Transport,
        snapshot: DashboardSnapshot,
    ) -> Vec<(StatName, Outcome)> {
        snapshot
            .bundles
            .into_values()
            .map(|bundle| {
                let chart = bundle.name;
                (chart, self.apply(Arrival { transport, bundle }))
            })
            .collect()
    }

    /// Re-check labels as they were actually rendered. Any contamination in
    /// an administration chart resets it to the default departments.
    /// Returns `true` when a reset happened.
    pub fn verify_rendered(&mut self, chart: StatName, rendered_labels: &[&str]) -> bool {
        let is_administration = self
            .state(chart)
            .bundle()
            .map(|b| b.data_type == DataType::Administration)
            .unwrap_or(chart.data_type() == DataType::Administration);
        if !is_administration {
            return false;
        }

        let contaminated = self.sanitizer.contaminated(rendered_labels.iter().copied());
        if contaminated.is_empty() {
            return false;
        }

        tracing::warn!(
            chart = %chart,
            rejected = contaminated.len(),
            "Contaminated labels rendered, resetting chart"
        );
        self.charts.insert(chart, ChartState::default_departments());
        true
    }

    /// Top categories by value, descending. Ties keep bundle order.
    pub fn primary_view(&self, chart: StatName) -> Vec<(String, i64)> {
        let Some(bundle) = self.state(chart).bundle() else {
            return Vec::new();
        };
        let mut pairs = bundle.pairs();
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs.truncate(PRIMARY_VIEW_LIMIT);
        pairs
    }

    /// Full category list of a chart, one page at a time.
    pub fn details_page(&self, chart: StatName, pagination: &Pagination) -> PagedResult<DetailRecord> {
        let records = self
            .state(chart)
            .bundle()
            .map(detail_records)
            .unwrap_or_default();
        PagedResult::from_slice(&records, pagination)
    }
}

/// The bundle's detail records, or records rebuilt from its first series.
fn detail_records(bundle: &StatBundle) -> Vec<DetailRecord> {
    if !bundle.details.is_empty() {
        return bundle.details.clone();
    }
    bundle
        .pairs()
        .into_iter()
        .filter_map(|(label, value)| match bundle.data_type {
            DataType::Administration => Some(DetailRecord::Administration {
                administration: label,
                delivered_orders: value,
            }),
            DataType::User => Some(DetailRecord::User {
                user: label,
                delivered_orders: value,
            }),
            DataType::Product => Some(DetailRecord::Product {
                product: label,
                quantity: value,
            }),
            _ => None,
        })
        .collect()
}
