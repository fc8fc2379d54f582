//! Concurrent delivery paths raced into one session.
//!
//! Every source runs at once. Each completion goes through the reducer, so
//! the first valid payload is shown and a later one may only upgrade it. The
//! synthetic fallback wakes after [`FALLBACK_DELAY`] and does nothing if
//! real data has been received by then.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinSet;

use crate::models::stats::{DashboardSnapshot, StatBundle, StatName};
use crate::services::aggregation::fixed_labels;
use crate::services::sanitizer::DEFAULT_DEPARTMENTS;

use super::adapter::AdapterError;
use super::session::{DashboardSession, Transport};
use super::state::Outcome;

pub const FALLBACK_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Payload(#[from] AdapterError),
}

pub type SourceFuture =
    Pin<Box<dyn Future<Output = Result<DashboardSnapshot, TransportError>> + Send + 'static>>;

/// One delivery path and the future producing its payload.
pub struct Source {
    pub transport: Transport,
    pub fetch: SourceFuture,
}

impl Source {
    pub fn new<F>(transport: Transport, fetch: F) -> Self
    where
        F: Future<Output = Result<DashboardSnapshot, TransportError>> + Send + 'static,
    {
        Self {
            transport,
            fetch: Box::pin(fetch),
        }
    }
}

/// What happened during one race.
#[derive(Debug, Default)]
pub struct RaceReport {
    pub outcomes: Vec<(Transport, StatName, Outcome)>,
    pub failures: Vec<(Transport, String)>,
    pub fallback_fired: bool,
    pub fallback_suppressed: bool,
}

type Completion = (Transport, Result<Option<DashboardSnapshot>, TransportError>);

/// Race `sources` into `session`, firing `fallback` after `delay` unless real
/// data arrived first. Returns once every source and the fallback timer have
/// finished.
pub async fn race_sources<F>(
    session: &mut DashboardSession,
    sources: Vec<Source>,
    delay: Duration,
    fallback: F,
) -> RaceReport
where
    F: FnOnce() -> DashboardSnapshot + Send + 'static,
{
    let mut set: JoinSet<Completion> = JoinSet::new();
    for source in sources {
        let Source { transport, fetch } = source;
        set.spawn(async move { (transport, fetch.await.map(Some)) });
    }

    let latch = session.latch();
    set.spawn(async move {
        tokio::time::sleep(delay).await;
        if latch.load(Ordering::SeqCst) {
            return (Transport::Fallback, Ok(None));
        }
        (Transport::Fallback, Ok(Some(fallback())))
    });

    let mut report = RaceReport::default();
    while let Some(joined) = set.join_next().await {
        let (transport, result) = match joined {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "Dashboard source task failed");
                continue;
            }
        };

        match result {
            Ok(Some(snapshot)) => {
                if transport == Transport::Fallback {
                    report.fallback_fired = true;
                }
                for (stat, outcome) in session.apply_snapshot(transport, snapshot) {
                    report.outcomes.push((transport, stat, outcome));
                }
            }
            Ok(None) => {
                tracing::debug!("Fallback skipped, real data already received");
                report.fallback_suppressed = true;
            }
            Err(e) => {
                tracing::warn!(transport = %transport, error = %e, "Dashboard transport failed");
                report.failures.push((transport, e.to_string()));
            }
        }
    }
    report
}

/// Zero-valued synthetic snapshot shown when nothing else arrived in time.
pub fn placeholder_snapshot(today: NaiveDate, trend_days: u32) -> DashboardSnapshot {
    let bundles = StatName::ALL
        .into_iter()
        .map(|stat| {
            let labels: Vec<String> = if stat == StatName::Administrations {
                DEFAULT_DEPARTMENTS.iter().map(|d| d.to_string()).collect()
            } else {
                fixed_labels(stat, today, trend_days)
            };
            let zeros = vec![0; labels.len()];
            (stat, StatBundle::synthetic(stat, labels, zeros))
        })
        .collect();
    DashboardSnapshot {
        bundles,
        generated_at: Utc::now(),
        is_cached: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use crate::reconcile::adapter::parse_snapshot;
    use crate::reconcile::state::Trust;
    use crate::services::sanitizer::LabelSanitizer;

    fn session() -> DashboardSession {
        DashboardSession::new(LabelSanitizer::new(4).unwrap())
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn real_snapshot() -> DashboardSnapshot {
        let mut bundles = BTreeMap::new();
        bundles.insert(
            StatName::Administrations,
            StatBundle::measured(
                StatName::Administrations,
                vec!["Direction Commerciale".into()],
                vec![4],
            ),
        );
        DashboardSnapshot {
            bundles,
            generated_at: Utc::now(),
            is_cached: false,
        }
    }

    fn after(secs: u64, result: Result<DashboardSnapshot, TransportError>) -> SourceFuture {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            result
        })
    }

    fn counting_fallback(calls: Arc<AtomicUsize>) -> impl FnOnce() -> DashboardSnapshot + Send + 'static {
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            placeholder_snapshot(today(), 7)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn real_data_first_suppresses_fallback() {
        let mut s = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let sources = vec![Source {
            transport: Transport::Poll,
            fetch: after(1, Ok(real_snapshot())),
        }];

        let report = race_sources(&mut s, sources, FALLBACK_DELAY, counting_fallback(calls.clone())).await;

        assert!(report.fallback_suppressed);
        assert!(!report.fallback_fired);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.state(StatName::Administrations).trust(), Some(Trust::High));
        assert_eq!(s.state(StatName::Summary).bundle(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transports_let_fallback_fire() {
        let mut s = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let sources = vec![
            Source {
                transport: Transport::Push,
                fetch: after(1, Err(TransportError::Failed("stream closed".into()))),
            },
            Source::new(Transport::Poll, async {
                parse_snapshot("<html>").map_err(TransportError::from)
            }),
        ];

        let report = race_sources(&mut s, sources, FALLBACK_DELAY, counting_fallback(calls.clone())).await;

        assert_eq!(report.failures.len(), 2);
        assert!(report.fallback_fired);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let admins = s.state(StatName::Administrations);
        assert_eq!(admins.trust(), Some(Trust::Low));
        assert_eq!(
            admins.bundle().map(|b| b.labels.len()),
            Some(DEFAULT_DEPARTMENTS.len())
        );
        assert!(!s.real_data_received());
    }

    #[tokio::test(start_paused = true)]
    async fn late_real_data_supersedes_fallback() {
        let mut s = session();
        let calls = Arc::new(AtomicUsize::new(0));
        let sources = vec![Source {
            transport: Transport::Poll,
            fetch: after(8, Ok(real_snapshot())),
        }];

        let report = race_sources(&mut s, sources, FALLBACK_DELAY, counting_fallback(calls.clone())).await;

        assert!(report.fallback_fired);
        let admin_outcomes: Vec<_> = report
            .outcomes
            .iter()
            .filter(|(_, stat, _)| *stat == StatName::Administrations)
            .map(|(transport, _, outcome)| (*transport, outcome.clone()))
            .collect();
        assert_eq!(
            admin_outcomes,
            vec![
                (Transport::Fallback, Outcome::Accepted),
                (Transport::Poll, Outcome::Accepted)
            ]
        );
        assert_eq!(s.state(StatName::Administrations).trust(), Some(Trust::High));
        // Charts the real payload did not carry keep the placeholder.
        assert_eq!(s.state(StatName::Summary).trust(), Some(Trust::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_and_push_both_real_keeps_latest() {
        let mut s = session();
        let mut newer = real_snapshot();
        if let Some(bundle) = newer.bundles.get_mut(&StatName::Administrations) {
            *bundle = StatBundle::measured(
                StatName::Administrations,
                vec!["Direction Commerciale".into()],
                vec![5],
            );
        }
        let sources = vec![
            Source {
                transport: Transport::Embedded,
                fetch: after(0, Ok(real_snapshot())),
            },
            Source {
                transport: Transport::Push,
                fetch: after(2, Ok(newer)),
            },
        ];

        race_sources(&mut s, sources, FALLBACK_DELAY, || placeholder_snapshot(today(), 7)).await;

        let bundle = s.state(StatName::Administrations).bundle().cloned();
        assert_eq!(bundle.map(|b| b.values().to_vec()), Some(vec![5]));
    }

    #[test]
    fn placeholder_is_low_trust_everywhere() {
        let snapshot = placeholder_snapshot(today(), 7);
        assert_eq!(snapshot.bundles.len(), StatName::ALL.len());
        for bundle in snapshot.bundles.values() {
            assert_eq!(Trust::of(bundle), Trust::Low);
            assert!(bundle.values().iter().all(|v| *v == 0));
        }
        let trend = snapshot.get(StatName::OrderTrend).unwrap();
        assert_eq!(trend.labels.first().map(String::as_str), Some("2026-03-04"));
    }
}
