//! Client-side reconciliation of dashboard data.
//!
//! Charts can be fed by the embedded page payload, server-sent events,
//! polling, and a synthetic fallback, in any order. [`state::reduce`]
//! decides what each chart displays; [`session::DashboardSession`] holds the
//! per-chart state and re-checks what was rendered; [`race`] drives the
//! transports concurrently; [`adapter`] turns raw payloads into bundles.
//!
//! Administration labels are validated with the same
//! [`LabelSanitizer`](crate::services::sanitizer::LabelSanitizer) the server
//! uses, independently of the server's own filtering.

pub mod adapter;
pub mod race;
pub mod session;
pub mod state;

pub use session::{Arrival, DashboardSession, Transport, PRIMARY_VIEW_LIMIT};
pub use state::{reduce, ChartState, Outcome, Reduction, Trust};
