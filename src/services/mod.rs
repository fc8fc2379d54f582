//! Business logic services.

pub mod aggregation;
pub mod cache;
pub mod dashboard;
pub mod orders;
pub mod sanitizer;
