//! Database models and DTOs for all domain entities.

pub mod order;
pub mod pagination;
pub mod product;
pub mod stats;
pub mod user;
