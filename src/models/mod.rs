//! Core data models for the rankings service.

mod ids;
mod name;
mod rating;
mod selection;
mod stats;

pub use ids::*;
pub use name::*;
pub use rating::*;
pub use selection::*;
pub use stats::*;
