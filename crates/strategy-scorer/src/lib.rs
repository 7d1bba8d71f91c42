//! Weighted 0-100 setup quality score.
//!
//! Each component is classified into an enum state by a pure function in
//! [`rules`], mapped to a sub-score through a fixed table, and the components
//! are combined by [`ScoringWeights`].

pub mod rules;
pub mod scorer;

pub use rules::*;
pub use scorer::*;
