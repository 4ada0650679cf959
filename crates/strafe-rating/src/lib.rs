//! Strafe Rating - Skill estimation from match outcomes
//!
//! Two models, both pure functions over their inputs:
//! - Elo-style scalar ratings with a dynamic K-factor schedule
//! - A simplified Bayesian `(mean, uncertainty)` team model
//!
//! Persistence of the updated estimates is the caller's concern.

pub mod bayes;
pub mod elo;

pub use bayes::*;
pub use elo::*;
