//! Monte Carlo comparison of health insurance plans.
//!
//! Claim generators produce a year of stochastic claims; every registered
//! plan pays the same claims through its deductible, cost-share and
//! out-of-pocket-maximum waterfall; the simulator reduces each plan's year
//! to a scalar and accumulates one series per plan across trials.

pub mod analysis;
pub mod categories;
pub mod claim;
pub mod claim_generator;
pub mod config;
pub mod distribution;
pub mod error;
pub mod logging;
pub mod payment;
pub mod plan;
pub mod simulation;
pub mod types;

pub use categories::{Category, CategoryRegistry};
pub use claim::Claim;
pub use claim_generator::{ClaimGenerator, ClaimProbability};
pub use distribution::Distribution;
pub use error::{ConfigurationError, DomainError, Error, ValidationError};
pub use logging::init_logging;
pub use payment::{Payment, PaymentLedger, PaymentSource};
pub use plan::{CostShare, Coverage, CoverageTerms, InsurancePlan};
pub use simulation::YearSimulator;
