//! Request-rate governance for the scraped origin.
//!
//! A [`Constraint`] is either a sliding [`RateWindow`] or the AND of two
//! constraints built with [`compose`]. A [`Dispatcher`] runs work once its
//! constraint grants. [`RatePolicy`] names the concrete budgets the client
//! switches between depending on configuration.

mod constraint;
mod dispatcher;
mod policy;
mod window;

pub use constraint::{compose, Composed, Constraint, Permit};
pub use dispatcher::Dispatcher;
pub use policy::RatePolicy;
pub use window::{RateWindow, WindowReservation};

/// Errors from acquiring a constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    #[error("Rate limit wait cancelled")]
    Cancelled,
    #[error("Invalid rate policy: {0}")]
    InvalidPolicy(String),
}
