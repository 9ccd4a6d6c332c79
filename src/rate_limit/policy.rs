//! Named request budgets for the Douban origin.

use std::fmt;
use std::time::Duration;

use super::{compose, Constraint, RateLimitError};

/// Which budget applies to a request.
///
/// | Policy | Budget |
/// |---|---|
/// | `Default` | 1 per 500ms |
/// | `GuestAntiBlock` | 10 per minute and 1 per 5s |
/// | `Authenticated` | 20 per minute and 1 per 3s |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RatePolicy {
    Default,
    GuestAntiBlock,
    Authenticated,
}

impl RatePolicy {
    pub const ALL: [RatePolicy; 3] = [
        RatePolicy::Default,
        RatePolicy::GuestAntiBlock,
        RatePolicy::Authenticated,
    ];

    /// Pick the budget for the current configuration.
    ///
    /// Without the anti-block flag the light default applies regardless of
    /// login state. With it, logged-in sessions get the larger budget.
    pub fn select(anti_block: bool, has_cookies: bool) -> Self {
        match (anti_block, has_cookies) {
            (false, _) => RatePolicy::Default,
            (true, false) => RatePolicy::GuestAntiBlock,
            (true, true) => RatePolicy::Authenticated,
        }
    }

    /// Build a new constraint with this budget.
    pub fn constraint(&self) -> Result<Constraint, RateLimitError> {
        match self {
            RatePolicy::Default => Constraint::window(1, Duration::from_millis(500)),
            RatePolicy::GuestAntiBlock => Ok(compose(
                Constraint::window(10, Duration::from_secs(60))?,
                Constraint::window(1, Duration::from_millis(5000))?,
            )),
            RatePolicy::Authenticated => Ok(compose(
                Constraint::window(20, Duration::from_secs(60))?,
                Constraint::window(1, Duration::from_millis(3000))?,
            )),
        }
    }
}

impl fmt::Display for RatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatePolicy::Default => write!(f, "default"),
            RatePolicy::GuestAntiBlock => write!(f, "guest-anti-block"),
            RatePolicy::Authenticated => write!(f, "authenticated"),
        }
    }
}
