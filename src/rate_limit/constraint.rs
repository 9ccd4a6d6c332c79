//! Composable rate constraints.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::window::RateWindow;
use super::RateLimitError;

/// Something that can be waited on before a request goes out.
///
/// Cloning shares state: every clone draws from the same budget. Use
/// [`Constraint::fresh`] for an independent budget with the same shape.
#[derive(Debug, Clone)]
pub enum Constraint {
    Window(Arc<RateWindow>),
    Composed(Arc<Composed>),
}

/// Every leaf must grant.
///
/// Leaves are flattened out of nested compositions, kept once each and
/// ordered by address. Reserving them in that order means a leaf reached
/// through several paths is locked once, and composites sharing leaves
/// always lock them in the same order.
#[derive(Debug)]
pub struct Composed {
    leaves: Vec<Arc<RateWindow>>,
    gate: Mutex<()>,
}

/// Proof that a constraint granted. Released when dropped.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub enum Permit {
    Window,
    Composed(usize),
}

impl Permit {
    /// Release explicitly. Equivalent to dropping.
    pub fn release(self) {}
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Permit::Composed(leaves) = self {
            trace!("Releasing composed permit over {} windows", leaves);
        }
    }
}

impl Constraint {
    /// Leaf constraint: `capacity` grants per `window`.
    pub fn window(capacity: usize, window: Duration) -> Result<Self, RateLimitError> {
        Ok(Constraint::Window(Arc::new(RateWindow::new(capacity, window)?)))
    }

    /// Whether two handles share the same underlying state.
    pub fn ptr_eq(&self, other: &Constraint) -> bool {
        match (self, other) {
            (Constraint::Window(a), Constraint::Window(b)) => Arc::ptr_eq(a, b),
            (Constraint::Composed(a), Constraint::Composed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Same shape, no history.
    pub fn fresh(&self) -> Constraint {
        match self {
            Constraint::Window(window) => Constraint::Window(Arc::new(window.fresh())),
            Constraint::Composed(composed) => Constraint::Composed(Arc::new(Composed::new(
                composed
                    .leaves
                    .iter()
                    .map(|leaf| Arc::new(leaf.fresh()))
                    .collect(),
            ))),
        }
    }

    /// Distinct windows behind this constraint.
    pub fn leaves(&self) -> &[Arc<RateWindow>] {
        match self {
            Constraint::Window(window) => std::slice::from_ref(window),
            Constraint::Composed(composed) => &composed.leaves,
        }
    }

    /// Wait until every leaf of this constraint grants.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, RateLimitError> {
        match self {
            Constraint::Window(window) => {
                window.reserve(cancel).await?.commit(Instant::now());
                Ok(Permit::Window)
            }
            Constraint::Composed(composed) => composed.acquire(cancel).await,
        }
    }

    /// Longest time any leaf would currently make a caller wait.
    pub async fn time_until_ready(&self) -> Duration {
        let mut longest = Duration::ZERO;
        for leaf in self.leaves() {
            longest = longest.max(leaf.time_until_ready().await);
        }
        longest
    }
}

impl Composed {
    fn new(mut leaves: Vec<Arc<RateWindow>>) -> Self {
        leaves.sort_by_key(|leaf| Arc::as_ptr(leaf) as usize);
        leaves.dedup_by(|a, b| Arc::ptr_eq(a, b));
        Self {
            leaves,
            gate: Mutex::new(()),
        }
    }

    /// Reserve every leaf in order, then record one grant instant in all.
    ///
    /// The gate keeps callers of this composite from interleaving. A leaf
    /// stays ready once reserved: its lock is held, so nobody else can record
    /// in it while the later leaves are still waiting. Dropping the partial
    /// reservations on cancellation records nothing.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Permit, RateLimitError> {
        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            guard = self.gate.lock() => guard,
        };

        let mut reserved = Vec::with_capacity(self.leaves.len());
        for leaf in &self.leaves {
            reserved.push(leaf.reserve(cancel).await?);
        }

        let at = Instant::now();
        for reservation in reserved {
            reservation.commit(at);
        }
        Ok(Permit::Composed(self.leaves.len()))
    }
}

/// AND two constraints together. Composing a constraint with itself returns it.
pub fn compose(first: Constraint, second: Constraint) -> Constraint {
    if first.ptr_eq(&second) {
        return first;
    }

    let composed = Composed::new(
        first
            .leaves()
            .iter()
            .chain(second.leaves())
            .cloned()
            .collect(),
    );
    match composed.leaves.as_slice() {
        [only] => Constraint::Window(only.clone()),
        _ => Constraint::Composed(Arc::new(composed)),
    }
}
