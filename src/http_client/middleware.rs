//! Standard middleware for the Douban chain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{FetchError, FetchRequest, FetchResponse, Middleware, Next};
use crate::config::LiveSettings;
use crate::rate_limit::{Dispatcher, RateLimitError, RatePolicy};
use crate::session::SessionStore;

/// Reconciles the cookie jar with the configured cookie string.
pub struct SessionMiddleware {
    session: Arc<SessionStore>,
    settings: LiveSettings,
}

impl SessionMiddleware {
    pub fn new(session: Arc<SessionStore>, settings: LiveSettings) -> Self {
        Self { session, settings }
    }
}

#[async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError> {
        self.session
            .ensure_loaded(self.settings.douban().trimmed_cookies());
        next.run(request, cancel).await
    }
}

/// Logs every request that reaches it.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError> {
        info!("{} {}", request.method, request.url);
        let response = next.run(request, cancel).await?;
        debug!("{} from {}", response.status, response.url);
        Ok(response)
    }
}

enum Selection {
    Fixed(Dispatcher),
    ByPolicy {
        settings: LiveSettings,
        dispatchers: HashMap<RatePolicy, Dispatcher>,
    },
}

/// Holds each request until its rate budget allows it.
pub struct RateLimitMiddleware {
    selection: Selection,
}

impl RateLimitMiddleware {
    /// Every request waits on `dispatcher`.
    pub fn fixed(dispatcher: Dispatcher) -> Self {
        Self {
            selection: Selection::Fixed(dispatcher),
        }
    }

    /// One long-lived dispatcher per [`RatePolicy`]; the policy is chosen per
    /// request from the current anti-block flag and cookie presence.
    pub fn by_policy(settings: LiveSettings) -> Result<Self, RateLimitError> {
        let mut dispatchers = HashMap::new();
        for policy in RatePolicy::ALL {
            dispatchers.insert(policy, Dispatcher::new(policy.constraint()?));
        }
        Ok(Self {
            selection: Selection::ByPolicy {
                settings,
                dispatchers,
            },
        })
    }

    fn dispatcher(&self) -> Option<&Dispatcher> {
        match &self.selection {
            Selection::Fixed(dispatcher) => Some(dispatcher),
            Selection::ByPolicy {
                settings,
                dispatchers,
            } => {
                let douban = settings.douban();
                let policy = RatePolicy::select(douban.anti_block, douban.has_cookies());
                debug!("Using {} rate policy", policy);
                dispatchers.get(&policy)
            }
        }
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    async fn handle(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError> {
        match self.dispatcher() {
            Some(dispatcher) => dispatcher.enqueue(next.run(request, cancel), cancel).await,
            None => next.run(request, cancel).await,
        }
    }
}
