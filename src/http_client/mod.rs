//! Fetch pipeline: an ordered middleware chain in front of an HTTP transport.
//!
//! The standard chain for the Douban origin is
//! `session -> challenge -> logging -> rate limit -> transport`: cookies are
//! reconciled first, challenge pages are healed around the rate-limited send
//! (so the validation post and the replay also wait their turn), and every
//! request that actually goes out is logged.

mod error;
mod middleware;
mod response;
mod transport;
mod user_agent;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::challenge::ChallengeMiddleware;
use crate::config::LiveSettings;
use crate::session::SessionStore;

pub use error::FetchError;
pub use middleware::{LoggingMiddleware, RateLimitMiddleware, SessionMiddleware};
pub use response::{FetchRequest, FetchResponse};
pub use transport::ReqwestTransport;
pub use user_agent::{random_user_agent, resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

/// Sends a request over the network. The last link of every chain.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError>;
}

/// One link of the chain. Calls `next` zero or more times.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError>;
}

/// The remainder of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl Next<'_> {
    pub async fn run(
        self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        match self.chain.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    chain: rest,
                    transport: self.transport,
                };
                head.handle(request, cancel, next).await
            }
            None => self.transport.send(request, cancel).await,
        }
    }
}

/// A middleware chain bound to a transport. Cheap to clone.
#[derive(Clone)]
pub struct FetchPipeline {
    chain: Arc<[Arc<dyn Middleware>]>,
    transport: Arc<dyn Transport>,
}

impl FetchPipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> FetchPipelineBuilder {
        FetchPipelineBuilder {
            chain: Vec::new(),
            transport,
        }
    }

    /// The standard Douban chain over `transport`.
    pub fn standard(
        settings: LiveSettings,
        session: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FetchError> {
        let challenge_base = Url::parse(&settings.douban().challenge_url)?;

        Ok(Self::builder(transport)
            .with(SessionMiddleware::new(session, settings.clone()))
            .with(ChallengeMiddleware::new(challenge_base))
            .with(LoggingMiddleware)
            .with(RateLimitMiddleware::by_policy(settings)?)
            .build())
    }

    /// Run `request` through the chain.
    pub async fn execute(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let next = Next {
            chain: &self.chain,
            transport: self.transport.as_ref(),
        };
        next.run(request, cancel).await
    }
}

pub struct FetchPipelineBuilder {
    chain: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl FetchPipelineBuilder {
    /// Append a middleware. Earlier middleware wraps later middleware.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> FetchPipeline {
        FetchPipeline {
            chain: self.chain.into(),
            transport: self.transport,
        }
    }
}
