//! Detection and solving of the origin's proof-of-work bot challenge.
//!
//! When the origin suspects automation it redirects to a challenge host that
//! serves a form carrying a token (`tok`), a seed (`cha`) and a difficulty.
//! Submitting the smallest nonce whose SHA-512 digest of `seed + nonce` has
//! `difficulty` leading zero hex digits sets a clearance cookie, after which
//! the original request succeeds.

mod solver;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::http_client::{FetchError, FetchRequest, FetchResponse, Middleware, Next};

pub use solver::{digest_hex, leading_zero_nibbles, solve, YIELD_EVERY};

/// Difficulty used when the form does not state one.
pub const DEFAULT_DIFFICULTY: u32 = 4;

/// Path the form posts to when it has no `action`.
pub const DEFAULT_ACTION: &str = "/c";

/// Body fragments identifying the challenge form. Matched case-insensitively.
const MARKERS: &[&str] = &[r#"name="cha""#, r#"id="cha""#, r#"name="tok""#];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    #[error("Challenge solving cancelled")]
    Cancelled,
    #[error("Challenge form has no seed")]
    MissingSeed,
    #[error("Invalid challenge form action {0:?}")]
    InvalidAction(String),
}

/// Values read from a challenge page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeForm {
    pub token: String,
    pub seed: String,
    pub difficulty: u32,
    pub action: Option<String>,
}

impl ChallengeForm {
    /// Whether `response` is a challenge page served by `challenge_host`.
    pub fn detect(response: &FetchResponse, challenge_host: &str) -> bool {
        let on_challenge_host = response
            .host()
            .is_some_and(|host| host.eq_ignore_ascii_case(challenge_host));
        if !on_challenge_host {
            return false;
        }

        let body = response.text().to_lowercase();
        MARKERS.iter().any(|marker| body.contains(marker))
    }

    /// Read the form fields out of a challenge page.
    ///
    /// Missing token or seed become empty strings; a missing or unparseable
    /// difficulty falls back to [`DEFAULT_DIFFICULTY`].
    pub fn parse(body: &str) -> Self {
        let document = Html::parse_document(body);

        let token = input_value(&document, "tok").unwrap_or_default();
        let seed = input_value(&document, "cha").unwrap_or_default();
        let difficulty = input_value(&document, "difficulty")
            .and_then(|d| d.trim().parse::<i64>().ok())
            .map(|d| d.clamp(0, 128) as u32)
            .unwrap_or(DEFAULT_DIFFICULTY);
        let action = Selector::parse("form").ok().and_then(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|form| form.value().attr("action"))
                .map(|a| a.to_string())
        });

        Self {
            token,
            seed,
            difficulty,
            action,
        }
    }

    /// Where the solution is posted, resolved against the challenge host.
    pub fn validation_url(&self, challenge_base: &Url) -> Result<Url, ChallengeError> {
        let action = self
            .action
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(DEFAULT_ACTION);
        challenge_base
            .join(action)
            .map_err(|_| ChallengeError::InvalidAction(action.to_string()))
    }
}

/// Value of the input identified by `#name`, falling back to `input[name=name]`.
fn input_value(document: &Html, name: &str) -> Option<String> {
    [format!("#{}", name), format!("input[name={}]", name)]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            document
                .select(&sel)
                .next()
                .and_then(|el| el.value().attr("value"))
                .map(|v| v.to_string())
        })
}

/// Heals responses that landed on the challenge page.
///
/// On detection: solve, post the solution (only so the transport stores the
/// clearance cookie), then replay the original request once. Failures while
/// healing are logged and the challenge response is returned as-is;
/// cancellation always propagates.
#[derive(Debug, Clone)]
pub struct ChallengeMiddleware {
    challenge_base: Url,
}

impl ChallengeMiddleware {
    pub fn new(challenge_base: Url) -> Self {
        Self { challenge_base }
    }

    fn challenge_host(&self) -> &str {
        self.challenge_base.host_str().unwrap_or_default()
    }

    async fn solve_and_retry(
        &self,
        original: &FetchRequest,
        response: &FetchResponse,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError> {
        let form = ChallengeForm::parse(&response.text());
        if form.seed.is_empty() {
            return Err(ChallengeError::MissingSeed.into());
        }

        info!(
            "Solving challenge for {} (difficulty {})",
            original.url, form.difficulty
        );
        let solution = solve(&form.seed, form.difficulty, cancel).await?;
        debug!("Challenge solved with nonce {}", solution);

        let solution = solution.to_string();
        let validation = FetchRequest::post_form(
            form.validation_url(&self.challenge_base)?,
            &[
                ("tok", form.token.as_str()),
                ("cha", form.seed.as_str()),
                ("sol", solution.as_str()),
            ],
        )
        .with_referer(&original.url);
        next.run(validation, cancel).await?;

        next.run(original.clone(), cancel).await
    }
}

#[async_trait]
impl Middleware for ChallengeMiddleware {
    async fn handle(
        &self,
        request: FetchRequest,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<FetchResponse, FetchError> {
        // Captured before the transport follows any redirect.
        let original = request.clone();
        let response = next.run(request, cancel).await?;

        if !ChallengeForm::detect(&response, self.challenge_host()) {
            return Ok(response);
        }

        match self
            .solve_and_retry(&original, &response, cancel, next)
            .await
        {
            Ok(retried) => Ok(retried),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Failed to handle challenge page for {}: {}", original.url, e);
                Ok(response)
            }
        }
    }
}
