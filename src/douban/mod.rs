//! Cached Douban lookups over the fetch pipeline.
//!
//! Every lookup degrades instead of failing: origin errors, non-success
//! statuses and unparseable pages yield an empty list or `None`. Only
//! cancellation is returned as an error.

pub mod extract;
pub mod models;

use std::sync::Arc;

use reqwest::cookie::Jar;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

use crate::cache::{CacheFill, ResponseCache, FAILURE_TTL, SUCCESS_TTL};
use crate::challenge::ChallengeForm;
use crate::config::LiveSettings;
use crate::http_client::{
    FetchError, FetchPipeline, FetchRequest, FetchResponse, ReqwestTransport, Transport,
};
use crate::session::SessionStore;

pub use models::{Celebrity, Photo, Subject};

/// Client for the Douban movie site.
pub struct DoubanApi {
    settings: LiveSettings,
    session: Arc<SessionStore>,
    pipeline: FetchPipeline,
    searches: ResponseCache<Vec<Subject>>,
    subjects: ResponseCache<Option<Subject>>,
    people: ResponseCache<Vec<Celebrity>>,
    person: ResponseCache<Option<Celebrity>>,
    photos: ResponseCache<Vec<Photo>>,
}

impl DoubanApi {
    /// Build a client with a reqwest transport and a fresh cookie jar.
    pub fn new(settings: LiveSettings) -> Result<Self, FetchError> {
        let current = settings.current();
        let jar = Arc::new(Jar::default());
        let session = Arc::new(SessionStore::new(
            jar.clone(),
            Url::parse(&current.douban.cookie_url)?,
            Some(current.douban.cookie_domain.clone()),
        ));
        let transport = ReqwestTransport::new(&current, jar)?;

        Self::with_transport(settings, session, Arc::new(transport))
    }

    /// Build a client over an arbitrary transport.
    pub fn with_transport(
        settings: LiveSettings,
        session: Arc<SessionStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, FetchError> {
        let pipeline = FetchPipeline::standard(settings.clone(), session.clone(), transport)?;

        Ok(Self {
            settings,
            session,
            pipeline,
            searches: ResponseCache::new(FAILURE_TTL),
            subjects: ResponseCache::new(FAILURE_TTL),
            people: ResponseCache::new(FAILURE_TTL),
            person: ResponseCache::new(FAILURE_TTL),
            photos: ResponseCache::new(FAILURE_TTL),
        })
    }

    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Drop every cached lookup.
    pub fn clear_cache(&self) {
        self.searches.clear();
        self.subjects.clear();
        self.people.clear();
        self.person.clear();
        self.photos.clear();
    }

    /// Movies and series matching `keyword`.
    pub async fn search(
        &self,
        keyword: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Subject>, FetchError> {
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/search?cat=1002&q={}",
            self.search_url(),
            urlencoding::encode(keyword)
        );
        let key = format!("search_{}", keyword);
        self.searches
            .get_or_compute(&key, SUCCESS_TTL, || {
                self.fetch_with(url, cancel, Vec::new(), |body| {
                    let results = extract::search_results(body);
                    if results.is_empty() {
                        warn!(
                            "Search for {:?} found nothing; the session may be blocked",
                            keyword
                        );
                    }
                    results
                })
            })
            .await
    }

    /// Subject detail. `None` when the page has no content.
    pub async fn get_subject(
        &self,
        sid: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Subject>, FetchError> {
        if sid.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/subject/{}/", self.base_url(), sid);
        self.subjects
            .get_or_compute(&format!("subject_{}", sid), SUCCESS_TTL, || {
                self.fetch_with(url, cancel, None, |body| extract::subject(body, sid))
            })
            .await
    }

    /// Directors, actors and voice actors credited on a subject.
    pub async fn get_celebrities(
        &self,
        sid: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Celebrity>, FetchError> {
        if sid.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/subject/{}/celebrities", self.base_url(), sid);
        self.people
            .get_or_compute(&format!("celebrities_{}", sid), SUCCESS_TTL, || {
                self.fetch_with(url, cancel, Vec::new(), extract::celebrities)
            })
            .await
    }

    /// Person detail. `None` when the page has no content.
    pub async fn get_celebrity(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Celebrity>, FetchError> {
        if id.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/celebrity/{}/", self.base_url(), id);
        self.person
            .get_or_compute(&format!("celebrity_{}", id), SUCCESS_TTL, || {
                self.fetch_with(url, cancel, None, |body| extract::celebrity(body, id))
            })
            .await
    }

    /// People matching `keyword`.
    pub async fn search_celebrity(
        &self,
        keyword: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Celebrity>, FetchError> {
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/celebrities/search?search_text={}",
            self.base_url(),
            urlencoding::encode(keyword)
        );
        self.people
            .get_or_compute(&format!("search_celebrity_{}", keyword), SUCCESS_TTL, || {
                self.fetch_with(url, cancel, Vec::new(), extract::celebrity_search)
            })
            .await
    }

    /// Wallpaper photos of a subject, largest first.
    pub async fn get_photos(
        &self,
        sid: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Photo>, FetchError> {
        if sid.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/subject/{}/photos?type=W&start=0&sortby=size&size=a&subtype=a",
            self.base_url(),
            sid
        );
        self.photos
            .get_or_compute(&format!("photo_{}", sid), SUCCESS_TTL, || {
                self.fetch_with(url, cancel, Vec::new(), extract::photos)
            })
            .await
    }

    fn base_url(&self) -> String {
        self.settings
            .douban()
            .base_url
            .trim_end_matches('/')
            .to_string()
    }

    fn search_url(&self) -> String {
        self.settings
            .douban()
            .search_url
            .trim_end_matches('/')
            .to_string()
    }

    /// Fetch `url` and extract a value from the body. Anything short of a
    /// successful response becomes `fallback`, marked transient.
    async fn fetch_with<V>(
        &self,
        url: String,
        cancel: &CancellationToken,
        fallback: V,
        parse: impl FnOnce(&str) -> V,
    ) -> Result<CacheFill<V>, FetchError> {
        match self.fetch_page(&url, cancel).await? {
            Some(body) => Ok(CacheFill::Value(parse(&body))),
            None => Ok(CacheFill::Transient(fallback)),
        }
    }

    /// Whether `response` is a challenge page the pipeline could not clear.
    fn is_unhealed_challenge(&self, response: &FetchResponse) -> bool {
        Url::parse(&self.settings.douban().challenge_url)
            .ok()
            .and_then(|base| base.host_str().map(|host| host.to_string()))
            .is_some_and(|host| ChallengeForm::detect(response, &host))
    }

    /// Body of a successful response, `None` on any other outcome.
    ///
    /// A challenge page that survived the pipeline is a failure even though
    /// it arrives with a success status.
    async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, FetchError> {
        let request = match FetchRequest::get_str(url) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid Douban URL {}: {}", url, e);
                return Ok(None);
            }
        };

        match self.pipeline.execute(request, cancel).await {
            Ok(response) if self.is_unhealed_challenge(&response) => {
                warn!("Douban request still challenged. url: {}", url);
                Ok(None)
            }
            Ok(response) if response.is_success() => Ok(Some(response.text())),
            Ok(response) => {
                warn!("Douban request failed. url: {} status: {}", url, response.status);
                Ok(None)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!("Douban request failed. url: {} error: {}", url, e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::http_client::testing::{html_response, ScriptedTransport};
    use reqwest::Method;
    use std::time::Duration;

    fn api(transport: Arc<ScriptedTransport>) -> DoubanApi {
        let mut settings = Settings::default();
        settings.douban.anti_block = false;
        let session = Arc::new(SessionStore::new(
            Arc::new(Jar::default()),
            Url::parse(&settings.douban.cookie_url).unwrap(),
            Some(settings.douban.cookie_domain.clone()),
        ));
        DoubanApi::with_transport(LiveSettings::new(settings), session, transport).unwrap()
    }

    const SUBJECT: &str = r#"<div id="content"><h1><span>霸王别姬</span><span class="year">(1993)</span></h1></div>"#;

    #[tokio::test(start_paused = true)]
    async fn test_subject_cached_including_not_found() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            let body = if req.url.path() == "/subject/1291546/" {
                SUBJECT
            } else {
                "<html><body>gone</body></html>"
            };
            html_response(req.url.as_str(), 200, body)
        }));
        let api = api(transport.clone());
        let cancel = CancellationToken::new();

        let found = api.get_subject("1291546", &cancel).await.unwrap().unwrap();
        assert_eq!(found.name, "霸王别姬");
        assert_eq!(found.year, Some(1993));
        api.get_subject("1291546", &cancel).await.unwrap();

        assert_eq!(api.get_subject("404", &cancel).await.unwrap(), None);
        assert_eq!(api.get_subject("404", &cancel).await.unwrap(), None);

        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_ids_short_circuit() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            html_response(req.url.as_str(), 200, "")
        }));
        let api = api(transport.clone());
        let cancel = CancellationToken::new();

        assert!(api.search("", &cancel).await.unwrap().is_empty());
        assert_eq!(api.get_subject("", &cancel).await.unwrap(), None);
        assert!(api.get_celebrities("", &cancel).await.unwrap().is_empty());
        assert_eq!(api.get_celebrity("", &cancel).await.unwrap(), None);
        assert!(api.search_celebrity("", &cancel).await.unwrap().is_empty());
        assert!(api.get_photos("", &cancel).await.unwrap().is_empty());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_degrade_and_expire_quickly() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            html_response(req.url.as_str(), 503, "busy")
        }));
        let api = api(transport.clone());
        let cancel = CancellationToken::new();

        assert!(api.get_photos("1", &cancel).await.unwrap().is_empty());
        assert!(api.get_photos("1", &cancel).await.unwrap().is_empty());
        assert_eq!(transport.requests().len(), 1);

        tokio::time::advance(FAILURE_TTL).await;
        api.get_photos("1", &cancel).await.unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncleared_challenge_expires_quickly() {
        const CHALLENGE: &str = r#"<form action="/c" method="POST">
            <input type="hidden" id="tok" name="tok" value="t">
            <input type="hidden" id="cha" name="cha" value="seed">
            <input type="hidden" id="difficulty" name="difficulty" value="1">
            </form>"#;
        let transport = Arc::new(ScriptedTransport::failing_on(Method::POST, |_, _| {
            html_response("https://sec.douban.com/?r=x", 200, CHALLENGE)
        }));
        let api = api(transport.clone());
        let cancel = CancellationToken::new();

        assert_eq!(api.get_subject("1", &cancel).await.unwrap(), None);
        assert_eq!(api.get_subject("1", &cancel).await.unwrap(), None);
        // Original GET plus the failed validation post.
        assert_eq!(transport.requests().len(), 2);

        tokio::time::advance(FAILURE_TTL + Duration::from_secs(1)).await;
        assert_eq!(api.get_subject("1", &cancel).await.unwrap(), None);
        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_degrade() {
        let transport = Arc::new(ScriptedTransport::failing_on(Method::GET, |req, _| {
            html_response(req.url.as_str(), 200, "")
        }));
        let api = api(transport);

        let people = api
            .search_celebrity("张国荣", &CancellationToken::new())
            .await
            .unwrap();
        assert!(people.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            html_response(req.url.as_str(), 200, SUBJECT)
        }));
        let api = api(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = api.get_subject("1291546", &cancel).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_encodes_keyword() {
        let transport = Arc::new(ScriptedTransport::new(|req, _| {
            html_response(req.url.as_str(), 200, "")
        }));
        let api = api(transport.clone());

        api.search("霸王 别姬", &CancellationToken::new())
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url.host_str(), Some("www.douban.com"));
        assert_eq!(sent[0].url.path(), "/search");
        let query: Vec<(String, String)> = sent[0].url.query_pairs().into_owned().collect();
        assert!(query.contains(&("q".to_string(), "霸王 别姬".to_string())));
    }
}
