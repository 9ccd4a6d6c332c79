//! In-memory transport for exercising middleware without a network.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{FetchError, FetchRequest, FetchResponse, Transport};

type Script = dyn Fn(&FetchRequest, usize) -> FetchResponse + Send + Sync;

/// Records every request and answers from a closure given the request and
/// the number of requests seen before it.
pub struct ScriptedTransport {
    script: Box<Script>,
    fail_method: Option<Method>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(&FetchRequest, usize) -> FetchResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            fail_method: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Like [`ScriptedTransport::new`] but requests with `method` fail.
    pub fn failing_on(
        method: Method,
        script: impl Fn(&FetchRequest, usize) -> FetchResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            fail_method: Some(method),
            ..Self::new(script)
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: FetchRequest,
        _cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let seen = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };

        if self.fail_method.as_ref() == Some(&request.method) {
            return Err(FetchError::Client("scripted failure".to_string()));
        }
        Ok((self.script)(&request, seen))
    }
}

/// An HTML response as if served from `url`.
pub fn html_response(url: &str, status: u16, body: &str) -> FetchResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    FetchResponse {
        url: Url::parse(url).unwrap(),
        status: StatusCode::from_u16(status).unwrap(),
        headers,
        body: body.as_bytes().to_vec(),
    }
}
