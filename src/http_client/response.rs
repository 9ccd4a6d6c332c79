//! Request and response values passed through the fetch pipeline.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{Method, StatusCode};
use url::Url;

/// An outbound request.
///
/// Fully buffered so it can be replayed verbatim after a challenge is solved.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parse `url` and build a GET request.
    pub fn get_str(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// A form-urlencoded POST.
    pub fn post_form(url: Url, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let mut request = Self::new(Method::POST, url);
        request.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        request.body = Some(body.into_bytes());
        request
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the Referer header. Ignored if `referer` is not a valid header value.
    pub fn with_referer(self, referer: &Url) -> Self {
        match HeaderValue::from_str(referer.as_str()) {
            Ok(value) => self.with_header(REFERER, value),
            Err(_) => self,
        }
    }
}

/// A fully-read response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Effective URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Host of the effective URL.
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_form_encodes_fields() {
        let url = Url::parse("https://sec.example.com/c").unwrap();
        let request = FetchRequest::post_form(url, &[("tok", "a b"), ("sol", "42")]);

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_deref(), Some("tok=a%20b&sol=42".as_bytes()));
        assert_eq!(
            request.headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn test_with_referer() {
        let target = Url::parse("https://example.com/a").unwrap();
        let request = FetchRequest::get_str("https://example.com/b")
            .unwrap()
            .with_referer(&target);
        assert_eq!(request.headers.get(REFERER).unwrap(), "https://example.com/a");
    }

    #[test]
    fn test_response_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let response = FetchResponse {
            url: Url::parse("https://sec.example.com/c?r=1").unwrap(),
            status: StatusCode::OK,
            headers,
            body: "héllo".as_bytes().to_vec(),
        };

        assert!(response.is_success());
        assert_eq!(response.host(), Some("sec.example.com"));
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.text(), "héllo");
    }
}
