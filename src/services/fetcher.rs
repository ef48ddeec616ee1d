use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, StatusCode,
};

use crate::error::FetchError;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

// lowercase; matched against a lowercased body
const CHALLENGE_MARKERS: &[&str] = &[
    "robot check",
    "/errors/validatecaptcha",
    "enter the characters you see below",
    "cf-chl-",
    "challenge-platform",
    "are you a human",
    "px-captcha",
    "captcha-delivery",
];

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub http_status: u16,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let res = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Network(format!("timed out after {}s", self.timeout.as_secs()))
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("reading body failed: {e}")))?;

        classify(status, body)
    }
}

fn classify(status: StatusCode, body: String) -> Result<FetchedPage, FetchError> {
    let challenge_possible = status.is_success()
        || matches!(
            status,
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        );

    if challenge_possible {
        if let Some(marker) = challenge_marker(&body) {
            return Err(FetchError::Blocked(format!("status {}, marker {marker:?}", status.as_u16())));
        }
    }

    if !status.is_success() {
        return Err(FetchError::Http {
            status: status.as_u16(),
            detail: snippet(&body, 200),
        });
    }

    Ok(FetchedPage {
        content: body,
        http_status: status.as_u16(),
    })
}

pub fn challenge_marker(body: &str) -> Option<&'static str> {
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS.iter().copied().find(|m| lower.contains(m))
}

pub(crate) fn snippet(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
