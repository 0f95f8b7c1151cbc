use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;

use crate::{
    api,
    error::{Error, Result},
    retry,
};

pub(crate) const JOSE_JSON: &str = "application/jose+json";
pub(crate) const PROBLEM_JSON: &str = "application/problem+json";
pub(crate) const PEM_CHAIN: &str = "application/pem-certificate-chain";

/// HTTP handle shared by every request the client makes.
///
/// Wraps the caller-provided (or default) `reqwest::Client` and stamps
/// the configured `User-Agent` on each request.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    agent: reqwest::Client,
    user_agent: String,
}

impl HttpClient {
    pub(crate) fn new(agent: reqwest::Client, user_agent: String) -> Self {
        HttpClient { agent, user_agent }
    }

    /// Transport used when the caller does not inject one.
    pub(crate) fn default_agent() -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()?)
    }

    pub(crate) async fn get(&self, url: &str) -> Result<ApiResponse> {
        log::trace!("GET {url}");
        let res = self
            .agent
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        Ok(ApiResponse::read(res).await)
    }

    pub(crate) async fn head(&self, url: &str) -> Result<ApiResponse> {
        log::trace!("HEAD {url}");
        let res = self
            .agent
            .head(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        Ok(ApiResponse::read(res).await)
    }

    pub(crate) async fn post(&self, url: &str, body: String) -> Result<ApiResponse> {
        log::trace!("POST {url} {body}");
        let res = self
            .agent
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, JOSE_JSON)
            .body(body)
            .send()
            .await?;
        Ok(ApiResponse::read(res).await)
    }
}

/// Fully buffered response: status, headers and body bytes.
///
/// Buffering up front lets the pipeline inspect the body for problem
/// documents and still hand the raw bytes to the caller.
#[derive(Debug)]
pub(crate) struct ApiResponse {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    async fn read(res: reqwest::Response) -> ApiResponse {
        let status = res.status().as_u16();
        let headers = res.headers().clone();

        // Some CAs close the TLS session abruptly after writing the full
        // body; treat a failed read with a complete head as empty.
        let body = res.bytes().await.map(|b| b.to_vec()).unwrap_or_default();

        ApiResponse {
            status,
            headers,
            body,
        }
    }

    pub(crate) fn status(&self) -> u16 {
        self.status
    }

    pub(crate) fn is_success(&self) -> bool {
        self.status < 400
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the response, without parameters.
    pub(crate) fn content_type(&self) -> &str {
        self.header("content-type")
            .and_then(|v| v.split(';').next())
            .unwrap_or("")
            .trim()
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub(crate) fn json<T: DeserializeOwned>(&self) -> Result<T> {
        decode_json(&self.body)
    }

    /// Problem document carried by this response, if it is an error
    /// response with a JSON body.
    pub(crate) fn problem(&self) -> Option<api::Problem> {
        if self.is_success() {
            return None;
        }

        if self.content_type() != PROBLEM_JSON && self.content_type() != "application/json" {
            return None;
        }

        serde_json::from_slice(&self.body).ok()
    }
}

/// Decodes a JSON body, surfacing timestamp failures as their own
/// error variant.
pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| {
        let message = err.to_string();
        if message.contains(api::INVALID_TIMESTAMP) {
            Error::InvalidTimestamp(message)
        } else {
            Error::Json(err)
        }
    })
}

/// Maps a non-2xx response into the error taxonomy.
///
/// A parseable `Retry-After` header wins over the problem body; a
/// problem (or any non-empty) body wins over the bare status.
pub(crate) fn handle_error(res: ApiResponse) -> Result<ApiResponse> {
    if res.is_success() {
        return Ok(res);
    }

    if let Some(seconds) = res
        .header("retry-after")
        .and_then(retry::parse_retry_after)
    {
        return Err(Error::RetryAfter { seconds });
    }

    if let Some(problem) = res.problem() {
        return Err(Error::Problem(problem));
    }

    if res.body().is_empty() {
        return Err(Error::Http {
            status: res.status(),
        });
    }

    Err(Error::Problem(api::Problem::from_http(
        res.status(),
        res.body_string(),
    )))
}

pub(crate) fn expect_header(res: &ApiResponse, name: &'static str) -> Result<String> {
    res.header(name)
        .map(str::to_owned)
        .ok_or(Error::MissingHeader(name))
}
