//! In-process mock ACME server for tests.
//!
//! Implements enough of RFC 8555 to drive the client end to end:
//! directory, nonces (issued once, verified on every POST), accounts,
//! orders, authorizations, challenges, finalize, certificate download,
//! key rollover and revocation.

use std::{
    collections::HashSet,
    convert::Infallible,
    net::TcpListener,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, OnceLock,
    },
};

use actix_http::{body::BoxBody, HttpService, Method, Request, Response, StatusCode};
use actix_server::{Server, ServerHandle};
use actix_web::body::MessageBody;
use base64::prelude::*;
use futures_util::StreamExt as _;
use parking_lot::Mutex;
use regex::Regex;

static RE_URL: OnceLock<Regex> = OnceLock::new();

fn re_url() -> &'static Regex {
    RE_URL.get_or_init(|| Regex::new("<URL>").unwrap())
}

pub(crate) struct TestServer {
    pub dir_url: String,
    handle: ServerHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        drop(self.handle.stop(false));
    }
}

#[derive(Debug, Default, Clone)]
pub(crate) struct TestServerOpts {
    /// Number of POSTs to the newOrder URL answered with badNonce
    /// before letting one through.
    pub bad_nonces: usize,

    /// Answer order refreshes with 503 + this `Retry-After` value.
    pub order_retry_after: Option<u64>,
}

struct ServerState {
    nonce_counter: AtomicUsize,
    issued_nonces: Mutex<HashSet<String>>,
    bad_nonces: AtomicUsize,
    order_retry_after: Option<u64>,
}

fn next_nonce(state: &ServerState) -> String {
    let n = state.nonce_counter.fetch_add(1, Ordering::SeqCst);
    let nonce = format!("test-nonce-{n}");
    state.issued_nonces.lock().insert(nonce.clone());
    nonce
}

/// Consumes the nonce named in the protected header; false if it was
/// never issued or already used.
fn take_issued_nonce(state: &ServerState, protected: &serde_json::Value) -> bool {
    match protected["nonce"].as_str() {
        Some(nonce) => state.issued_nonces.lock().remove(nonce),
        None => false,
    }
}

/// Splits a flattened JWS body into (protected header, payload).
/// POST-as-GET payloads come back as `Null`.
fn jws_parts(body: &[u8]) -> (serde_json::Value, serde_json::Value) {
    let jws: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();

    let protected = decode_b64_json(jws["protected"].as_str().unwrap_or(""));

    let payload = match jws["payload"].as_str() {
        Some("") | None => serde_json::Value::Null,
        Some(b64) => decode_b64_json(b64),
    };

    (protected, payload)
}

fn decode_b64_json(input: &str) -> serde_json::Value {
    BASE64_URL_SAFE_NO_PAD
        .decode(input)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(serde_json::Value::Null)
}

fn problem(status: StatusCode, _type: &str, detail: &str) -> Response<impl MessageBody> {
    Response::build(status)
        .insert_header(("content-type", "application/problem+json"))
        .body(format!(
            r#"{{"type":"{_type}","detail":"{detail}","status":{}}}"#,
            status.as_u16()
        ))
}

fn get_directory(url: &str) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
    "keyChange": "<URL>/acme/key-change",
    "newAccount": "<URL>/acme/new-acct",
    "newNonce": "<URL>/acme/new-nonce",
    "newOrder": "<URL>/acme/new-order",
    "revokeCert": "<URL>/acme/revoke-cert",
    "meta": {
        "termsOfService": "https://testdir.org/terms.pdf",
        "caaIdentities": [
        "testdir.org"
        ],
        "profiles": {
            "classic": "the default profile",
            "shortlived": "short-lived certificates"
        }
    }
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn head_new_nonce() -> Response<impl MessageBody> {
    // the replay-nonce header is attached to every response on the way out
    Response::build(StatusCode::NO_CONTENT).finish()
}

fn account_body(url: &str, status: &str) -> String {
    let body = format!(
        r#"{{
        "status": "{status}",
        "orders": "<URL>/acme/acct/7728515/orders"
        }}"#
    );
    re_url().replace_all(&body, url).into_owned()
}

fn post_new_acct(url: &str, payload: &serde_json::Value) -> Response<impl MessageBody> {
    let only_existing = payload["onlyReturnExisting"] == true;

    if !only_existing && payload["termsOfServiceAgreed"] != true {
        return problem(
            StatusCode::FORBIDDEN,
            "urn:ietf:params:acme:error:agreementRequired",
            "terms of service were not agreed to",
        )
        .map_into_boxed_body();
    }

    let mut account: serde_json::Value =
        serde_json::from_str(&account_body(url, "valid")).unwrap();
    if let Some(contact) = payload.get("contact") {
        account["contact"] = contact.clone();
    }
    if let Some(eab) = payload.get("externalAccountBinding") {
        account["externalAccountBinding"] = eab.clone();
    }

    let location = re_url()
        .replace_all("<URL>/acme/acct/7728515", url)
        .into_owned();

    let status = if only_existing {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };

    Response::build(status)
        .insert_header(("location", location))
        .insert_header(("content-type", "application/json"))
        .body(account.to_string())
        .map_into_boxed_body()
}

fn post_account(url: &str, payload: &serde_json::Value) -> Response<impl MessageBody> {
    // POST-as-GET reads the account; a status update deactivates it.
    let status = if payload["status"] == "deactivated" {
        "deactivated"
    } else {
        "valid"
    };

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(account_body(url, status))
}

fn post_new_order(url: &str, payload: &serde_json::Value) -> Response<impl MessageBody> {
    let identifiers = payload["identifiers"].clone();

    let wildcard = identifiers
        .as_array()
        .map(|ids| {
            ids.iter()
                .any(|id| id["value"].as_str().unwrap_or("").starts_with("*."))
        })
        .unwrap_or(false);

    let authz = if wildcard {
        "<URL>/acme/authz/wildcard"
    } else {
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    };

    let body = serde_json::json!({
        "status": "pending",
        "expires": "2019-01-09T08:26:43.570360537Z",
        "identifiers": identifiers,
        "authorizations": [authz],
        "finalize": "<URL>/acme/finalize/7738992/18234324"
    });

    let location = re_url()
        .replace_all("<URL>/acme/order/YTqpYUthlVfwBncUufE8", url)
        .into_owned();

    Response::build(StatusCode::CREATED)
        .insert_header(("location", location))
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(&body.to_string(), url).into_owned())
}

fn post_get_order(url: &str, state: &ServerState) -> Response<impl MessageBody> {
    if let Some(seconds) = state.order_retry_after {
        return Response::build(StatusCode::SERVICE_UNAVAILABLE)
            .insert_header(("retry-after", seconds.to_string()))
            .insert_header(("content-type", "application/problem+json"))
            .body(
                r#"{"type":"urn:ietf:params:acme:error:rateLimited","detail":"slow down"}"#
                    .to_owned(),
            )
            .map_into_boxed_body();
    }

    const BODY: &str = r#"{
    "status": "ready",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324"
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
        .map_into_boxed_body()
}

fn post_authz(url: &str) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
        "identifier": {
            "type": "dns",
            "value": "acme-test.example.com"
        },
        "status": "pending",
        "expires": "2019-01-09T08:26:43Z",
        "challenges": [
        {
            "type": "http-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789597",
            "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
        },
        {
            "type": "tls-alpn-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789598",
            "token": "WCdRWkCy4THTD_j5IH4ISAzr59lFIg5wzYmKxuOJ1lU"
        },
        {
            "type": "dns-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789599",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }
        ]
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_authz_wildcard(url: &str) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
        "identifier": {
            "type": "dns",
            "value": "example.com"
        },
        "status": "pending",
        "expires": "2019-01-09T08:26:43Z",
        "wildcard": true,
        "challenges": [
        {
            "type": "dns-01",
            "status": "pending",
            "url": "<URL>/acme/challenge/wildcard/1",
            "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
        }
        ]
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_challenge(url: &str) -> Response<impl MessageBody> {
    const BODY: &str = r#"{
        "type": "dns-01",
        "status": "valid",
        "validated": "2019-01-09T08:26:43Z",
        "url": "<URL>/acme/challenge/YTqpYUthlVfwBncUufE8IRWLMSRqcSs/216789599",
        "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
}

fn post_finalize(url: &str, payload: &serde_json::Value) -> Response<impl MessageBody> {
    if payload["csr"].as_str().map(str::is_empty).unwrap_or(true) {
        return problem(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:badCSR",
            "finalize request carried no CSR",
        )
        .map_into_boxed_body();
    }

    const BODY: &str = r#"{
    "status": "valid",
    "expires": "2019-01-09T08:26:43.570360537Z",
    "identifiers": [
        {
        "type": "dns",
        "value": "acme-test.example.com"
        }
    ],
    "authorizations": [
        "<URL>/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs"
    ],
    "finalize": "<URL>/acme/finalize/7738992/18234324",
    "certificate": "<URL>/acme/cert/fae41c070f967713109028"
    }"#;

    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/json"))
        .body(re_url().replace_all(BODY, url).into_owned())
        .map_into_boxed_body()
}

fn post_certificate() -> Response<impl MessageBody> {
    Response::build(StatusCode::OK)
        .insert_header(("content-type", "application/pem-certificate-chain"))
        .body("CERT HERE")
}

fn post_key_change(url: &str, payload: &serde_json::Value) -> Response<impl MessageBody> {
    // The outer payload must be the inner JWS signed by the new key.
    let inner_protected = decode_b64_json(payload["protected"].as_str().unwrap_or(""));
    let inner_payload = decode_b64_json(payload["payload"].as_str().unwrap_or(""));

    let inner_ok = payload["signature"].is_string()
        && inner_protected["jwk"].is_object()
        && inner_protected["nonce"].is_null()
        && inner_payload["oldKey"].is_object();

    let account_url = re_url()
        .replace_all("<URL>/acme/acct/7728515", url)
        .into_owned();
    let account_ok = inner_payload["account"] == account_url.as_str();

    if !inner_ok || !account_ok {
        return problem(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:malformed",
            "key rollover JWS did not validate",
        )
        .map_into_boxed_body();
    }

    Response::build(StatusCode::OK)
        .insert_header(("location", account_url))
        .insert_header(("content-type", "application/json"))
        .body(account_body(url, "valid"))
        .map_into_boxed_body()
}

fn post_revoke(payload: &serde_json::Value) -> Response<impl MessageBody> {
    if payload["certificate"].as_str().map(str::is_empty).unwrap_or(true) {
        return problem(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:malformed",
            "revocation request carried no certificate",
        )
        .map_into_boxed_body();
    }

    Response::build(StatusCode::OK)
        .finish()
        .map_into_boxed_body()
}

fn post_request(
    path: &str,
    body: &[u8],
    url: &str,
    state: &ServerState,
) -> Response<BoxBody> {
    let (protected, payload) = jws_parts(body);

    if !take_issued_nonce(state, &protected) {
        return problem(
            StatusCode::BAD_REQUEST,
            "urn:ietf:params:acme:error:badNonce",
            "unknown or reused nonce",
        )
        .map_into_boxed_body();
    }

    match path {
        "/acme/new-acct" => post_new_acct(url, &payload).map_into_boxed_body(),

        "/acme/acct/7728515" => post_account(url, &payload).map_into_boxed_body(),

        "/acme/new-order" => {
            // Optionally burn configured badNonce failures first.
            let burn = state
                .bad_nonces
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();

            if burn {
                return problem(
                    StatusCode::BAD_REQUEST,
                    "urn:ietf:params:acme:error:badNonce",
                    "nonce was invalidated",
                )
                .map_into_boxed_body();
            }

            post_new_order(url, &payload).map_into_boxed_body()
        }

        "/acme/order/YTqpYUthlVfwBncUufE8" => post_get_order(url, state).map_into_boxed_body(),

        "/acme/authz/YTqpYUthlVfwBncUufE8IRWLMSRqcSs" => post_authz(url).map_into_boxed_body(),

        "/acme/authz/wildcard" => post_authz_wildcard(url).map_into_boxed_body(),

        "/acme/finalize/7738992/18234324" => {
            post_finalize(url, &payload).map_into_boxed_body()
        }

        "/acme/cert/fae41c070f967713109028" => post_certificate().map_into_boxed_body(),

        "/acme/key-change" => post_key_change(url, &payload).map_into_boxed_body(),

        "/acme/revoke-cert" => post_revoke(&payload).map_into_boxed_body(),

        path if path.starts_with("/acme/challenge/") => post_challenge(url).map_into_boxed_body(),

        _ => Response::build(StatusCode::NOT_FOUND)
            .finish()
            .map_into_boxed_body(),
    }
}

fn route_request(req: &Request, body: &[u8], url: &str, state: &ServerState) -> Response<BoxBody> {
    let mut res = match (req.method(), req.path()) {
        (&Method::GET, "/directory") => get_directory(url).map_into_boxed_body(),
        (&Method::HEAD, "/acme/new-nonce") => head_new_nonce().map_into_boxed_body(),
        (&Method::POST, path) => post_request(path, body, url, state),

        (_, _) => Response::build(StatusCode::NOT_FOUND)
            .finish()
            .map_into_boxed_body(),
    };

    // Every response hands out a fresh nonce, errors included.
    let nonce = next_nonce(state);
    res.headers_mut().insert(
        actix_http::header::HeaderName::from_static("replay-nonce"),
        actix_http::header::HeaderValue::from_str(&nonce).unwrap(),
    );

    res
}

async fn read_body(req: &mut Request) -> Vec<u8> {
    let mut payload = req.take_payload();
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        match chunk {
            Ok(bytes) => body.extend_from_slice(&bytes),
            Err(_) => break,
        }
    }
    body
}

pub(crate) fn with_directory_server() -> TestServer {
    with_directory_server_opts(TestServerOpts::default())
}

pub(crate) fn with_directory_server_opts(opts: TestServerOpts) -> TestServer {
    let lst = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = lst.local_addr().unwrap().port();

    let url = format!("http://127.0.0.1:{port}");
    let dir_url = format!("{url}/directory");

    let state = Arc::new(ServerState {
        nonce_counter: AtomicUsize::new(0),
        issued_nonces: Mutex::new(HashSet::new()),
        bad_nonces: AtomicUsize::new(opts.bad_nonces),
        order_retry_after: opts.order_retry_after,
    });

    let server = Server::build()
        .listen("acme", lst, move || {
            let url = url.clone();
            let state = Arc::clone(&state);

            HttpService::build()
                .finish(move |mut req: Request| {
                    let url = url.clone();
                    let state = Arc::clone(&state);

                    async move {
                        let body = read_body(&mut req).await;
                        Ok::<_, Infallible>(route_request(&req, &body, &url, &state))
                    }
                })
                .tcp()
        })
        .unwrap()
        .workers(1)
        .run();

    let handle = server.handle();

    tokio::spawn(server);

    TestServer { dir_url, handle }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::{
        req::HttpClient,
        trans::NonceCell,
        Directory, DirectoryUrl, Error,
    };

    #[tokio::test]
    async fn test_make_directory() {
        let server = with_directory_server();
        let res = reqwest::get(&server.dir_url).await.unwrap();
        assert!(res.status().is_success());
    }

    #[tokio::test]
    async fn test_bad_nonce_is_recovered_once() {
        let server = with_directory_server_opts(TestServerOpts {
            bad_nonces: 1,
            ..Default::default()
        });

        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        // First attempt gets badNonce, the automatic retry succeeds.
        let order = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        assert_eq!(order.api_order().domains(), vec!["acme-test.example.com"]);
    }

    #[tokio::test]
    async fn test_second_bad_nonce_is_propagated() {
        let server = with_directory_server_opts(TestServerOpts {
            bad_nonces: 2,
            ..Default::default()
        });

        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let err = acc
            .new_order("acme-test.example.com", &[])
            .await
            .unwrap_err();

        let problem = err.problem().expect("second badNonce must surface");
        assert!(problem.is_bad_nonce());
    }

    #[tokio::test]
    async fn test_retry_after_surfaces_as_typed_error() {
        let server = with_directory_server_opts(TestServerOpts {
            order_retry_after: Some(120),
            ..Default::default()
        });

        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let mut order = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        let err = order.refresh().await.unwrap_err();

        assert!(matches!(err, Error::RetryAfter { seconds: 120 }));
        assert_eq!(err.retry_after(), Some(120));
    }

    #[tokio::test]
    async fn test_nonces_are_unique_under_contention() {
        let server = with_directory_server();
        let base_url = server.dir_url.trim_end_matches("/directory").to_owned();

        let http = HttpClient::new(reqwest::Client::new(), "acme-core-test".to_owned());
        let cell = Arc::new(NonceCell::new(http, &format!("{base_url}/acme/new-nonce")));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cell = Arc::clone(&cell);
            tasks.push(tokio::spawn(async move { cell.take_nonce().await.unwrap() }));
        }

        let mut seen = HashSet::new();
        for task in tasks {
            let nonce = task.await.unwrap();
            assert!(seen.insert(nonce), "a nonce was handed out twice");
        }
    }
}
