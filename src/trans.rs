use std::sync::Arc;

use base64::prelude::*;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    acc::AcmeKey,
    error::{Error, Result},
    jws::{FlattenedJws, JwsProtectedHeader},
    req::{self, ApiResponse, HttpClient},
};

/// Single-slot replay-nonce cache.
///
/// Holds at most one unused nonce. A read consumes the slot; every
/// response that passes through the pipeline refills it from the
/// `Replay-Nonce` header, success or error. On a miss, a `HEAD` against
/// the directory's `newNonce` URL fetches a fresh one.
///
/// The slot is locked only around the swap, never across an HTTP call.
/// Two contending callers hitting an empty slot may each fetch their own
/// nonce; the invariant is that no nonce is handed out twice.
#[derive(Debug)]
pub(crate) struct NonceCell {
    http: HttpClient,
    nonce_url: String,
    slot: Mutex<Option<String>>,
}

impl NonceCell {
    pub(crate) fn new(http: HttpClient, nonce_url: &str) -> Self {
        NonceCell {
            http,
            nonce_url: nonce_url.to_owned(),
            slot: Mutex::new(None),
        }
    }

    /// Take the cached nonce, or fetch a fresh one.
    pub(crate) async fn take_nonce(&self) -> Result<String> {
        if let Some(nonce) = self.slot.lock().take() {
            log::trace!("using cached nonce");
            return Ok(nonce);
        }

        log::debug!("requesting fresh nonce");
        let res = self
            .http
            .head(&self.nonce_url)
            .await
            .map_err(|_| Error::NonceUnavailable)?;

        match res.header("replay-nonce") {
            Some(nonce) if !nonce.is_empty() => Ok(nonce.to_owned()),
            _ => Err(Error::NonceUnavailable),
        }
    }

    /// Refill the slot from a response, replacing any cached value.
    pub(crate) fn extract_nonce(&self, res: &ApiResponse) {
        if let Some(nonce) = res.header("replay-nonce") {
            log::trace!("storing replay nonce");
            *self.slot.lock() = Some(nonce.to_owned());
        }
    }
}

/// JWS signing and nonce handling for requests to the API.
///
/// One transport per signing key:
///
/// 1. `Transport::new()` with an unbound key
/// 2. `call_jwk()` against the newAccount URL
/// 3. `with_key()` using the key carrying the `Location` key ID
/// 4. `call()` for everything after that
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    http: HttpClient,
    nonce_cell: Arc<NonceCell>,
    acme_key: AcmeKey,
}

impl Transport {
    pub(crate) fn new(http: HttpClient, nonce_cell: Arc<NonceCell>, acme_key: AcmeKey) -> Self {
        Transport {
            http,
            nonce_cell,
            acme_key,
        }
    }

    /// The key used by this transport.
    pub(crate) fn acme_key(&self) -> &AcmeKey {
        &self.acme_key
    }

    /// The same pipeline bound to a different key (registration binding,
    /// key rotation).
    pub(crate) fn with_key(&self, acme_key: AcmeKey) -> Transport {
        Transport {
            http: self.http.clone(),
            nonce_cell: Arc::clone(&self.nonce_cell),
            acme_key,
        }
    }

    /// Make a call signed with the key's bound `kid` when it has one,
    /// with an embedded `jwk` header otherwise.
    pub(crate) async fn call<T>(&self, url: &str, body: &T) -> Result<ApiResponse>
    where
        T: Serialize + ?Sized,
    {
        self.send(url, body, self.acme_key.key_id().is_some()).await
    }

    /// Make a call with an embedded `jwk` header regardless of binding
    /// (newAccount, revocation authorized by the certificate key).
    pub(crate) async fn call_jwk<T>(&self, url: &str, body: &T) -> Result<ApiResponse>
    where
        T: Serialize + ?Sized,
    {
        self.send(url, body, false).await
    }

    async fn send<T>(&self, url: &str, body: &T, use_kid: bool) -> Result<ApiResponse>
    where
        T: Serialize + ?Sized,
    {
        let mut retried = false;

        loop {
            // Either reuse a nonce from a previous response or get a new one.
            let nonce = self.nonce_cell.take_nonce().await?;

            let envelope = self.signed_envelope(url, nonce, body, use_kid)?;

            log::debug!("call endpoint: {url}");
            let res = self.http.post(url, envelope).await?;

            // Regardless of the request being a success or not, there
            // might be a nonce in the response.
            self.nonce_cell.extract_nonce(&res);

            if !res.is_success() && !retried {
                if let Some(problem) = res.problem() {
                    if problem.is_bad_nonce() {
                        // One shot at recovery, with the nonce captured
                        // above. A second badNonce is a real error.
                        log::debug!("retrying on bad nonce");
                        retried = true;
                        continue;
                    }
                }
            }

            return req::handle_error(res);
        }
    }

    fn signed_envelope<T>(
        &self,
        url: &str,
        nonce: String,
        payload: &T,
        use_kid: bool,
    ) -> Result<String>
    where
        T: Serialize + ?Sized,
    {
        let protected = if use_kid {
            let kid = self
                .acme_key
                .key_id()
                .ok_or_else(|| Error::Key("key is not bound to an account".to_owned()))?;
            JwsProtectedHeader::new_kid(self.acme_key.alg(), kid, url, Some(nonce))
        } else {
            JwsProtectedHeader::new_jwk(
                self.acme_key.alg(),
                self.acme_key.to_public_jwk(),
                url,
                Some(nonce),
            )
        };

        let jws = sign_jws(&protected, &self.acme_key, payload)?;
        Ok(serde_json::to_string(&jws)?)
    }
}

/// Construct a flattened JWS over `payload` according to
/// [RFC 7515 §5.1](https://datatracker.ietf.org/doc/html/rfc7515#section-5.1).
///
/// A payload serializing to the JSON empty string is the POST-as-GET
/// marker and signs as the empty octet string.
pub(crate) fn sign_jws<T>(
    protected: &JwsProtectedHeader,
    key: &AcmeKey,
    payload: &T,
) -> Result<FlattenedJws>
where
    T: Serialize + ?Sized,
{
    let protected = {
        let json = serde_json::to_string(protected)?;
        BASE64_URL_SAFE_NO_PAD.encode(json)
    };

    let payload = {
        let json = serde_json::to_string(payload)?;
        if json == "\"\"" {
            String::new()
        } else {
            BASE64_URL_SAFE_NO_PAD.encode(json)
        }
    };

    let message = format!("{protected}.{payload}");
    let signature = BASE64_URL_SAFE_NO_PAD.encode(key.sign(message.as_bytes())?);

    Ok(FlattenedJws::new(protected, payload, signature))
}
