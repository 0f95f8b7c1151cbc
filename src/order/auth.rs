use std::{marker::PhantomData, sync::Arc};

use base64::prelude::*;
use sha2::{Digest as _, Sha256};

use crate::{
    acc::{AccountInner, AcmeKey},
    api,
    error::Result,
};

/// An authorization ([ownership proof]) for a domain name.
///
/// Each authorization for an order must be progressed to a valid state
/// before the ACME API will issue a certificate.
///
/// Authorizations may or may not be required depending on previous
/// orders against the same ACME account. The ACME API decides if the
/// authorization is needed.
///
/// There are three ways of providing the authorization:
///
/// * A text file served using [HTTP] from a web server of the domain
///   being authorized.
/// * A `TXT` [DNS] record under the domain being authorized.
/// * A certificate served for a [TLS-ALPN] handshake on the domain
///   being authorized.
///
/// [ownership proof]: ../index.html#domain-ownership
/// [HTTP]: Auth::http_challenge
/// [DNS]: Auth::dns_challenge
/// [TLS-ALPN]: Auth::tls_alpn_challenge
#[derive(Debug)]
pub struct Auth {
    inner: Arc<AccountInner>,
    api_auth: api::Authorization,
    auth_url: String,
}

impl Auth {
    pub(crate) fn new(
        inner: &Arc<AccountInner>,
        api_auth: api::Authorization,
        auth_url: &str,
    ) -> Self {
        Auth {
            inner: Arc::clone(inner),
            api_auth,
            auth_url: auth_url.to_owned(),
        }
    }

    /// Domain name for this authorization.
    ///
    /// For wildcard authorizations this is the base domain; check
    /// [`api::Authorization::is_wildcard`] on the API object.
    pub fn domain_name(&self) -> &str {
        &self.api_auth.identifier.value
    }

    /// Whether we actually need to do the authorization. This might not
    /// be needed if we have proven ownership of the domain recently in a
    /// previous order.
    pub fn need_challenge(&self) -> bool {
        !matches!(self.api_auth.status, api::AuthorizationStatus::Valid)
    }

    /// Get the http challenge.
    ///
    /// The http challenge must be placed so it is accessible under:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    ///
    /// The challenge will be accessed over HTTP (not HTTPS), for obvious
    /// reasons.
    pub fn http_challenge(&self) -> Option<Challenge<Http>> {
        self.api_auth
            .http_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Get the dns challenge.
    ///
    /// The dns challenge is a `TXT` record that must be put created
    /// under:
    ///
    /// ```text
    /// _acme-challenge.<domain-to-be-proven>.  TXT  <proof>
    /// ```
    ///
    /// The `<proof>` contains the signed token proving this account
    /// updated it.
    ///
    /// The dns proof is not the same as the http proof.
    pub fn dns_challenge(&self) -> Option<Challenge<Dns>> {
        self.api_auth
            .dns_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Returns the TLS ALPN challenge.
    ///
    /// The TLS ALPN challenge is a certificate that must be served when
    /// a TLS connection is made with the ALPN protocol "acme-tls/1". The
    /// certificate must contain a single dNSName SAN containing the
    /// domain being validated, as well as an ACME extension containing
    /// the SHA256 of the key authorization.
    pub fn tls_alpn_challenge(&self) -> Option<Challenge<TlsAlpn>> {
        self.api_auth
            .tls_alpn_challenge()
            .map(|c| Challenge::new(&self.inner, c.clone(), &self.auth_url))
    }

    /// Refresh the authorization state against the ACME API
    /// (POST-as-GET of the authorization URL).
    ///
    /// Use this to observe the outcome after triggering a challenge; the
    /// server moves the authorization out of `pending` when validation
    /// concludes.
    pub async fn refresh(&mut self) -> Result<()> {
        let res = self
            .inner
            .transport
            .call(&self.auth_url, &api::EmptyString)
            .await?;
        self.api_auth = res.json()?;
        Ok(())
    }

    /// Returns a reference to the authorization's API object.
    pub fn api_auth(&self) -> &api::Authorization {
        &self.api_auth
    }
}

/// Marker type for HTTP challenges.
#[doc(hidden)]
pub struct Http;

/// Marker type for DNS challenges.
#[doc(hidden)]
pub struct Dns;

/// Marker type for TLS ALPN challenges.
#[doc(hidden)]
pub struct TlsAlpn;

/// A DNS, HTTP, or TLS-ALPN challenge as obtained from the [`Auth`].
pub struct Challenge<A> {
    inner: Arc<AccountInner>,
    api_challenge: api::Challenge,
    auth_url: String,
    _ph: PhantomData<A>,
}

/// See [RFC 8555 §8.3].
///
/// [RFC 8555 §8.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.3
impl Challenge<Http> {
    /// Returns the token, a unique identifier of the challenge.
    ///
    /// This is used as the file name in the HTTP challenge like so:
    ///
    /// ```text
    /// http://<domain-to-be-proven>/.well-known/acme-challenge/<token>
    /// ```
    pub fn http_token(&self) -> &str {
        &self.api_challenge.token
    }

    /// Returns the proof content for HTTP validation.
    ///
    /// Proof is typically placed in a text file that is served as the
    /// file named by `token`.
    pub fn http_proof(&self) -> Result<String> {
        key_authorization(
            &self.api_challenge.token,
            self.inner.transport.acme_key(),
            false,
        )
    }
}

/// See [RFC 8555 §8.4].
///
/// [RFC 8555 §8.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-8.4
impl Challenge<Dns> {
    /// Returns the proof content for DNS validation.
    ///
    /// Proof is to be placed in a DNS TXT record like so:
    ///
    /// ```text
    /// _acme-challenge.<domain-to-be-proven>.  TXT  <proof>
    /// ```
    pub fn dns_proof(&self) -> Result<String> {
        key_authorization(
            &self.api_challenge.token,
            self.inner.transport.acme_key(),
            true,
        )
    }
}

/// See [RFC 8737 §3].
///
/// [RFC 8737 §3]: https://datatracker.ietf.org/doc/html/rfc8737#section-3
impl Challenge<TlsAlpn> {
    /// Returns the proof content for TLS-ALPN validation.
    ///
    /// Proof is to be placed in the certificate used for validation.
    pub fn tls_alpn_proof(&self) -> Result<[u8; 32]> {
        let proof = key_authorization(
            &self.api_challenge.token,
            self.inner.transport.acme_key(),
            false,
        )?;
        Ok(Sha256::digest(proof).into())
    }
}

impl<A> Challenge<A> {
    fn new(inner: &Arc<AccountInner>, api_challenge: api::Challenge, auth_url: &str) -> Self {
        Challenge {
            inner: Arc::clone(inner),
            api_challenge,
            auth_url: auth_url.to_owned(),
            _ph: PhantomData,
        }
    }

    /// URL of the authorization this challenge belongs to.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Returns true if this challenge needs validation.
    ///
    /// It might already have been done in a previous order for the same
    /// account.
    pub fn need_validate(&self) -> bool {
        matches!(self.api_challenge.status, api::ChallengeStatus::Pending)
    }

    /// Tell the ACME API to attempt validating the proof of this
    /// challenge.
    ///
    /// The challenge proof must be put in place before this call: in a
    /// DNS record, on a web server, or in a TLS-ALPN certificate.
    ///
    /// Returns the refreshed challenge object. Validation is
    /// asynchronous on the server; poll the authorization with
    /// [`Auth::refresh`] to observe the outcome, pacing the poll by any
    /// [`Error::RetryAfter`][crate::Error::RetryAfter] hints.
    pub async fn trigger(&self) -> Result<api::Challenge> {
        let res = self
            .inner
            .transport
            .call(&self.api_challenge.url, &api::EmptyObject)
            .await?;
        res.json()
    }

    /// Returns a reference to the challenge's API object.
    pub fn api_challenge(&self) -> &api::Challenge {
        &self.api_challenge
    }
}

fn key_authorization(token: &str, key: &AcmeKey, extra_sha256: bool) -> Result<String> {
    let thumbprint = key.thumbprint()?;
    let key_auth = format!("{token}.{thumbprint}");

    Ok(if extra_sha256 {
        BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(key_auth))
    } else {
        key_auth
    })
}
