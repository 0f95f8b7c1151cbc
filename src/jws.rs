//! JOSE primitives for the signed request pipeline.
//!
//! See [RFC 8555 §6.2](https://datatracker.ietf.org/doc/html/rfc8555#section-6.2).

use base64::prelude::*;
use hmac::{Hmac, Mac as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

/// JWS protected header as constrained by [RFC 8555 §6.2].
///
/// > For newAccount requests, and for revokeCert requests authenticated by a certificate key,
/// there MUST be a "jwk" field. This field MUST contain the public key corresponding to the
/// private key used to sign the JWS.
/// >
/// > For all other requests, the request is signed using an existing account, and there MUST be a
/// "kid" field. This field MUST contain the account URL received by POSTing to the newAccount
/// resource.
///
/// The anti-replay `nonce` is mandatory on the outer envelope but absent
/// from the inner JWS of a key rollover and from external account
/// bindings.
///
/// [RFC 8555 §6.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-6.2
#[derive(Debug, Serialize, Deserialize, Default)]
pub(crate) struct JwsProtectedHeader {
    alg: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,

    url: String,

    /// JSON Web Key. Mutually exclusive with the `kid` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,

    /// Key ID. Mutually exclusive with the `jwk` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
}

impl JwsProtectedHeader {
    pub(crate) fn new_jwk(alg: &str, jwk: Jwk, url: &str, nonce: Option<String>) -> Self {
        JwsProtectedHeader {
            alg: alg.to_owned(),
            url: url.to_owned(),
            nonce,
            jwk: Some(jwk),
            ..Default::default()
        }
    }

    pub(crate) fn new_kid(alg: &str, kid: &str, url: &str, nonce: Option<String>) -> Self {
        JwsProtectedHeader {
            alg: alg.to_owned(),
            url: url.to_owned(),
            nonce,
            kid: Some(kid.to_owned()),
            ..Default::default()
        }
    }
}

/// Canonical public JWK forms for the supported key algorithms.
///
/// Only the required members of each key type are carried; that keeps
/// the serialization usable both in protected headers and as the signed
/// payload of an external account binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum Jwk {
    /// P-256 ECDSA (`ES256`).
    Ec {
        kty: String,
        crv: String,
        x: String,
        y: String,
    },

    /// Ed25519 (`EdDSA`).
    Okp { kty: String, crv: String, x: String },

    /// RSA (`RS256`).
    Rsa { kty: String, n: String, e: String },
}

impl Jwk {
    pub(crate) fn ec(x: String, y: String) -> Self {
        Jwk::Ec {
            kty: "EC".to_owned(),
            crv: "P-256".to_owned(),
            x,
            y,
        }
    }

    pub(crate) fn okp(x: String) -> Self {
        Jwk::Okp {
            kty: "OKP".to_owned(),
            crv: "Ed25519".to_owned(),
            x,
        }
    }

    pub(crate) fn rsa(n: String, e: String) -> Self {
        Jwk::Rsa {
            kty: "RSA".to_owned(),
            n,
            e,
        }
    }
}

/// Thumbprint form of a JWK.
///
/// RFC 7638 hashes the required members only, serialized with the keys
/// in lexicographic order. serde preserves struct field order, so THE
/// FIELD ORDER BELOW IS LOAD-BEARING.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum JwkThumb<'a> {
    Ec {
        crv: &'a str,
        kty: &'a str,
        x: &'a str,
        y: &'a str,
    },
    Okp {
        crv: &'a str,
        kty: &'a str,
        x: &'a str,
    },
    Rsa {
        e: &'a str,
        kty: &'a str,
        n: &'a str,
    },
}

impl<'a> From<&'a Jwk> for JwkThumb<'a> {
    fn from(jwk: &'a Jwk) -> Self {
        match jwk {
            Jwk::Ec { crv, x, y, kty } => JwkThumb::Ec { crv, kty, x, y },
            Jwk::Okp { crv, x, kty } => JwkThumb::Okp { crv, kty, x },
            Jwk::Rsa { n, e, kty } => JwkThumb::Rsa { e, kty, n },
        }
    }
}

/// RFC 7638 JWK thumbprint: base64url(SHA-256(canonical JWK JSON)).
pub(crate) fn thumbprint(jwk: &Jwk) -> Result<String> {
    let canonical = serde_json::to_string(&JwkThumb::from(jwk))?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(canonical)))
}

/// Flattened JWS JSON serialization.
///
/// <https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FlattenedJws {
    pub(crate) protected: String,
    pub(crate) payload: String,
    pub(crate) signature: String,
}

impl FlattenedJws {
    pub(crate) fn new(protected: String, payload: String, signature: String) -> Self {
        FlattenedJws {
            protected,
            payload,
            signature,
        }
    }
}

/// Builds the external account binding for a registration payload.
///
/// An HS256 JWS over the canonical public JWK of the account key being
/// registered, keyed with the MAC key the CA handed out alongside
/// `eab_kid`. See [RFC 8555 §7.3.4](https://datatracker.ietf.org/doc/html/rfc8555#section-7.3.4).
pub(crate) fn external_account_binding(
    eab_kid: &str,
    eab_mac_key: &str,
    account_jwk: &Jwk,
    new_account_url: &str,
) -> Result<FlattenedJws> {
    let protected = JwsProtectedHeader::new_kid("HS256", eab_kid, new_account_url, None);
    let protected = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(&protected)?);
    let payload = BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_string(account_jwk)?);

    let mac_key = decode_mac_key(eab_mac_key)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(&mac_key)
        .map_err(|err| Error::Key(format!("EAB MAC key rejected: {err}")))?;
    mac.update(format!("{protected}.{payload}").as_bytes());
    let signature = BASE64_URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(FlattenedJws::new(protected, payload, signature))
}

// CAs hand out both padded and unpadded base64url MAC keys.
fn decode_mac_key(key: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(key)
        .or_else(|_| BASE64_URL_SAFE.decode(key))
        .map_err(|err| Error::Key(format!("EAB MAC key is not base64url: {err}")))
}
