use std::fmt;

use base64::prelude::*;
use rsa::traits::{PrivateKeyParts as _, PublicKeyParts as _};
use serde::{Deserialize, Serialize};
use signature::{SignatureEncoding as _, Signer as _};
use zeroize::Zeroizing;

use crate::{
    error::{Error, Result},
    jws::{self, Jwk},
};

/// RSA accounts use 2048-bit keys, the smallest size public CAs accept.
const RSA_BITS: usize = 2048;

/// Supported account key algorithms.
///
/// The default is `ec256`: P-256 is universally supported by public ACME
/// providers and keeps signed requests small.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// P-256 ECDSA, signing as `ES256`.
    #[default]
    Ec256,

    /// Ed25519, signing as `EdDSA`.
    Ed25519,

    /// 2048-bit RSA, signing as `RS256`.
    Rs256,
}

impl KeyType {
    /// JWS `alg` value for keys of this type.
    pub fn alg(self) -> &'static str {
        match self {
            KeyType::Ec256 => "ES256",
            KeyType::Ed25519 => "EdDSA",
            KeyType::Rs256 => "RS256",
        }
    }
}

#[derive(Clone)]
enum InnerKey {
    Ec256(p256::ecdsa::SigningKey),
    Ed25519(ed25519_dalek::SigningKey),
    Rs256(Box<rsa::RsaPrivateKey>),
}

/// Account signing key with its optional server-assigned key ID.
///
/// Until registration assigns a `kid`, the key signs requests with an
/// embedded `jwk` protected header; once bound it signs with `kid`.
/// Binding never mutates in place: [`AcmeKey::update_kid`] returns a new
/// value.
#[derive(Clone)]
pub struct AcmeKey {
    key: InnerKey,
    key_type: KeyType,
    key_id: Option<String>,
}

impl fmt::Debug for AcmeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmeKey")
            .field("key_type", &self.key_type)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl AcmeKey {
    /// Generate a fresh P-256 key, the default type.
    pub fn new() -> AcmeKey {
        AcmeKey {
            key: InnerKey::Ec256(crate::cert::create_p256_key()),
            key_type: KeyType::Ec256,
            key_id: None,
        }
    }

    /// Generate a fresh private key of the given type.
    pub fn generate(key_type: KeyType) -> Result<AcmeKey> {
        let key = match key_type {
            KeyType::Ec256 => InnerKey::Ec256(crate::cert::create_p256_key()),

            KeyType::Ed25519 => {
                InnerKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()))
            }

            KeyType::Rs256 => InnerKey::Rs256(Box::new(
                rsa::RsaPrivateKey::new(&mut rand::thread_rng(), RSA_BITS)
                    .map_err(|err| Error::Key(format!("RSA key generation failed: {err}")))?,
            )),
        };

        Ok(AcmeKey {
            key,
            key_type,
            key_id: None,
        })
    }

    /// Algorithm tag of this key.
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// JWS `alg` value used when signing with this key.
    pub(crate) fn alg(&self) -> &'static str {
        self.key_type.alg()
    }

    /// Account URL assigned by the server, once registered.
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    /// Returns a copy of this key bound to `kid`.
    #[must_use]
    pub fn update_kid(&self, kid: impl Into<String>) -> AcmeKey {
        AcmeKey {
            key_id: Some(kid.into()),
            ..self.clone()
        }
    }

    /// Raw JWS signature over `message` for this key's algorithm.
    ///
    /// ES256 and EdDSA produce the fixed-width concatenated form; RS256
    /// produces a PKCS #1 v1.5 signature.
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            InnerKey::Ec256(key) => {
                let signature: p256::ecdsa::Signature = key.sign(message);
                Ok(signature.to_bytes().to_vec())
            }

            InnerKey::Ed25519(key) => {
                let signature: ed25519_dalek::Signature = key.sign(message);
                Ok(signature.to_bytes().to_vec())
            }

            InnerKey::Rs256(key) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new((**key).clone());
                let signature: rsa::pkcs1v15::Signature = signing_key.sign(message);
                Ok(signature.to_vec())
            }
        }
    }

    /// Canonical public JWK for this key.
    pub(crate) fn to_public_jwk(&self) -> Jwk {
        match &self.key {
            InnerKey::Ec256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                // An uncompressed point always carries both coordinates.
                Jwk::ec(base64url(point.x().unwrap()), base64url(point.y().unwrap()))
            }

            InnerKey::Ed25519(key) => Jwk::okp(base64url(key.verifying_key().as_bytes())),

            InnerKey::Rs256(key) => Jwk::rsa(
                base64url(&key.n().to_bytes_be()),
                base64url(&key.e().to_bytes_be()),
            ),
        }
    }

    /// Canonical public JWK as a JSON value.
    pub fn to_public(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.to_public_jwk())?)
    }

    /// RFC 7638 JWK thumbprint (SHA-256 over the canonical public JWK,
    /// base64url without padding).
    pub fn thumbprint(&self) -> Result<String> {
        jws::thumbprint(&self.to_public_jwk())
    }

    /// Serialize the private key, its algorithm tag and key ID.
    ///
    /// The format round-trips through [`AcmeKey::from_json`]:
    /// `{"key": <private JWK>, "kid": <string|null>, "type": <tag>}`.
    pub fn to_json(&self) -> Result<Zeroizing<String>> {
        let key = match &self.key {
            InnerKey::Ec256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                PrivateJwk::Ec {
                    kty: "EC".to_owned(),
                    crv: "P-256".to_owned(),
                    x: base64url(point.x().unwrap()),
                    y: base64url(point.y().unwrap()),
                    d: base64url(&key.to_bytes()),
                }
            }

            InnerKey::Ed25519(key) => PrivateJwk::Okp {
                kty: "OKP".to_owned(),
                crv: "Ed25519".to_owned(),
                x: base64url(key.verifying_key().as_bytes()),
                d: base64url(&key.to_bytes()),
            },

            InnerKey::Rs256(key) => {
                let primes = key.primes();
                PrivateJwk::Rsa {
                    kty: "RSA".to_owned(),
                    n: base64url(&key.n().to_bytes_be()),
                    e: base64url(&key.e().to_bytes_be()),
                    d: base64url(&key.d().to_bytes_be()),
                    p: base64url(&primes[0].to_bytes_be()),
                    q: base64url(&primes[1].to_bytes_be()),
                }
            }
        };

        let json = serde_json::to_string(&KeyJson {
            key,
            kid: self.key_id.clone(),
            key_type: self.key_type,
        })?;

        Ok(Zeroizing::new(json))
    }

    /// Restore a key serialized with [`AcmeKey::to_json`].
    pub fn from_json(json: &str) -> Result<AcmeKey> {
        let KeyJson { key, kid, key_type } = serde_json::from_str(json)?;

        let key = match (key_type, key) {
            (KeyType::Ec256, PrivateJwk::Ec { d, .. }) => {
                let d = base64url_decode(&d)?;
                let key = p256::ecdsa::SigningKey::from_slice(&d)
                    .map_err(|err| Error::Key(format!("invalid P-256 private key: {err}")))?;
                InnerKey::Ec256(key)
            }

            (KeyType::Ed25519, PrivateJwk::Okp { d, .. }) => {
                let d: [u8; 32] = base64url_decode(&d)?
                    .try_into()
                    .map_err(|_| Error::Key("Ed25519 private key must be 32 bytes".to_owned()))?;
                InnerKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&d))
            }

            (KeyType::Rs256, PrivateJwk::Rsa { n, e, d, p, q, .. }) => {
                let key = rsa::RsaPrivateKey::from_components(
                    biguint(&n)?,
                    biguint(&e)?,
                    biguint(&d)?,
                    vec![biguint(&p)?, biguint(&q)?],
                )
                .map_err(|err| Error::Key(format!("invalid RSA private key: {err}")))?;
                InnerKey::Rs256(Box::new(key))
            }

            _ => {
                return Err(Error::Key(
                    "key type tag does not match the JWK contents".to_owned(),
                ))
            }
        };

        Ok(AcmeKey {
            key,
            key_type,
            key_id: kid,
        })
    }
}

impl Default for AcmeKey {
    fn default() -> Self {
        AcmeKey::new()
    }
}

impl From<p256::ecdsa::SigningKey> for AcmeKey {
    fn from(key: p256::ecdsa::SigningKey) -> Self {
        AcmeKey {
            key: InnerKey::Ec256(key),
            key_type: KeyType::Ec256,
            key_id: None,
        }
    }
}

/// Serialized key format.
#[derive(Serialize, Deserialize)]
struct KeyJson {
    key: PrivateJwk,
    kid: Option<String>,
    #[serde(rename = "type")]
    key_type: KeyType,
}

// Untagged dispatch works on member sets: RSA by `n`, EC by `y`,
// Ed25519 otherwise.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PrivateJwk {
    Rsa {
        kty: String,
        n: String,
        e: String,
        d: String,
        p: String,
        q: String,
    },
    Ec {
        kty: String,
        crv: String,
        x: String,
        y: String,
        d: String,
    },
    Okp {
        kty: String,
        crv: String,
        x: String,
        d: String,
    },
}

fn base64url<T: AsRef<[u8]>>(input: T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

fn base64url_decode(input: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|err| Error::Key(format!("invalid base64url in JWK: {err}")))
}

fn biguint(input: &str) -> Result<rsa::BigUint> {
    Ok(rsa::BigUint::from_bytes_be(&base64url_decode(input)?))
}
