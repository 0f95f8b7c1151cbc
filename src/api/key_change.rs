use serde::Serialize;

use crate::jws::Jwk;

/// Inner payload of a key rollover (RFC 8555 §7.3.5).
///
/// Signed by the *new* key; the resulting JWS becomes the outer payload
/// signed by the old account key. The pairing proves simultaneous
/// possession of both keys.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct KeyChange {
    /// URL of the account whose key is rolled over.
    pub(crate) account: String,

    /// Public JWK of the key being retired.
    pub(crate) old_key: Jwk,
}
