//! JSON API payloads, resource snapshots and request builders.
//!
//! Resource structs mirror the server's JSON; the server remains the
//! source of truth and the structs are snapshots owned by the caller.

use std::fmt;

use serde::{
    ser::{SerializeMap as _, Serializer},
    Deserialize, Serialize,
};

mod account;
mod authorization;
mod challenge;
mod directory;
mod finalize;
mod identifier;
mod key_change;
mod order;
mod revocation;

pub use self::{
    account::{Account, AccountStatus, RegistrationBuilder},
    authorization::{Authorization, AuthorizationStatus},
    challenge::{Challenge, ChallengeStatus},
    directory::{Directory, DirectoryMeta},
    identifier::Identifier,
    order::{Order, OrderBuilder, OrderStatus},
    revocation::RevocationBuilder,
};

pub(crate) use self::{
    account::{NewAccount, StatusUpdate},
    finalize::Finalize,
    key_change::KeyChange,
    order::NewOrderPayload,
    revocation::Revocation,
};

/// Marker in decode-error messages for malformed server timestamps.
pub(crate) const INVALID_TIMESTAMP: &str = "invalid RFC 3339 timestamp";

/// Optional RFC 3339 timestamps, decoded to absolute instants.
///
/// An absent field stays `None`; a malformed value fails the whole
/// decode.
pub(crate) mod rfc3339_opt {
    use serde::{de, Deserialize as _, Deserializer, Serializer};
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    pub(crate) fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(instant) => {
                let formatted = instant.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&formatted)
            }
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) => OffsetDateTime::parse(&raw, &Rfc3339).map(Some).map_err(|err| {
                de::Error::custom(format!("{} {raw:?}: {err}", super::INVALID_TIMESTAMP))
            }),
        }
    }
}

/// Serializes to `""`, the POST-as-GET payload marker.
pub struct EmptyString;

impl Serialize for EmptyString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

/// Serializes to `{}`, the challenge-trigger payload.
pub struct EmptyObject;

impl Serialize for EmptyObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_map(Some(0))?.end()
    }
}

/// An RFC 7807 problem document from an ACME error response.
///
/// Servers attach fields beyond the RFC 8555 set; those are preserved
/// verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subproblems: Option<Vec<Subproblem>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Problem {
    /// Returns true if the problem type is `badNonce`.
    ///
    /// Public CAs emit the full urn; some test servers the bare token.
    pub fn is_bad_nonce(&self) -> bool {
        matches!(
            self._type.as_str(),
            "badNonce" | "urn:ietf:params:acme:error:badNonce"
        )
    }

    /// Wraps a non-problem error body so callers always get a `Problem`.
    pub(crate) fn from_http(status: u16, body: String) -> Problem {
        Problem {
            _type: "httpReqError".to_owned(),
            detail: Some(format!("{status} body: {body}")),
            status: Some(status),
            ..Default::default()
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            None => write!(f, "{}", self._type),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subproblem {
    #[serde(rename = "type")]
    pub _type: String,
    pub detail: Option<String>,
    pub identifier: Option<Identifier>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_empty_string() {
        let x = serde_json::to_string(&EmptyString).unwrap();
        assert_eq!("\"\"", x);
    }

    #[test]
    fn test_api_empty_object() {
        let x = serde_json::to_string(&EmptyObject).unwrap();
        assert_eq!("{}", x);
    }

    #[test]
    fn test_problem_bad_nonce_forms() {
        let mut problem = Problem {
            _type: "urn:ietf:params:acme:error:badNonce".to_owned(),
            ..Default::default()
        };
        assert!(problem.is_bad_nonce());

        problem._type = "badNonce".to_owned();
        assert!(problem.is_bad_nonce());

        problem._type = "urn:ietf:params:acme:error:malformed".to_owned();
        assert!(!problem.is_bad_nonce());
    }

    #[test]
    fn test_problem_preserves_unknown_fields() {
        let raw = r#"{
            "type": "urn:ietf:params:acme:error:rateLimited",
            "detail": "too many requests",
            "status": 429,
            "instance": "https://example.com/doc/rate-limits"
        }"#;

        let problem: Problem = serde_json::from_str(raw).unwrap();
        assert_eq!(problem.status, Some(429));
        assert_eq!(
            problem.extra["instance"],
            "https://example.com/doc/rate-limits"
        );

        let round_trip = serde_json::to_value(&problem).unwrap();
        assert_eq!(
            round_trip["instance"],
            "https://example.com/doc/rate-limits"
        );
    }
}
