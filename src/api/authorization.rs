use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::api;

/// The status of an [`Authorization`].
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an
/// identifier.
///
/// See [RFC 8555 §7.1.4].
///
/// [RFC 8555 §7.1.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    /// The identifier this authorization covers.
    ///
    /// For wildcard authorizations the value is the base domain, with
    /// the `wildcard` flag set.
    pub identifier: api::Identifier,

    pub status: AuthorizationStatus,

    /// The timestamp after which the server considers this authorization
    /// invalid. Required for `valid` authorizations.
    #[serde(default, with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub expires: Option<OffsetDateTime>,

    /// The challenges the client can fulfill to prove possession of the
    /// identifier. Any single one is sufficient.
    ///
    /// For valid authorizations this holds the challenge that was
    /// validated; for invalid ones, the challenge that failed.
    pub challenges: Vec<api::Challenge>,

    /// Present and true for authorizations created from a wildcard DNS
    /// identifier; absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<bool>,
}

impl Authorization {
    /// Returns true if this authorization was created for a wildcard
    /// domain.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard.unwrap_or(false)
    }

    /// Returns an `http-01` challenge, if one is present.
    pub fn http_challenge(&self) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == "http-01")
    }

    /// Returns a `dns-01` challenge, if one is present.
    pub fn dns_challenge(&self) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == "dns-01")
    }

    /// Returns a `tls-alpn-01` challenge, if one is present.
    pub fn tls_alpn_challenge(&self) -> Option<&api::Challenge> {
        self.challenges.iter().find(|c| c._type == "tls-alpn-01")
    }
}
