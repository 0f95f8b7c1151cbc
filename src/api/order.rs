use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    api,
    error::{Error, Result},
};

/// The status of an [`Order`].
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

/// An ACME order object.
///
/// Represents a client's request for a certificate and is used to track
/// the progress of that order through to issuance.
///
/// See [RFC 8555 §7.1.3].
///
/// [RFC 8555 §7.1.3]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.3
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "pending",
///   "expires": "2019-01-09T08:26:43.570360537Z",
///   "identifiers": [
///     {
///       "type": "dns",
///       "value": "acmetest.example.com"
///     }
///   ],
///   "authorizations": [
///     "https://example.com/acme/authz/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs"
///   ],
///   "finalize": "https://example.com/acme/finalize/7738992/18234324"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,

    /// The timestamp after which the server considers this order
    /// invalid.
    #[serde(default, with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub expires: Option<OffsetDateTime>,

    pub identifiers: Vec<api::Identifier>,

    /// Certificate profile this order was created under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Requested `notBefore` for the certificate.
    #[serde(default, with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub not_before: Option<OffsetDateTime>,

    /// Requested `notAfter` for the certificate.
    #[serde(default, with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub not_after: Option<OffsetDateTime>,

    /// The error that occurred while processing the order, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<api::Problem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorizations: Option<Vec<String>>,

    pub finalize: String,

    /// URL of the issued certificate, present once the order is `valid`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
}

impl Order {
    pub(crate) fn from_identifiers(identifiers: Vec<api::Identifier>) -> Self {
        Self {
            identifiers,
            ..Default::default()
        }
    }

    /// Returns all domains associated with this order.
    pub fn domains(&self) -> Vec<&str> {
        self.identifiers
            .iter()
            .map(|identifier| identifier.value.as_str())
            .collect()
    }

    // Let's Encrypt was observed to return domains in alternate order
    // which may flip primary with SAN(s).
    //
    // This overwrites self without changing the order of the domains.
    pub(crate) fn overwrite(&mut self, mut from_api: Self) -> Result<()> {
        // Make sure the lists are the same.
        if from_api.identifiers.len() != self.identifiers.len()
            || from_api
                .identifiers
                .iter()
                .any(|id| !self.identifiers.contains(id))
        {
            return Err(Error::IdentifierMismatch(format!(
                "had {:?} and got {:?}",
                self.identifiers, from_api.identifiers
            )));
        }

        // Then preserve the original order.
        from_api.identifiers = std::mem::take(&mut self.identifiers);
        *self = from_api;
        Ok(())
    }
}

/// Payload for newOrder requests (RFC 8555 §7.4).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewOrderPayload {
    pub(crate) identifiers: Vec<api::Identifier>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) profile: Option<String>,

    #[serde(with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub(crate) not_before: Option<OffsetDateTime>,

    #[serde(with = "api::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub(crate) not_after: Option<OffsetDateTime>,
}

/// Accumulates identifiers and options for a new order.
///
/// Duplicate identifiers are kept as given; deduplication is the
/// caller's concern.
///
/// ```no_run
/// use acme_core::OrderBuilder;
///
/// let order = OrderBuilder::new()
///     .add_dns_identifier("example.com")
///     .add_dns_identifier("*.example.com");
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrderBuilder {
    identifiers: Vec<api::Identifier>,
    profile: Option<String>,
    not_before: Option<OffsetDateTime>,
    not_after: Option<OffsetDateTime>,
}

impl OrderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `dns` identifier.
    pub fn add_dns_identifier(mut self, domain: impl AsRef<str>) -> Self {
        self.identifiers.push(api::Identifier::dns(domain.as_ref()));
        self
    }

    /// Append a sequence of `dns` identifiers.
    pub fn add_dns_identifiers<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for domain in domains {
            self.identifiers.push(api::Identifier::dns(domain.as_ref()));
        }
        self
    }

    /// Select a server certificate profile by name.
    ///
    /// Names come from the directory's `meta.profiles` and are not
    /// validated client-side.
    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile = Some(name.into());
        self
    }

    /// Request a `notBefore` for the certificate.
    pub fn not_before(mut self, instant: OffsetDateTime) -> Self {
        self.not_before = Some(instant);
        self
    }

    /// Request a `notAfter` for the certificate.
    pub fn not_after(mut self, instant: OffsetDateTime) -> Self {
        self.not_after = Some(instant);
        self
    }

    /// Wire payload for newOrder.
    ///
    /// Fails with [`Error::NoIdentifiers`] when nothing was added.
    pub(crate) fn to_wire(&self) -> Result<NewOrderPayload> {
        if self.identifiers.is_empty() {
            return Err(Error::NoIdentifiers);
        }

        Ok(NewOrderPayload {
            identifiers: self.identifiers.clone(),
            profile: self.profile.clone(),
            not_before: self.not_before,
            not_after: self.not_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn test_empty_builder_is_rejected() {
        assert!(matches!(
            OrderBuilder::new().to_wire(),
            Err(Error::NoIdentifiers)
        ));
    }

    #[test]
    fn test_duplicate_identifiers_are_preserved() {
        let wire = OrderBuilder::new()
            .add_dns_identifier("example.com")
            .add_dns_identifier("example.com")
            .to_wire()
            .unwrap();

        assert_eq!(wire.identifiers.len(), 2);
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let wire = OrderBuilder::new()
            .add_dns_identifiers(["example.com", "www.example.com"])
            .profile("shortlived")
            .not_before(datetime!(2026-01-01 00:00:00 UTC))
            .not_after(datetime!(2026-01-08 00:00:00 UTC))
            .to_wire()
            .unwrap();

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["identifiers"][0]["type"], "dns");
        assert_eq!(json["identifiers"][1]["value"], "www.example.com");
        assert_eq!(json["profile"], "shortlived");
        assert_eq!(json["notBefore"], "2026-01-01T00:00:00Z");
        assert_eq!(json["notAfter"], "2026-01-08T00:00:00Z");
    }

    #[test]
    fn test_unset_options_are_omitted() {
        let wire = OrderBuilder::new()
            .add_dns_identifier("example.com")
            .to_wire()
            .unwrap();

        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("profile").is_none());
        assert!(json.get("notBefore").is_none());
        assert!(json.get("notAfter").is_none());
    }

    #[test]
    fn test_order_decodes_timestamps() {
        let raw = r#"{
            "status": "pending",
            "expires": "2019-01-09T08:26:43.570360537Z",
            "identifiers": [{"type": "dns", "value": "example.com"}],
            "authorizations": ["https://example.com/acme/authz/1"],
            "finalize": "https://example.com/acme/finalize/1"
        }"#;

        let order: Order = serde_json::from_str(raw).unwrap();
        assert_eq!(order.status, Some(OrderStatus::Pending));
        let expires = order.expires.unwrap();
        assert_eq!(expires.year(), 2019);
    }

    #[test]
    fn test_malformed_timestamp_is_fatal() {
        let raw = r#"{
            "status": "pending",
            "expires": "tomorrow",
            "identifiers": [{"type": "dns", "value": "example.com"}],
            "finalize": "https://example.com/acme/finalize/1"
        }"#;

        let result = crate::req::decode_json::<Order>(raw.as_bytes());
        assert!(matches!(
            result,
            Err(crate::error::Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_overwrite_preserves_identifier_order() {
        let mut order = Order::from_identifiers(vec![
            api::Identifier::dns("example.com"),
            api::Identifier::dns("www.example.com"),
        ]);

        let refreshed = Order {
            status: Some(OrderStatus::Ready),
            identifiers: vec![
                api::Identifier::dns("www.example.com"),
                api::Identifier::dns("example.com"),
            ],
            finalize: "https://example.com/acme/finalize/1".to_owned(),
            ..Default::default()
        };

        order.overwrite(refreshed).unwrap();
        assert_eq!(order.status, Some(OrderStatus::Ready));
        assert_eq!(order.domains(), vec!["example.com", "www.example.com"]);
    }

    #[test]
    fn test_overwrite_rejects_changed_identifiers() {
        let mut order = Order::from_identifiers(vec![api::Identifier::dns("example.com")]);

        let refreshed = Order {
            identifiers: vec![api::Identifier::dns("other.example.com")],
            ..Default::default()
        };

        assert!(matches!(
            order.overwrite(refreshed),
            Err(Error::IdentifierMismatch(_))
        ));
    }
}
