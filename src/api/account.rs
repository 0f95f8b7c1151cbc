use serde::{Deserialize, Serialize};

use crate::{
    acc::AcmeKey,
    error::Result,
    jws::{self, FlattenedJws},
};

/// The status of an [`Account`].
///
/// See [RFC 8555 §7.1.2].
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Valid,
    Deactivated,
    Revoked,
}

/// An ACME account resource.
///
/// Represents a set of metadata associated with an account.
///
/// See [RFC 8555 §7.1.2].
///
/// # Example JSON
///
/// ```json
/// {
///   "status": "valid",
///   "contact": [
///     "mailto:cert-admin@example.com",
///     "mailto:admin@example.com"
///   ],
///   "termsOfServiceAgreed": true,
///   "orders": "https://example.com/acme/acct/evOfKhNU60wg/orders"
/// }
/// ```
///
/// [RFC 8555 §7.1.2]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.2
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    /// The external account binding this account was registered with,
    /// echoed back by the server. Kept freeform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_account_binding: Option<serde_json::Value>,

    /// URL from which the account's order list can be fetched via
    /// POST-as-GET.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orders: Option<String>,
}

impl Account {
    pub fn is_status_valid(&self) -> bool {
        self.status == Some(AccountStatus::Valid)
    }

    pub fn is_status_deactivated(&self) -> bool {
        self.status == Some(AccountStatus::Deactivated)
    }

    pub fn is_status_revoked(&self) -> bool {
        self.status == Some(AccountStatus::Revoked)
    }

    pub fn terms_of_service_agreed(&self) -> bool {
        self.terms_of_service_agreed.unwrap_or(false)
    }
}

/// Payload for newAccount requests (RFC 8555 §7.3).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) contact: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) terms_of_service_agreed: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) only_return_existing: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) external_account_binding: Option<FlattenedJws>,
}

/// Account status update payload (deactivation, RFC 8555 §7.3.6).
#[derive(Debug, Clone, Serialize)]
pub(crate) struct StatusUpdate {
    status: AccountStatus,
}

impl StatusUpdate {
    pub(crate) fn deactivated() -> Self {
        StatusUpdate {
            status: AccountStatus::Deactivated,
        }
    }
}

/// Accumulates the fields of a registration request.
///
/// ```no_run
/// use acme_core::RegistrationBuilder;
///
/// let registration = RegistrationBuilder::new()
///     .contact("mailto:admin@example.com")
///     .agree_to_terms();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegistrationBuilder {
    contact: Vec<String>,
    terms_of_service_agreed: bool,
    only_return_existing: bool,
    eab: Option<(String, String)>,
}

impl RegistrationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contact URI (e.g. `mailto:admin@example.com`).
    pub fn contact(mut self, uri: impl Into<String>) -> Self {
        self.contact.push(uri.into());
        self
    }

    /// Agree to the CA's terms of service. Idempotent.
    pub fn agree_to_terms(mut self) -> Self {
        self.terms_of_service_agreed = true;
        self
    }

    /// Only look up an existing account for this key, never create one.
    pub fn only_return_existing(mut self) -> Self {
        self.only_return_existing = true;
        self
    }

    /// Bind the registration to an external CA account.
    ///
    /// Both values are issued out of band by the CA: `kid` identifies
    /// the external account and `mac_key` is its base64url-encoded
    /// HMAC-SHA-256 key.
    pub fn external_account_binding(
        mut self,
        kid: impl Into<String>,
        mac_key: impl Into<String>,
    ) -> Self {
        self.eab = Some((kid.into(), mac_key.into()));
        self
    }

    /// Wire payload for newAccount, with the external account binding
    /// signed over `acme_key`'s public JWK.
    pub(crate) fn to_wire(&self, acme_key: &AcmeKey, new_account_url: &str) -> Result<NewAccount> {
        let external_account_binding = match &self.eab {
            Some((kid, mac_key)) => Some(jws::external_account_binding(
                kid,
                mac_key,
                &acme_key.to_public_jwk(),
                new_account_url,
            )?),
            None => None,
        };

        Ok(NewAccount {
            contact: (!self.contact.is_empty()).then(|| self.contact.clone()),
            terms_of_service_agreed: self.terms_of_service_agreed.then_some(true),
            only_return_existing: self.only_return_existing.then_some(true),
            external_account_binding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agree_to_terms_is_idempotent() {
        let builder = RegistrationBuilder::new().agree_to_terms().agree_to_terms();
        let key = AcmeKey::new();
        let wire = builder.to_wire(&key, "https://example.com/new-acct").unwrap();
        assert_eq!(wire.terms_of_service_agreed, Some(true));
    }

    #[test]
    fn test_unset_flags_are_omitted() {
        let key = AcmeKey::new();
        let wire = RegistrationBuilder::new()
            .to_wire(&key, "https://example.com/new-acct")
            .unwrap();

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_wire_keys_are_camel_case() {
        let key = AcmeKey::new();
        let wire = RegistrationBuilder::new()
            .contact("mailto:admin@example.com")
            .agree_to_terms()
            .only_return_existing()
            .to_wire(&key, "https://example.com/new-acct")
            .unwrap();

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["termsOfServiceAgreed"], true);
        assert_eq!(json["onlyReturnExisting"], true);
        assert_eq!(json["contact"][0], "mailto:admin@example.com");
    }

    #[test]
    fn test_external_account_binding_is_embedded() {
        use base64::prelude::*;

        let key = AcmeKey::new();
        let mac_key = BASE64_URL_SAFE_NO_PAD.encode(b"shared-secret");
        let wire = RegistrationBuilder::new()
            .agree_to_terms()
            .external_account_binding("eab-kid-7", mac_key)
            .to_wire(&key, "https://example.com/new-acct")
            .unwrap();

        let json = serde_json::to_value(&wire).unwrap();
        let eab = &json["externalAccountBinding"];
        assert!(eab["protected"].is_string());
        assert!(eab["payload"].is_string());
        assert!(eab["signature"].is_string());
    }
}
