use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    acc::RevocationReason,
    cert::{self, Certificate},
    error::{Error, Result},
};

/// Certificate revocation payload.
///
/// See [RFC 8555 §7.6].
///
/// [RFC 8555 §7.6]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.6
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Revocation {
    /// The certificate to be revoked, in the base64url-encoded version
    /// of the DER format.
    ///
    /// Note: not PEM, since headers are omitted.
    pub(crate) certificate: String,

    /// One of the revocation reasonCodes defined in [RFC 5280 §5.3.1].
    ///
    /// [RFC 5280 §5.3.1]: https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reason: Option<usize>,
}

/// Accumulates a certificate and an optional reason for a revokeCert
/// request.
///
/// The certificate is accepted as raw DER, as PEM (parsed at ingest), or
/// as an issued [`Certificate`].
#[derive(Debug, Clone)]
pub struct RevocationBuilder {
    der: Vec<u8>,
    reason: Option<usize>,
}

impl RevocationBuilder {
    /// From a DER-encoded certificate.
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        RevocationBuilder {
            der: der.into(),
            reason: None,
        }
    }

    /// From a PEM-encoded certificate (the first CERTIFICATE block).
    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self::from_der(cert::pem_to_der(pem)?))
    }

    /// From an issued certificate (its end-entity entry).
    pub fn from_certificate(certificate: &Certificate) -> Result<Self> {
        Ok(Self::from_der(certificate.end_entity_der()?))
    }

    /// Set the revocation reason by name.
    pub fn reason(mut self, reason: RevocationReason) -> Self {
        self.reason = Some(reason as usize);
        self
    }

    /// Set the revocation reason by raw RFC 5280 code.
    ///
    /// Fails with [`Error::InvalidReasonCode`] for values outside the
    /// registry (`7` is unassigned, codes stop at `10`).
    pub fn reason_code(mut self, code: usize) -> Result<Self> {
        if !matches!(code, 0..=6 | 8..=10) {
            return Err(Error::InvalidReasonCode(code));
        }
        self.reason = Some(code);
        Ok(self)
    }

    pub(crate) fn to_wire(&self) -> Revocation {
        // > the reason code CRL entry extension SHOULD be absent instead of
        // > using the unspecified (0) reasonCode value
        // see <https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1>
        let reason = self.reason.filter(|&code| code != 0);

        Revocation {
            certificate: BASE64_URL_SAFE_NO_PAD.encode(&self.der),
            reason,
        }
    }
}
