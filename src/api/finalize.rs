use serde::{Deserialize, Serialize};

/// Order finalization payload carrying the signed CSR.
///
/// See [RFC 8555 §7.4].
///
/// [RFC 8555 §7.4]: https://datatracker.ietf.org/doc/html/rfc8555#section-7.4
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Finalize {
    /// Certificate Signing Request in base64url-encoded DER.
    ///
    /// Note: not PEM, since headers are omitted.
    pub(crate) csr: String,
}

impl Finalize {
    pub(crate) fn new(csr: String) -> Self {
        Self { csr }
    }
}
