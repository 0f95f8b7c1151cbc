//! Provisioning certificates from ACME (Automatic Certificate Management Environment) providers
//! such as [Let's Encrypt](https://letsencrypt.org/).
//!
//! Follows the [RFC 8555](https://datatracker.ietf.org/doc/html/rfc8555) spec, using ACME v2 to
//! register accounts and issue, renew and revoke certificates. Covers the full account life cycle:
//! registration (with optional external account binding), key rotation, deactivation, orders,
//! challenge authorizations, CSR finalization, certificate download and revocation.
//!
//! # Usage
//!
//! Fetch a [`Directory`], register an [`Account`], submit an order, prove domain ownership, then
//! finalize with a CSR and download the certificate chain:
//!
//! ```no_run
//! use acme_core::{Directory, DirectoryUrl, OrderBuilder, RegistrationBuilder, AcmeKey};
//!
//! # async fn issue() -> acme_core::Result<()> {
//! let dir = Directory::fetch(DirectoryUrl::LetsEncryptStaging).await?;
//!
//! let account = dir
//!     .register_account(
//!         RegistrationBuilder::new()
//!             .contact("mailto:admin@example.com")
//!             .agree_to_terms(),
//!         AcmeKey::new(),
//!     )
//!     .await?;
//!
//! let mut order = account
//!     .submit_order(OrderBuilder::new().add_dns_identifier("example.com"))
//!     .await?;
//!
//! for auth in order.authorizations().await? {
//!     let challenge = auth.dns_challenge().expect("server offers dns-01");
//!     let _txt_value = challenge.dns_proof()?;
//!     // ... install the TXT record, then:
//!     challenge.trigger().await?;
//! }
//!
//! // Poll until the authorizations validate. The client never sleeps on
//! // its own; pace the loop with the `Error::RetryAfter` hints.
//! order.refresh().await?;
//! if let Some(csr_order) = order.confirm_validations() {
//!     let cert_key = acme_core::create_p256_key();
//!     let mut cert_order = csr_order.finalize(cert_key).await?;
//!     cert_order.refresh().await?;
//!     let cert = cert_order.download_cert().await?;
//!     println!("{}", cert.certificate());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Domain Ownership
//!
//! Most website TLS certificates tries to prove ownership/control over the domain they are issued
//! for. For ACME, this means proving you control either:
//!
//! - a server answering TLS or HTTP requests for that domain;
//! - the DNS server answering name lookups against the domain.
//!
//! To use this library, there are points in the flow where you would need to modify either the web
//! server or DNS server before progressing to get the certificate.
//!
//! See [`tls_alpn_challenge`], [`http_challenge`], and [`dns_challenge`].
//!
//! ## Multiple Domains
//!
//! When creating a new order, it's possible to provide multiple alt-names that will also be part of
//! the certificate. The ACME API requires you to prove ownership of each such domain. See
//! [`authorizations`].
//!
//! # Polling
//!
//! Validation and issuance are asynchronous on the server side. This library performs exactly one
//! round trip per call and never sleeps; waiting for an order or authorization to progress is the
//! caller's loop. When the server paces clients it answers with `Retry-After`, surfaced here as
//! [`Error::RetryAfter`] carrying whole seconds ([`parse_retry_after`] is the underlying parser).
//!
//! # Rate Limits
//!
//! The ACME API provider Let's Encrypt uses [rate limits] to ensure the API is not being abused. It
//! might be tempting to poll aggressively, but balance this against the real risk of having access
//! cut off.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [`http_challenge`]: crate::order::Auth::http_challenge()
//! [`tls_alpn_challenge`]: crate::order::Auth::tls_alpn_challenge()
//! [`dns_challenge`]: crate::order::Auth::dns_challenge()
//! [`authorizations`]: crate::order::NewOrder::authorizations()
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod acc;
mod cert;
mod config;
mod dir;
mod error;
mod jws;
mod req;
mod retry;
mod trans;

pub mod api;
pub mod order;

#[cfg(test)]
mod test;

pub use crate::{
    acc::{Account, AcmeKey, KeyType, RevocationReason},
    api::{OrderBuilder, RegistrationBuilder, RevocationBuilder},
    cert::{create_p256_key, Certificate},
    config::Config,
    dir::{Directory, DirectoryUrl},
    error::{Error, Result},
    retry::parse_retry_after,
};
