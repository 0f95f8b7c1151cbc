//! Order life cycle.
//!
//! An order goes through a life cycle of different states that require
//! various actions by the user. To ensure the user only use appropriate
//! actions, this library have simple façade structs that wraps the
//! actual [`api::Order`].
//!
//! 1. First prove ownership:
//!    * [`NewOrder`] -> [`Auth`]* -> [`Challenge`]
//! 2. Then submit CSR and download the cert.
//!    * [`NewOrder`] -> [`CsrOrder`] -> [`CertOrder`]
//!
//! \* Possibly multiple auths.
//!
//! No façade method sleeps or loops. Where the server needs time
//! (pending authorizations, `processing` orders), the call returns the
//! latest snapshot and the caller decides when to `refresh()` again —
//! the server's pacing hint arrives as
//! [`Error::RetryAfter`][crate::Error::RetryAfter].

use std::sync::Arc;

use base64::prelude::*;
use der::Encode as _;
use pkcs8::EncodePrivateKey as _;

use crate::{
    acc::AccountInner,
    api,
    cert::{create_csr, Certificate},
    error::{Error, Result},
    req,
};

mod auth;

pub use self::auth::{Auth, Challenge, Dns, Http, TlsAlpn};

/// The order wrapped with an outer façade.
#[derive(Debug)]
pub(crate) struct Order {
    acc: Arc<AccountInner>,
    pub(crate) api_order: api::Order,
    url: String,
}

impl Order {
    pub(crate) fn new(acc: &Arc<AccountInner>, api_order: api::Order, url: String) -> Self {
        Order {
            acc: Arc::clone(acc),
            api_order,
            url,
        }
    }
}

/// POST-as-GET of an order URL.
async fn fetch_order(acc: &Arc<AccountInner>, url: &str) -> Result<api::Order> {
    let res = acc.transport.call(url, &api::EmptyString).await?;
    res.json()
}

/// A new order created by [`Account::new_order()`] or
/// [`Account::submit_order()`].
///
/// An order is created using one or many domains (a primary `CN` and
/// possibly multiple alt names). All domains in the order must have
/// authorizations ([confirmed ownership]) before the order can progress
/// to submitting a [CSR].
///
/// This order façade provides calls to provide such authorizations and
/// to progress the order when ready.
///
/// The ACME API provider might "remember" for a time that you already
/// own a domain, which means you might not need to prove the ownership
/// every time. Use appropriate methods to first check whether you really
/// need to handle authorizations.
///
/// [`Account::new_order()`]: crate::Account::new_order()
/// [`Account::submit_order()`]: crate::Account::submit_order()
/// [confirmed ownership]: ../index.html#domain-ownership
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
#[derive(Debug)]
pub struct NewOrder {
    pub(crate) order: Order,
}

impl NewOrder {
    pub(crate) fn new(order: Order) -> Self {
        NewOrder { order }
    }

    /// URL of this order on the server.
    ///
    /// This stays the canonical handle for refreshes even when later
    /// responses carry diverging `Location` headers.
    pub fn url(&self) -> &str {
        &self.order.url
    }

    /// Tell if the domains in this order have been authorized.
    ///
    /// This doesn't do any calls against the API. You must manually call
    /// [`refresh`].
    ///
    /// In ACME API terms, the order can either be `ready` or `valid`,
    /// which both would mean we have passed the authorization stage.
    ///
    /// [`refresh`]: Self::refresh
    pub fn is_validated(&self) -> bool {
        self.order.api_order.status.is_some_and(|status| {
            matches!(status, api::OrderStatus::Ready | api::OrderStatus::Valid)
        })
    }

    /// If the order [is validated], progress it to a [`CsrOrder`].
    ///
    /// This doesn't do any calls against the API. You must manually call
    /// [`refresh`].
    ///
    /// [is validated]: Self::is_validated
    /// [`refresh`]: Self::refresh
    pub fn confirm_validations(&self) -> Option<CsrOrder> {
        if self.is_validated() {
            Some(CsrOrder {
                order: Order::new(
                    &self.order.acc,
                    self.order.api_order.clone(),
                    self.order.url.clone(),
                ),
            })
        } else {
            None
        }
    }

    /// Refresh the order state against the ACME API.
    ///
    /// The specification calls this a "POST-as-GET" against the order
    /// URL.
    pub async fn refresh(&mut self) -> Result<()> {
        let api_order = fetch_order(&self.order.acc, &self.order.url).await?;
        self.order.api_order.overwrite(api_order)?;
        Ok(())
    }

    /// Provide the authorizations. The number of authorizations will be
    /// the same as the number of domains requested, i.e. at least one
    /// (the primary CN), but possibly more (for alt names).
    ///
    /// If the order includes new domain names that have not been
    /// authorized before, this list might contain a mix of already valid
    /// and not yet valid auths.
    pub async fn authorizations(&self) -> Result<Vec<Auth>> {
        let mut result = vec![];
        if let Some(authorizations) = &self.order.api_order.authorizations {
            for auth_url in authorizations {
                let res = self
                    .order
                    .acc
                    .transport
                    .call(auth_url, &api::EmptyString)
                    .await?;
                let api_auth: api::Authorization = res.json()?;
                result.push(Auth::new(&self.order.acc, api_auth, auth_url));
            }
        }
        Ok(result)
    }

    /// Returns a reference to the order's API object.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

/// An order that is ready for a [CSR] submission.
///
/// Submitting the CSR is called "finalizing" the order.
///
/// To finalize, the user supplies a private key (from which a public key
/// is derived). This library provides [a function to create a P-256
/// private key](crate::create_p256_key()) but it can be created or
/// retrieved in some other way.
///
/// [CSR]: https://en.wikipedia.org/wiki/Certificate_signing_request
pub struct CsrOrder {
    pub(crate) order: Order,
}

impl CsrOrder {
    /// Finalize the order by submitting a CSR built from the order's
    /// domains (first domain as `CN`, all domains in the SAN extension).
    ///
    /// One round trip: the server's answer — usually a `processing`
    /// order — is captured in the returned [`CertOrder`], which the
    /// caller refreshes until issuance completes.
    pub async fn finalize(self, private_key: p256::ecdsa::SigningKey) -> Result<CertOrder> {
        let domains = self.order.api_order.domains();

        let csr = create_csr(&private_key, &domains)?;
        let csr_der = csr.to_der().map_err(|err| Error::Key(err.to_string()))?;
        let csr_b64 = BASE64_URL_SAFE_NO_PAD.encode(&csr_der);
        let finalize = api::Finalize::new(csr_b64);

        let finalize_url = &self.order.api_order.finalize;

        // If the CSR is invalid, a 4xx problem surfaces from this call.
        let res = self.order.acc.transport.call(finalize_url, &finalize).await?;

        // The finalize response carries the updated order object. The
        // order URL from creation stays canonical; a diverging Location
        // header here is ignored on purpose.
        let mut order = self.order;
        match res.json::<api::Order>() {
            Ok(api_order) => order.api_order.overwrite(api_order)?,
            // Some test servers answer finalize with an empty body; the
            // next refresh fills the snapshot in.
            Err(_) if res.body().is_empty() => {}
            Err(err) => return Err(err),
        }

        Ok(CertOrder {
            private_key,
            order,
        })
    }

    /// Returns a reference to the order's API object.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

/// Order for a certificate that is processing or ready to download.
pub struct CertOrder {
    private_key: p256::ecdsa::SigningKey,
    order: Order,
}

impl CertOrder {
    /// Refresh the order state against the ACME API.
    pub async fn refresh(&mut self) -> Result<()> {
        let api_order = fetch_order(&self.order.acc, &self.order.url).await?;
        self.order.api_order.overwrite(api_order)?;
        Ok(())
    }

    /// Whether issuance finished and the certificate can be downloaded.
    pub fn is_valid(&self) -> bool {
        matches!(self.order.api_order.status, Some(api::OrderStatus::Valid))
    }

    /// Request download of the issued certificate.
    ///
    /// Fails with [`Error::NotReady`] until a refresh has seen the order
    /// `valid` with a certificate URL.
    pub async fn download_cert(self) -> Result<Certificate> {
        if !self.is_valid() {
            return Err(Error::NotReady("order is not valid yet"));
        }

        let url = self
            .order
            .api_order
            .certificate
            .as_deref()
            .ok_or(Error::NotReady("order carries no certificate URL"))?;

        let res = self.order.acc.transport.call(url, &api::EmptyString).await?;

        if res.content_type() != req::PEM_CHAIN {
            log::debug!("certificate endpoint content-type: {}", res.content_type());
        }
        let certificate = res.body_string();

        let private_key_pem = self
            .private_key
            .to_pkcs8_pem(der::pem::LineEnding::LF)
            .map_err(|err| Error::Key(err.to_string()))?;

        Ok(Certificate::new(private_key_pem, certificate))
    }

    /// Returns a reference to the order's API object.
    pub fn api_order(&self) -> &api::Order {
        &self.order.api_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cert, Directory, DirectoryUrl};

    #[tokio::test]
    async fn test_get_authorizations() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir
            .register_account_with_contact(Some(vec!["mailto:foo@bar.com".to_owned()]))
            .await
            .unwrap();
        let ord = acc.new_order("acme-test.example.com", &[]).await.unwrap();

        let authorizations = ord.authorizations().await.unwrap();
        assert_eq!(authorizations.len(), 1);
        assert_eq!(authorizations[0].domain_name(), "acme-test.example.com");
    }

    #[tokio::test]
    async fn test_refresh_reaches_ready() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let mut ord = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        assert!(!ord.is_validated());
        assert!(ord.confirm_validations().is_none());

        ord.refresh().await.unwrap();
        assert!(ord.is_validated());
        assert!(ord.confirm_validations().is_some());
    }

    #[tokio::test]
    async fn test_finalize_and_download() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let mut ord = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        ord.refresh().await.unwrap();
        let ord = ord.confirm_validations().unwrap();

        let private_key = cert::create_p256_key();
        let ord = ord.finalize(private_key).await.unwrap();
        assert!(ord.is_valid());

        let cert = ord.download_cert().await.unwrap();
        assert_eq!(cert.certificate(), "CERT HERE");
        assert!(!cert.private_key().is_empty());
    }

    #[tokio::test]
    async fn test_download_before_valid_is_rejected() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let ord = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        let ord = CertOrder {
            private_key: cert::create_p256_key(),
            order: ord.order,
        };

        assert!(matches!(
            ord.download_cert().await,
            Err(Error::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_order_by_url() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let ord = acc.new_order("acme-test.example.com", &[]).await.unwrap();
        let fetched = acc.fetch_order(ord.url()).await.unwrap();

        assert_eq!(fetched.url(), ord.url());
        assert_eq!(fetched.api_order().domains(), ord.api_order().domains());
    }

    #[tokio::test]
    async fn test_wildcard_order() {
        let server = crate::test::with_directory_server();
        let url = DirectoryUrl::Other(&server.dir_url);
        let dir = Directory::fetch(url).await.unwrap();
        let acc = dir.register_account_with_contact(None).await.unwrap();

        let ord = acc.new_order("*.example.com", &[]).await.unwrap();
        assert_eq!(ord.api_order().status, Some(api::OrderStatus::Pending));

        let authorizations = ord.authorizations().await.unwrap();
        assert!(authorizations[0].api_auth().is_wildcard());
        assert_eq!(authorizations[0].domain_name(), "example.com");
    }
}
