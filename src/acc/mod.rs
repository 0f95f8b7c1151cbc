use std::{collections::HashSet, iter, sync::Arc};

use zeroize::Zeroizing;

use crate::{
    api::{self, OrderBuilder, RevocationBuilder},
    error::Result,
    jws::JwsProtectedHeader,
    order::{NewOrder, Order},
    req,
    trans::{self, Transport},
};

mod acme_key;

pub use self::acme_key::{AcmeKey, KeyType};

#[derive(Debug, Clone)]
pub(crate) struct AccountInner {
    pub transport: Transport,
    pub kid: String,
    pub api_account: api::Account,
    pub api_directory: api::Directory,
}

/// Account with an ACME provider.
///
/// Created through [`Directory::register_account()`] (or one of its
/// convenience wrappers); holds the signing key bound to the
/// server-assigned account URL plus a snapshot of the account object.
///
/// The façade is a cheap `Arc` clone and safe to share across tasks.
///
/// [`Directory::register_account()`]: crate::Directory::register_account()
#[derive(Debug, Clone)]
pub struct Account {
    inner: Arc<AccountInner>,
}

impl Account {
    pub(crate) fn new(
        transport: Transport,
        kid: String,
        api_account: api::Account,
        api_directory: api::Directory,
    ) -> Self {
        Self {
            inner: Arc::new(AccountInner {
                transport,
                kid,
                api_account,
                api_directory,
            }),
        }
    }

    /// Account URL assigned by the server. Doubles as the JWS key ID.
    pub fn url(&self) -> &str {
        &self.inner.kid
    }

    /// The signing key bound to this account.
    pub fn acme_key(&self) -> &AcmeKey {
        self.inner.transport.acme_key()
    }

    /// Serialized account key (private JWK, key ID and algorithm tag)
    /// for persistence. Restore with
    /// [`Directory::account_from_json`][crate::Directory::account_from_json].
    pub fn key_json(&self) -> Result<Zeroizing<String>> {
        self.acme_key().to_json()
    }

    /// Returns the account snapshot taken when this façade was created.
    pub fn api_account(&self) -> &api::Account {
        &self.inner.api_account
    }

    /// Fetch the current account object (POST-as-GET of the account
    /// URL).
    pub async fn fetch(&self) -> Result<api::Account> {
        let res = self
            .inner
            .transport
            .call(&self.inner.kid, &api::EmptyString)
            .await?;
        res.json()
    }

    /// Deactivate this account permanently.
    ///
    /// The server rejects all further requests signed with its key,
    /// except POST-as-GET reads of existing resources.
    pub async fn deactivate(&self) -> Result<api::Account> {
        let res = self
            .inner
            .transport
            .call(&self.inner.kid, &api::StatusUpdate::deactivated())
            .await?;
        res.json()
    }

    /// Roll the account over to `new_key` (RFC 8555 §7.3.5).
    ///
    /// The inner JWS carries the account URL and the retiring public key
    /// and is signed by `new_key`; the outer envelope is signed by the
    /// current account key. Passing both proves simultaneous possession.
    ///
    /// Returns a new façade bound to `new_key` under the unchanged
    /// account URL. This façade keeps signing with the retired key and
    /// should be dropped.
    pub async fn rotate_key(&self, new_key: AcmeKey) -> Result<Account> {
        let url = self.inner.api_directory.key_change.clone();

        let key_change = api::KeyChange {
            account: self.inner.kid.clone(),
            old_key: self.acme_key().to_public_jwk(),
        };

        // Inner signature: new key, embedded jwk, no nonce.
        let protected =
            JwsProtectedHeader::new_jwk(new_key.alg(), new_key.to_public_jwk(), &url, None);
        let inner_jws = trans::sign_jws(&protected, &new_key, &key_change)?;

        let res = self.inner.transport.call(&url, &inner_jws).await?;

        // Servers answer with the account object; tolerate an empty body.
        let api_account = if res.body().is_empty() {
            self.inner.api_account.clone()
        } else {
            res.json()?
        };

        let transport = self
            .inner
            .transport
            .with_key(new_key.update_kid(&self.inner.kid));

        Ok(Account::new(
            transport,
            self.inner.kid.clone(),
            api_account,
            self.inner.api_directory.clone(),
        ))
    }

    /// Create a new order for a certificate with the given identifiers
    /// and options.
    pub async fn submit_order(&self, order: OrderBuilder) -> Result<NewOrder> {
        let payload = order.to_wire()?;

        let new_order_url = self.inner.api_directory.new_order.as_str();

        let res = self.inner.transport.call(new_order_url, &payload).await?;
        let order_url = req::expect_header(&res, "location")?;
        let api_order: api::Order = res.json()?;

        // Keep the caller's identifier order; servers are allowed to
        // reshuffle and the first identifier becomes the CSR's CN.
        let mut order = Order::new(
            &self.inner,
            api::Order::from_identifiers(payload.identifiers),
            order_url,
        );
        order.api_order.overwrite(api_order)?;

        Ok(NewOrder::new(order))
    }

    /// Create a new order from a primary name and alt names.
    ///
    /// The primary name becomes the certificate's `CN`; duplicates are
    /// weeded out. The number of alt names is limited only by the ACME
    /// provider (Let's Encrypt caps a certificate at [100 names]).
    ///
    /// Every call creates a new order with the ACME API provider, even
    /// when the domain names supplied are exactly the same.
    ///
    /// [100 names]: https://letsencrypt.org/docs/rate-limits/
    pub async fn new_order(&self, primary_name: &str, alt_names: &[&str]) -> Result<NewOrder> {
        let mut builder = OrderBuilder::new();
        let mut dedup = HashSet::new();
        for domain in iter::once(primary_name).chain(alt_names.iter().copied()) {
            if dedup.insert(domain) {
                builder = builder.add_dns_identifier(domain);
            }
        }

        self.submit_order(builder).await
    }

    /// Fetch an existing order by its URL (POST-as-GET).
    pub async fn fetch_order(&self, order_url: &str) -> Result<NewOrder> {
        let res = self
            .inner
            .transport
            .call(order_url, &api::EmptyString)
            .await?;
        let api_order: api::Order = res.json()?;

        Ok(NewOrder::new(Order::new(
            &self.inner,
            api_order,
            order_url.to_owned(),
        )))
    }

    /// Revoke a certificate using this account's key.
    pub async fn revoke_certificate(&self, revocation: RevocationBuilder) -> Result<()> {
        let url = &self.inner.api_directory.revoke_cert;
        self.inner
            .transport
            .call(url, &revocation.to_wire())
            .await?;

        Ok(())
    }
}

/// Revocation reasons addressable by name.
///
/// The discriminants are the [RFC 5280 §5.3.1] reason codes; other
/// registry codes can be passed numerically through
/// [`RevocationBuilder::reason_code`].
///
/// [RFC 5280 §5.3.1]: https://tools.ietf.org/html/rfc5280#section-5.3.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
}
