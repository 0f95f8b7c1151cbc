use std::{collections::HashMap, sync::Arc};

use crate::{
    acc::{Account, AcmeKey},
    api::{self, RegistrationBuilder, RevocationBuilder},
    config::Config,
    error::{Error, Result},
    req::{self, HttpClient},
    trans::{NonceCell, Transport},
};

const LETSENCRYPT_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
const ZEROSSL_URL: &str = "https://acme.zerossl.com/v2/DV90";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid"
    /// certificates. The root signing certificate is not supposed to be
    /// in any trust chains.
    LetsEncryptStaging,

    /// The ZeroSSL production directory.
    ///
    /// ZeroSSL requires an external account binding on registration.
    ZeroSsl,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    pub(crate) fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::ZeroSsl => ZEROSSL_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Entry point for accessing an ACME API.
///
/// Owns the parsed directory document, the HTTP handle and the replay
/// nonce cache. Cheap to clone and safe to share across tasks; the
/// directory document is immutable after the fetch.
#[derive(Clone)]
pub struct Directory {
    http: HttpClient,
    nonce_cell: Arc<NonceCell>,
    directory_url: String,
    api_directory: api::Directory,
}

impl Directory {
    /// Fetch and parse the directory document using a default HTTP
    /// client.
    pub async fn fetch(url: DirectoryUrl<'_>) -> Result<Directory> {
        Self::fetch_with_config(Config::new(url)).await
    }

    /// Fetch and parse the directory document with explicit
    /// configuration.
    ///
    /// Failure to fetch or parse is fatal: no handle is produced.
    pub async fn fetch_with_config(config: Config<'_>) -> Result<Directory> {
        let agent = match &config.http_client {
            Some(client) => client.clone(),
            None => HttpClient::default_agent()?,
        };
        let http = HttpClient::new(agent, config.user_agent_string());

        let directory_url = config.directory_url.to_url().to_owned();
        let res = req::handle_error(http.get(&directory_url).await?)?;
        let api_directory: api::Directory = res.json()?;

        let nonce_cell = Arc::new(NonceCell::new(http.clone(), &api_directory.new_nonce));

        Ok(Directory {
            http,
            nonce_cell,
            directory_url,
            api_directory,
        })
    }

    /// The URL this directory was loaded from, after alias resolution.
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// Returns a reference to the directory's API object.
    pub fn api_directory(&self) -> &api::Directory {
        &self.api_directory
    }

    /// Terms-of-service URL advertised in the directory `meta`.
    pub fn terms_of_service(&self) -> Option<&str> {
        self.api_directory
            .meta
            .as_ref()
            .and_then(|meta| meta.terms_of_service.as_deref())
    }

    /// Certificate profiles advertised in the directory `meta`, mapping
    /// name to description. Both are opaque strings.
    pub fn profiles(&self) -> Option<&HashMap<String, String>> {
        self.api_directory
            .meta
            .as_ref()
            .and_then(|meta| meta.profiles.as_ref())
    }

    /// Whether the CA requires an external account binding on
    /// registration. Defaults to false when the meta field is absent.
    pub fn external_account_required(&self) -> bool {
        self.api_directory
            .meta
            .as_ref()
            .map(api::DirectoryMeta::external_account_required)
            .unwrap_or(false)
    }

    /// Register an account with the given key.
    ///
    /// The spec says an already-registered key gets a 200 with the
    /// existing account's `Location`, so this doubles as a lookup for
    /// known keys. The returned façade's key carries the server-assigned
    /// key ID.
    pub async fn register_account(
        &self,
        registration: RegistrationBuilder,
        acme_key: AcmeKey,
    ) -> Result<Account> {
        let url = self.api_directory.new_account.clone();
        let payload = registration.to_wire(&acme_key, &url)?;

        let transport = Transport::new(self.http.clone(), Arc::clone(&self.nonce_cell), acme_key);
        let res = transport.call_jwk(&url, &payload).await?;

        let kid = req::expect_header(&res, "location")?;
        log::debug!("account key ID is: {kid}");
        let api_account: api::Account = res.json()?;

        let transport = transport.with_key(transport.acme_key().update_kid(&*kid));

        Ok(Account::new(
            transport,
            kid,
            api_account,
            self.api_directory.clone(),
        ))
    }

    /// Generate a fresh default key and register it, agreeing to the
    /// terms of service.
    pub async fn register_account_with_contact(
        &self,
        contact: Option<Vec<String>>,
    ) -> Result<Account> {
        let mut registration = RegistrationBuilder::new().agree_to_terms();
        for uri in contact.into_iter().flatten() {
            registration = registration.contact(uri);
        }

        self.register_account(registration, AcmeKey::new()).await
    }

    /// Look up the existing account for `acme_key` without creating one
    /// (`onlyReturnExisting`).
    pub async fn load_existing_account(&self, acme_key: AcmeKey) -> Result<Account> {
        self.register_account(
            RegistrationBuilder::new().only_return_existing(),
            acme_key,
        )
        .await
    }

    /// Restore an account from the JSON produced by
    /// [`Account::key_json`][crate::Account::key_json].
    ///
    /// The serialized key must carry its key ID; the account object is
    /// refreshed with a POST-as-GET against the account URL.
    pub async fn account_from_json(&self, json: &str) -> Result<Account> {
        let acme_key = AcmeKey::from_json(json)?;
        let Some(kid) = acme_key.key_id().map(str::to_owned) else {
            return Err(Error::Key(
                "serialized key carries no key ID; use load_existing_account".to_owned(),
            ));
        };

        let transport = Transport::new(self.http.clone(), Arc::clone(&self.nonce_cell), acme_key);
        let res = transport.call(&kid, &api::EmptyString).await?;
        let api_account: api::Account = res.json()?;

        Ok(Account::new(
            transport,
            kid,
            api_account,
            self.api_directory.clone(),
        ))
    }

    /// Revoke a certificate signing with the certificate's own key pair
    /// instead of an account key (RFC 8555 §7.6).
    pub async fn revoke_certificate_by_key(
        &self,
        cert_key: impl Into<AcmeKey>,
        revocation: RevocationBuilder,
    ) -> Result<()> {
        let transport = Transport::new(
            self.http.clone(),
            Arc::clone(&self.nonce_cell),
            cert_key.into(),
        );

        let url = &self.api_directory.revoke_cert;
        transport.call_jwk(url, &revocation.to_wire()).await?;

        Ok(())
    }
}
