use crate::dir::DirectoryUrl;

const BASE_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Client configuration.
///
/// ```no_run
/// use acme_core::{Config, Directory, DirectoryUrl};
///
/// # async fn configure() -> acme_core::Result<()> {
/// let config = Config::new(DirectoryUrl::LetsEncryptStaging)
///     .user_agent("my-provisioner")
///     .http_client(reqwest::Client::new());
///
/// let dir = Directory::fetch_with_config(config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Config<'a> {
    pub(crate) directory_url: DirectoryUrl<'a>,
    pub(crate) user_agent: Option<String>,
    pub(crate) http_client: Option<reqwest::Client>,
}

impl<'a> Config<'a> {
    pub fn new(directory_url: DirectoryUrl<'a>) -> Self {
        Config {
            directory_url,
            user_agent: None,
            http_client: None,
        }
    }

    /// Prefix prepended to this crate's `name/version` User-Agent.
    pub fn user_agent(mut self, prefix: impl Into<String>) -> Self {
        self.user_agent = Some(prefix.into());
        self
    }

    /// Use a caller-constructed HTTP client instead of the default one
    /// (connection pooling, proxies and timeouts are then the caller's
    /// business).
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub(crate) fn user_agent_string(&self) -> String {
        match &self.user_agent {
            Some(prefix) => format!("{prefix} {BASE_USER_AGENT}"),
            None => BASE_USER_AGENT.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_crate_version() {
        let config = Config::new(DirectoryUrl::LetsEncryptStaging);
        assert_eq!(config.user_agent_string(), BASE_USER_AGENT);

        let config = config.user_agent("my-provisioner/2.1");
        let ua = config.user_agent_string();
        assert!(ua.starts_with("my-provisioner/2.1 "));
        assert!(ua.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
