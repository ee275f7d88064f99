use url::Url;

use crate::error::Error;

/// Client configuration for the hosted identity service and document store.
///
/// The required field (`api_key`) is a constructor parameter — no runtime
/// "missing field" errors. Use [`from_env()`](Config::from_env) for
/// convention-based setup, or [`new()`](Config::new) with `with_*` methods
/// for full control.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) api_key: String,
    pub(crate) identity_url: Url,
    pub(crate) store_url: Url,
}

impl Config {
    /// Create a configuration with the required API key and the production
    /// service endpoints.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_url: "https://identity.nexusacademy.io/v1"
                .parse()
                .expect("valid default URL"),
            store_url: "https://store.nexusacademy.io/v1"
                .parse()
                .expect("valid default URL"),
        }
    }

    /// Create a configuration from environment variables.
    ///
    /// # Required env vars
    /// - `NEXUS_API_KEY`: API key sent to both hosted services
    ///
    /// # Optional env vars
    /// - `NEXUS_IDENTITY_URL`: Override the identity service endpoint
    /// - `NEXUS_STORE_URL`: Override the document store endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `NEXUS_API_KEY` is missing or an
    /// override is not a usable base URL.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("NEXUS_API_KEY")
            .map_err(|_| Error::Config("NEXUS_API_KEY is required".into()))?;

        let mut config = Self::new(api_key);

        if let Ok(url_str) = std::env::var("NEXUS_IDENTITY_URL") {
            config = config.with_identity_url(parse_base_url("NEXUS_IDENTITY_URL", &url_str)?);
        }
        if let Ok(url_str) = std::env::var("NEXUS_STORE_URL") {
            config = config.with_store_url(parse_base_url("NEXUS_STORE_URL", &url_str)?);
        }

        Ok(config)
    }

    /// Override the identity service endpoint.
    #[must_use]
    pub fn with_identity_url(mut self, url: Url) -> Self {
        self.identity_url = url;
        self
    }

    /// Override the document store endpoint.
    #[must_use]
    pub fn with_store_url(mut self, url: Url) -> Self {
        self.store_url = url;
        self
    }

    /// API key sent to both hosted services.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Identity service base URL.
    #[must_use]
    pub fn identity_url(&self) -> &Url {
        &self.identity_url
    }

    /// Document store base URL.
    #[must_use]
    pub fn store_url(&self) -> &Url {
        &self.store_url
    }
}

fn parse_base_url(var: &str, s: &str) -> Result<Url, Error> {
    let url: Url = s.parse().map_err(|e| Error::Config(format!("{var}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("{var}: not a usable base URL")));
    }
    Ok(url)
}
