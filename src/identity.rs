//! The signed-in account: who it is, how it changes, and the client for
//! the hosted identity service.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::UserId;

/// Snapshot of a signed-in account, as reported by the identity service.
///
/// Read-only to this crate: the identity service owns the account record.
/// Profile data beyond these fields lives in the document store, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthIdentity {
    /// Opaque account identifier.
    pub uid: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthIdentity {
    #[must_use]
    pub fn new(uid: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Source of the signed-in identity and its change notifications.
///
/// `current_identity` is a synchronous read. `subscribe` returns a channel
/// that receives every transition in emission order: `Some` on sign-in,
/// `None` on sign-out.
pub trait IdentityProvider: Send + Sync + 'static {
    fn current_identity(&self) -> Option<AuthIdentity>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<AuthIdentity>>;
}

/// Shared live-identity cell: the current account plus its subscribers.
///
/// A single lock covers both so subscribers observe transitions in the
/// same order the cell applied them.
#[derive(Default)]
pub(crate) struct IdentityCell {
    inner: Mutex<CellInner>,
}

#[derive(Default)]
struct CellInner {
    current: Option<AuthIdentity>,
    subscribers: Vec<mpsc::UnboundedSender<Option<AuthIdentity>>>,
}

impl IdentityCell {
    pub(crate) fn get(&self) -> Option<AuthIdentity> {
        self.inner.lock().current.clone()
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<AuthIdentity>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    /// Replace the current identity and notify every live subscriber.
    pub(crate) fn set(&self, identity: Option<AuthIdentity>) {
        let mut inner = self.inner.lock();
        inner.current = identity.clone();
        inner
            .subscribers
            .retain(|tx| tx.send(identity.clone()).is_ok());
    }

    /// Update the current snapshot without emitting a change event
    /// (account-record edits are not sign-in/out transitions).
    pub(crate) fn update_current(&self, f: impl FnOnce(&mut AuthIdentity)) {
        if let Some(current) = self.inner.lock().current.as_mut() {
            f(current);
        }
    }
}

/// Identity provider with a directly-settable account.
///
/// For development and tests: no hosted service involved, same change
/// semantics as [`AuthClient`].
///
/// ```rust,ignore
/// let dev = DevIdentity::new();
/// dev.sign_in(AuthIdentity::new("u-1", "dev@local"));
/// dev.sign_out();
/// ```
#[derive(Default)]
pub struct DevIdentity {
    cell: IdentityCell,
}

impl DevIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, identity: AuthIdentity) {
        self.cell.set(Some(identity));
    }

    pub fn sign_out(&self) {
        self.cell.set(None);
    }
}

impl IdentityProvider for DevIdentity {
    fn current_identity(&self) -> Option<AuthIdentity> {
        self.cell.get()
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<AuthIdentity>> {
        self.cell.subscribe()
    }
}

#[cfg(feature = "rest")]
pub use client::AuthClient;

#[cfg(feature = "rest")]
mod client {
    use url::Url;

    use super::{AuthIdentity, IdentityCell, IdentityProvider};
    use crate::config::Config;
    use crate::error::Error;
    use crate::types::UserId;
    use serde::{Deserialize, Serialize};
    use tokio::sync::mpsc;

    /// Client for the hosted identity service.
    ///
    /// Tracks the signed-in account locally and broadcasts every sign-in
    /// and sign-out to subscribers, in order. Tokens issued by the service
    /// are handled internally and never interpreted.
    pub struct AuthClient {
        http: reqwest::Client,
        identity_url: Url,
        api_key: String,
        cell: IdentityCell,
    }

    #[derive(Serialize)]
    struct CredentialRequest<'a> {
        email: &'a str,
        password: &'a str,
    }

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct UpdateRequest<'a> {
        uid: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_name: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<&'a str>,
    }

    #[derive(Serialize)]
    struct DeleteRequest<'a> {
        uid: &'a str,
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct AccountResponse {
        uid: String,
        email: String,
        #[serde(default)]
        display_name: Option<String>,
    }

    impl From<AccountResponse> for AuthIdentity {
        fn from(account: AccountResponse) -> Self {
            Self {
                uid: UserId::from(account.uid),
                email: account.email,
                display_name: account.display_name,
            }
        }
    }

    impl AuthClient {
        /// Create a client for the identity service named in `config`.
        #[must_use]
        pub fn new(config: &Config) -> Self {
            Self {
                http: reqwest::Client::new(),
                identity_url: config.identity_url.clone(),
                api_key: config.api_key.clone(),
                cell: IdentityCell::default(),
            }
        }

        /// Use a custom HTTP client (for connection pool reuse or testing).
        #[must_use]
        pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
            self.http = client;
            self
        }

        fn endpoint(&self, verb: &str) -> Url {
            let mut url = self.identity_url.clone();
            url.path_segments_mut()
                .expect("identity URL is validated as a base at configuration")
                .pop_if_empty()
                .push(&format!("accounts:{verb}"));
            url.query_pairs_mut().append_pair("key", &self.api_key);
            url
        }

        /// Create an account and sign it in.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Http`] on network failure, or [`Error::Auth`]
        /// if the service rejects the credentials.
        pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthIdentity, Error> {
            let identity = self
                .credential_call("signUp", "sign up", email, password)
                .await?;
            self.cell.set(Some(identity.clone()));
            tracing::info!(uid = %identity.uid, "Signed up");
            Ok(identity)
        }

        /// Sign an existing account in with email and password.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Http`] on network failure, or [`Error::Auth`]
        /// if the credentials are invalid.
        pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, Error> {
            let identity = self
                .credential_call("signInWithPassword", "sign in", email, password)
                .await?;
            self.cell.set(Some(identity.clone()));
            tracing::info!(uid = %identity.uid, "Signed in");
            Ok(identity)
        }

        /// Sign the current account out.
        ///
        /// Local-only and infallible: clears the live identity and emits
        /// the sign-out before returning.
        pub fn sign_out(&self) {
            self.cell.set(None);
            tracing::info!("Signed out");
        }

        /// Re-verify the current account's password without changing the
        /// signed-in state.
        ///
        /// # Errors
        ///
        /// Returns [`Error::NotSignedIn`] without a live account, or
        /// [`Error::Auth`] if the password is wrong.
        pub async fn reauthenticate(&self, password: &str) -> Result<(), Error> {
            let identity = self.current_identity().ok_or(Error::NotSignedIn)?;
            self.credential_call(
                "signInWithPassword",
                "reauthentication",
                &identity.email,
                password,
            )
            .await?;
            Ok(())
        }

        /// Update the account's display name on the service and in the
        /// local snapshot.
        ///
        /// # Errors
        ///
        /// Returns [`Error::NotSignedIn`] without a live account, or the
        /// service's rejection.
        pub async fn update_display_name(&self, name: &str) -> Result<(), Error> {
            let identity = self.current_identity().ok_or(Error::NotSignedIn)?;
            let response = self
                .http
                .post(self.endpoint("update"))
                .json(&UpdateRequest {
                    uid: identity.uid.as_str(),
                    display_name: Some(name),
                    password: None,
                })
                .send()
                .await?;
            Self::ensure_success(response, "profile update").await?;
            self.cell
                .update_current(|current| current.display_name = Some(name.to_owned()));
            Ok(())
        }

        /// Change the account password. Requires the current password —
        /// the service demands a recent credential check.
        ///
        /// # Errors
        ///
        /// Returns [`Error::NotSignedIn`] without a live account,
        /// [`Error::Auth`] if reauthentication or the update fails.
        pub async fn change_password(
            &self,
            current_password: &str,
            new_password: &str,
        ) -> Result<(), Error> {
            let identity = self.current_identity().ok_or(Error::NotSignedIn)?;
            self.reauthenticate(current_password).await?;
            let response = self
                .http
                .post(self.endpoint("update"))
                .json(&UpdateRequest {
                    uid: identity.uid.as_str(),
                    display_name: None,
                    password: Some(new_password),
                })
                .send()
                .await?;
            Self::ensure_success(response, "password change").await?;
            Ok(())
        }

        /// Delete the account from the service, then sign out locally.
        ///
        /// # Errors
        ///
        /// Returns [`Error::NotSignedIn`] without a live account, or the
        /// service's rejection. The local sign-out only happens after the
        /// service confirms the deletion.
        pub async fn delete_account(&self) -> Result<(), Error> {
            let identity = self.current_identity().ok_or(Error::NotSignedIn)?;
            let response = self
                .http
                .post(self.endpoint("delete"))
                .json(&DeleteRequest {
                    uid: identity.uid.as_str(),
                })
                .send()
                .await?;
            Self::ensure_success(response, "account deletion").await?;
            self.cell.set(None);
            tracing::info!(uid = %identity.uid, "Account deleted");
            Ok(())
        }

        async fn credential_call(
            &self,
            verb: &str,
            operation: &'static str,
            email: &str,
            password: &str,
        ) -> Result<AuthIdentity, Error> {
            let response = self
                .http
                .post(self.endpoint(verb))
                .json(&CredentialRequest { email, password })
                .send()
                .await?;
            let response = Self::ensure_success(response, operation).await?;
            let account = response.json::<AccountResponse>().await?;
            Ok(account.into())
        }

        /// Checks HTTP response status; returns the response on success or
        /// an error with details.
        async fn ensure_success(
            response: reqwest::Response,
            operation: &'static str,
        ) -> Result<reqwest::Response, Error> {
            if response.status().is_success() {
                return Ok(response);
            }
            let status = response.status().as_u16();
            let detail = response.text().await.unwrap_or_default();
            Err(Error::Auth {
                operation,
                status: Some(status),
                detail,
            })
        }
    }

    impl IdentityProvider for AuthClient {
        fn current_identity(&self) -> Option<AuthIdentity> {
            self.cell.get()
        }

        fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<AuthIdentity>> {
            self.cell.subscribe()
        }
    }
}
