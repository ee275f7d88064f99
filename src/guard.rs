//! The pre-navigation checkpoint: every view transition is decided here
//! before the router applies it.

use std::sync::Arc;

use crate::identity::IdentityProvider;
use crate::session::SessionContext;
use crate::store::profiles::ProfileStore;
use crate::types::Role;

/// Access requirements a view declares when it is registered. Immutable
/// at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteMeta {
    /// The view needs a signed-in account.
    pub requires_auth: bool,
    /// The view needs the account's profile to carry this role.
    pub required_role: Option<Role>,
}

impl RouteMeta {
    /// Open to everyone.
    #[must_use]
    pub const fn public() -> Self {
        Self {
            requires_auth: false,
            required_role: None,
        }
    }

    /// Needs a signed-in account, any role.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            requires_auth: true,
            required_role: None,
        }
    }

    /// Needs a signed-in account whose profile carries `role`.
    #[must_use]
    pub const fn role(role: Role) -> Self {
        Self {
            requires_auth: true,
            required_role: Some(role),
        }
    }

    /// Needs a signed-in admin.
    #[must_use]
    pub const fn admin() -> Self {
        Self::role(Role::Admin)
    }
}

/// Outcome of one navigation check. Terminal per attempt: a denial is a
/// redirect, never an error, and is not retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Proceed to the requested view.
    Allow,
    /// Go to the named view instead.
    Redirect(String),
}

/// Decides, for every attempted navigation, whether it may proceed and
/// where to send the session if not.
pub struct NavigationGuard<P, S> {
    provider: Arc<P>,
    session: SessionContext<S>,
    login_route: String,
    home_route: String,
}

// Manual Clone: avoid derive adding `P: Clone, S: Clone` bounds.
impl<P, S> Clone for NavigationGuard<P, S> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            session: self.session.clone(),
            login_route: self.login_route.clone(),
            home_route: self.home_route.clone(),
        }
    }
}

impl<P: IdentityProvider, S: ProfileStore> NavigationGuard<P, S> {
    /// Create a guard with the default redirect targets (`login` for
    /// unauthenticated sessions, `dashboard` for under-privileged ones).
    #[must_use]
    pub fn new(provider: Arc<P>, session: SessionContext<S>) -> Self {
        Self {
            provider,
            session,
            login_route: "login".to_owned(),
            home_route: "dashboard".to_owned(),
        }
    }

    /// Override where unauthenticated sessions are sent.
    #[must_use]
    pub fn with_login_route(mut self, name: impl Into<String>) -> Self {
        self.login_route = name.into();
        self
    }

    /// Override where authenticated but under-privileged sessions are
    /// sent.
    #[must_use]
    pub fn with_home_route(mut self, name: impl Into<String>) -> Self {
        self.home_route = name.into();
        self
    }

    /// Decide whether the current account may enter a view with `meta`.
    ///
    /// The session profile is always brought up to date first — this is
    /// the guard's only suspension point — so a role decision never rides
    /// on a snapshot taken before the account was confirmed live. A
    /// missing or unfetched profile reads as no role: role-gated views
    /// are never granted on authentication alone.
    ///
    /// An under-privileged but signed-in account is redirected to its own
    /// home, not to login — the account is authenticated, a login page
    /// would just loop.
    pub async fn decide(&self, meta: &RouteMeta) -> Decision {
        self.session.ensure_loaded().await;

        let identity = self.provider.current_identity();

        if meta.requires_auth && identity.is_none() {
            return Decision::Redirect(self.login_route.clone());
        }

        if let Some(required) = meta.required_role {
            if self.session.current_role() != Some(required) {
                tracing::warn!(
                    email = ?identity.as_ref().map(|i| i.email.as_str()),
                    required = %required,
                    "Access denied: account does not hold the required role"
                );
                return Decision::Redirect(self.home_route.clone());
            }
        }

        Decision::Allow
    }
}
