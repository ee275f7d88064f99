//! The client's view router: the route table plus the guard run before
//! every transition.

use parking_lot::Mutex;

use crate::error::Error;
use crate::guard::{Decision, NavigationGuard, RouteMeta};
use crate::identity::IdentityProvider;
use crate::store::profiles::ProfileStore;

/// A navigable view: name, path pattern, access requirements.
///
/// Requirements are resolved at declaration time — a view under the admin
/// panel carries the admin requirement itself, so the guard never walks a
/// route hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    pub path: &'static str,
    pub meta: RouteMeta,
}

impl Route {
    #[must_use]
    pub const fn new(name: &'static str, path: &'static str, meta: RouteMeta) -> Self {
        Self { name, path, meta }
    }
}

/// Where one navigation attempt ended up. Terminal: re-entering a denied
/// view takes a fresh attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// The requested view was entered.
    Entered(String),
    /// The guard sent the session to this view instead.
    RedirectedTo(String),
}

/// The platform's route table: public pages, auth pages, the course
/// player, the dashboard, and the admin panel.
#[must_use]
pub fn default_routes() -> Vec<Route> {
    vec![
        // Public pages
        Route::new("home", "/", RouteMeta::public()),
        Route::new("courses", "/courses", RouteMeta::public()),
        Route::new("course-detail", "/course/:id", RouteMeta::public()),
        Route::new("blog", "/blog", RouteMeta::public()),
        Route::new("single-post", "/blog/:id", RouteMeta::public()),
        Route::new("why-nexus", "/why-nexus", RouteMeta::public()),
        Route::new("about", "/about", RouteMeta::public()),
        Route::new("contact", "/contact", RouteMeta::public()),
        Route::new("terms", "/terms-of-service", RouteMeta::public()),
        Route::new("privacy", "/privacy-policy", RouteMeta::public()),
        // Standalone auth pages
        Route::new("login", "/login", RouteMeta::public()),
        Route::new("signup", "/signup", RouteMeta::public()),
        // Full-screen course player
        Route::new("course-player", "/learn/:id", RouteMeta::authenticated()),
        // Dashboard
        Route::new("dashboard", "/dashboard", RouteMeta::authenticated()),
        Route::new("profile", "/dashboard/profile", RouteMeta::authenticated()),
        Route::new("settings", "/dashboard/settings", RouteMeta::authenticated()),
        // Admin panel
        Route::new("admin-dashboard", "/admin", RouteMeta::admin()),
        Route::new("admin-courses", "/admin/courses", RouteMeta::admin()),
        Route::new("admin-course-new", "/admin/courses/new", RouteMeta::admin()),
        Route::new(
            "admin-course-edit",
            "/admin/courses/edit/:id",
            RouteMeta::admin(),
        ),
        Route::new("admin-blog", "/admin/blog", RouteMeta::admin()),
        Route::new("admin-blog-new", "/admin/blog/new", RouteMeta::admin()),
        Route::new("admin-blog-edit", "/admin/blog/edit/:id", RouteMeta::admin()),
        Route::new("admin-enrollments", "/admin/enrollments", RouteMeta::admin()),
        Route::new("admin-users", "/admin/users", RouteMeta::admin()),
    ]
}

/// View router with the guard wired in front of every transition.
pub struct Navigator<P, S> {
    routes: Vec<Route>,
    guard: NavigationGuard<P, S>,
    current: Mutex<String>,
}

impl<P: IdentityProvider, S: ProfileStore> Navigator<P, S> {
    /// Router over the platform's [`default_routes`], starting at `home`.
    #[must_use]
    pub fn new(guard: NavigationGuard<P, S>) -> Self {
        Self::with_routes(guard, default_routes())
    }

    /// Router over a custom route table, starting at the first route.
    #[must_use]
    pub fn with_routes(guard: NavigationGuard<P, S>, routes: Vec<Route>) -> Self {
        let current = routes.first().map_or("home", |r| r.name).to_owned();
        Self {
            routes,
            guard,
            current: Mutex::new(current),
        }
    }

    /// Look a route up by name.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// The registered route table.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Name of the view the session is currently on.
    #[must_use]
    pub fn current(&self) -> String {
        self.current.lock().clone()
    }

    /// Attempt to enter the named view.
    ///
    /// The guard decides first; the outcome (entered, or redirected to
    /// the guard's target) is applied to the current view and returned.
    /// Denials are outcomes, not errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRoute`] if `name` is not registered.
    pub async fn navigate(&self, name: &str) -> Result<Navigation, Error> {
        let route = self
            .route(name)
            .ok_or_else(|| Error::UnknownRoute(name.to_owned()))?;

        match self.guard.decide(&route.meta).await {
            Decision::Allow => {
                *self.current.lock() = route.name.to_owned();
                tracing::debug!(route = route.name, "Navigation allowed");
                Ok(Navigation::Entered(route.name.to_owned()))
            }
            Decision::Redirect(target) => {
                *self.current.lock() = target.clone();
                tracing::debug!(route = route.name, target = %target, "Navigation redirected");
                Ok(Navigation::RedirectedTo(target))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::identity::{AuthIdentity, DevIdentity};
    use crate::session::SessionContext;
    use crate::store::memory::MemoryStore;
    use crate::store::profiles::{ProfileStore as _, Profiles};
    use crate::types::{Role, UserId};

    struct Harness {
        provider: Arc<DevIdentity>,
        profiles: Arc<Profiles<MemoryStore>>,
        session: SessionContext<Profiles<MemoryStore>>,
        router: Navigator<DevIdentity, Profiles<MemoryStore>>,
    }

    fn harness() -> Harness {
        let provider = Arc::new(DevIdentity::new());
        let profiles = Arc::new(Profiles::new(Arc::new(MemoryStore::new())));
        let session = SessionContext::new(profiles.clone());
        let router = Navigator::new(NavigationGuard::new(provider.clone(), session.clone()));
        Harness {
            provider,
            profiles,
            session,
            router,
        }
    }

    impl Harness {
        /// Sign an account in through the provider and deliver the
        /// transition to the session, as the attached listener would.
        async fn sign_in(&self, uid: &str, role: Option<Role>) {
            let identity = AuthIdentity::new(uid, format!("{uid}@example.com"));
            if let Some(role) = role {
                self.profiles.create_profile(&identity).await.unwrap();
                self.profiles
                    .set_role(&UserId::from(uid), role)
                    .await
                    .unwrap();
            }
            self.provider.sign_in(identity.clone());
            self.session.handle_identity_change(Some(identity)).await;
        }

        async fn sign_out(&self) {
            self.provider.sign_out();
            self.session.handle_identity_change(None).await;
        }
    }

    #[tokio::test]
    async fn starts_on_home() {
        assert_eq!(harness().router.current(), "home");
    }

    #[tokio::test]
    async fn unknown_routes_are_errors_not_redirects() {
        let h = harness();
        assert!(matches!(
            h.router.navigate("does-not-exist").await,
            Err(Error::UnknownRoute(_))
        ));
        assert_eq!(h.router.current(), "home", "failed attempt moves nothing");
    }

    #[tokio::test]
    async fn signed_out_sessions_browse_public_views_only() {
        let h = harness();
        assert_eq!(
            h.router.navigate("blog").await.unwrap(),
            Navigation::Entered("blog".into())
        );
        assert_eq!(
            h.router.navigate("dashboard").await.unwrap(),
            Navigation::RedirectedTo("login".into())
        );
        assert_eq!(h.router.current(), "login");
    }

    #[tokio::test]
    async fn admin_end_to_end() {
        let h = harness();
        h.sign_in("root", Some(Role::Admin)).await;
        assert_eq!(
            h.router.navigate("admin-dashboard").await.unwrap(),
            Navigation::Entered("admin-dashboard".into())
        );
        assert_eq!(h.router.current(), "admin-dashboard");
    }

    #[tokio::test]
    async fn student_end_to_end_is_redirected_to_dashboard() {
        let h = harness();
        h.sign_in("stu", Some(Role::Student)).await;
        assert_eq!(
            h.router.navigate("admin-users").await.unwrap(),
            Navigation::RedirectedTo("dashboard".into())
        );
        assert_eq!(h.router.current(), "dashboard");
    }

    #[tokio::test]
    async fn profile_less_account_end_to_end_is_redirected_to_dashboard() {
        let h = harness();
        h.sign_in("ghost", None).await;
        assert_eq!(
            h.router.navigate("admin-dashboard").await.unwrap(),
            Navigation::RedirectedTo("dashboard".into())
        );
    }

    #[tokio::test]
    async fn sign_out_locks_the_admin_panel_again() {
        let h = harness();
        h.sign_in("root", Some(Role::Admin)).await;
        h.router.navigate("admin-dashboard").await.unwrap();

        h.sign_out().await;
        assert_eq!(
            h.router.navigate("admin-dashboard").await.unwrap(),
            Navigation::RedirectedTo("login".into())
        );
    }

    #[tokio::test]
    async fn route_table_covers_the_platform() {
        let routes = default_routes();
        let admin_routes = routes
            .iter()
            .filter(|r| r.path.starts_with("/admin"))
            .count();
        assert_eq!(admin_routes, 9);
        assert!(routes
            .iter()
            .filter(|r| r.path.starts_with("/admin"))
            .all(|r| r.meta == RouteMeta::admin()));
        assert!(routes
            .iter()
            .filter(|r| r.path.starts_with("/dashboard") || r.path.starts_with("/learn"))
            .all(|r| r.meta == RouteMeta::authenticated()));
        assert_eq!(
            routes.iter().find(|r| r.name == "login").unwrap().meta,
            RouteMeta::public()
        );
        // Redirect targets must themselves be registered.
        for target in ["login", "dashboard"] {
            assert!(routes.iter().any(|r| r.name == target));
        }
    }
}
