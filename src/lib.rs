#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod router;
pub mod session;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::Config;
pub use error::Error;
pub use guard::{Decision, NavigationGuard, RouteMeta};
#[cfg(feature = "rest")]
pub use identity::AuthClient;
pub use identity::{AuthIdentity, DevIdentity, IdentityProvider};
pub use router::{default_routes, Navigation, Navigator, Route};
pub use session::{SessionContext, SessionListener};
pub use store::blog::{Blog, BlogPost};
pub use store::catalog::{Catalog, Course, CourseModule, CourseOutline, Lesson};
pub use store::enrollments::{Enrollment, EnrollmentStatus, Enrollments, PaymentProvider};
pub use store::memory::MemoryStore;
pub use store::profiles::{ProfileStore, Profiles, UserProfile};
#[cfg(feature = "rest")]
pub use store::rest::RestStore;
pub use store::stats::{dashboard_stats, DashboardStats};
pub use store::{
    new_doc_id, server_timestamp, Direction, Document, DocumentStore, Filter, Query, StoreError,
    WriteBatch,
};
pub use types::{CourseId, EnrollmentId, LessonId, PostId, Role, UserId};
