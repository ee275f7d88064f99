//! Aggregate counts for the admin dashboard.

use serde::{Deserialize, Serialize};

use super::enrollments::EnrollmentStatus;
use super::{collections, DocumentStore, Filter, StoreError};

/// Headline numbers on the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_courses: u64,
    pub total_enrollments: u64,
    pub pending_enrollments: u64,
}

/// All four dashboard counts, issued to the store concurrently; every
/// count is server-side, no documents are transferred.
///
/// # Errors
///
/// Propagates the first store failure.
pub async fn dashboard_stats<D: DocumentStore>(store: &D) -> Result<DashboardStats, StoreError> {
    let pending = Filter::eq("status", EnrollmentStatus::PendingVerification.as_str());
    let (total_users, total_courses, total_enrollments, pending_enrollments) = tokio::try_join!(
        store.count(collections::USERS, None),
        store.count(collections::COURSES, None),
        store.count(collections::ENROLLMENTS, None),
        store.count(collections::ENROLLMENTS, Some(pending)),
    )?;

    Ok(DashboardStats {
        total_users,
        total_courses,
        total_enrollments,
        pending_enrollments,
    })
}
