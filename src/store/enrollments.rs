//! The `enrollments` collection: one document per (account, course) pair.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::catalog::decode_course;
use super::{
    collections, decode, encode, note_missing_index, server_timestamp, Direction, DocumentStore,
    Query, StoreError,
};
use crate::types::{CourseId, EnrollmentId, UserId};

/// Lifecycle of an enrollment. Crypto payments start as
/// `PendingVerification` until an admin confirms the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    PendingVerification,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PendingVerification => "pending_verification",
        }
    }
}

/// Payment rail chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Card,
    Crypto,
}

/// Enrollment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(skip)]
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub course_title: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub enrolled_at: Option<OffsetDateTime>,
    pub payment_provider: PaymentProvider,
    #[serde(default)]
    pub progress_percentage: u8,
    pub status: EnrollmentStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

/// Enrollments over any document store.
pub struct Enrollments<D> {
    store: Arc<D>,
}

// Manual Clone: avoid derive adding a `D: Clone` bound.
impl<D> Clone for Enrollments<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<D> Enrollments<D> {
    #[must_use]
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }
}

fn decode_enrollment(doc: super::Document) -> Result<Enrollment, StoreError> {
    let (id, mut enrollment) = decode::<Enrollment>(doc)?;
    enrollment.id = EnrollmentId::from(id);
    Ok(enrollment)
}

impl<D: DocumentStore> Enrollments<D> {
    /// Enroll an account in a course.
    ///
    /// The document id is the deterministic `{uid}_{course_id}`, so
    /// re-enrolling overwrites rather than duplicates. Crypto payments
    /// start pending; everything else starts active.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn enroll(
        &self,
        uid: &UserId,
        course_id: &CourseId,
        course_title: &str,
        payment: PaymentProvider,
    ) -> Result<EnrollmentId, StoreError> {
        let id = EnrollmentId(format!("{uid}_{course_id}"));
        let status = match payment {
            PaymentProvider::Crypto => EnrollmentStatus::PendingVerification,
            PaymentProvider::Card => EnrollmentStatus::Active,
        };
        let enrollment = Enrollment {
            id: id.clone(),
            user_id: uid.clone(),
            course_id: course_id.clone(),
            course_title: course_title.to_owned(),
            enrolled_at: None,
            payment_provider: payment,
            progress_percentage: 0,
            status,
            updated_at: None,
        };

        let mut fields = encode(id.as_str(), &enrollment)?;
        fields.insert("enrolledAt".into(), server_timestamp());
        self.store
            .set(collections::ENROLLMENTS, id.as_str(), fields, false)
            .await?;
        tracing::info!(uid = %uid, course = %course_id, status = status.as_str(), "Enrollment created");
        Ok(id)
    }

    /// The courses an account is enrolled in. Enrollments whose course
    /// document has since disappeared are skipped.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn enrolled_courses(
        &self,
        uid: &UserId,
    ) -> Result<Vec<super::catalog::Course>, StoreError> {
        let docs = self
            .store
            .query(
                collections::ENROLLMENTS,
                Query::new().where_eq("userId", uid.as_str()),
            )
            .await?;

        let mut courses = Vec::with_capacity(docs.len());
        for doc in docs {
            let enrollment = decode_enrollment(doc)?;
            if let Some(course_doc) = self
                .store
                .get(collections::COURSES, enrollment.course_id.as_str())
                .await?
            {
                courses.push(decode_course(course_doc)?);
            }
        }
        Ok(courses)
    }

    /// Every enrollment, newest first (the admin view).
    ///
    /// # Errors
    ///
    /// Propagates store failures, including the missing `enrolledAt`
    /// index as [`StoreError::FailedPrecondition`].
    pub async fn list_enrollments(&self) -> Result<Vec<Enrollment>, StoreError> {
        let docs = self
            .store
            .query(
                collections::ENROLLMENTS,
                Query::new().order_by("enrolledAt", Direction::Descending),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::ENROLLMENTS, e))?;
        docs.into_iter().map(decode_enrollment).collect()
    }

    /// Set one enrollment's status (admins confirming a crypto payment),
    /// stamping `updatedAt`.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn set_enrollment_status(
        &self,
        id: &EnrollmentId,
        status: EnrollmentStatus,
    ) -> Result<(), StoreError> {
        let mut fields = Map::new();
        fields.insert("status".into(), Value::String(status.as_str().to_owned()));
        fields.insert("updatedAt".into(), server_timestamp());
        self.store
            .set(collections::ENROLLMENTS, id.as_str(), fields, true)
            .await?;
        tracing::info!(enrollment = %id, status = status.as_str(), "Enrollment status updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::catalog::{Catalog, Course};
    use crate::store::memory::MemoryStore;

    fn stores() -> (Arc<MemoryStore>, Enrollments<MemoryStore>, Catalog<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            store.clone(),
            Enrollments::new(store.clone()),
            Catalog::new(store),
        )
    }

    fn course(title: &str) -> Course {
        Course {
            id: CourseId::default(),
            title: title.to_owned(),
            description: None,
            is_featured: false,
            module_order: Vec::new(),
            updated_at: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn enroll_uses_deterministic_id_and_payment_rules() {
        let (_, enrollments, _) = stores();
        let uid = UserId::from("u-1");

        let id = enrollments
            .enroll(&uid, &CourseId::from("c-1"), "Rust 101", PaymentProvider::Card)
            .await
            .unwrap();
        assert_eq!(id.as_str(), "u-1_c-1");

        let listed = enrollments.list_enrollments().await.unwrap();
        assert_eq!(listed[0].status, EnrollmentStatus::Active);
        assert_eq!(listed[0].progress_percentage, 0);
        assert!(listed[0].enrolled_at.is_some());

        enrollments
            .enroll(&uid, &CourseId::from("c-2"), "Crypto", PaymentProvider::Crypto)
            .await
            .unwrap();
        let listed = enrollments.list_enrollments().await.unwrap();
        let pending = listed
            .iter()
            .find(|e| e.course_id == CourseId::from("c-2"))
            .unwrap();
        assert_eq!(pending.status, EnrollmentStatus::PendingVerification);
    }

    #[tokio::test]
    async fn reenrolling_overwrites_not_duplicates() {
        let (_, enrollments, _) = stores();
        let uid = UserId::from("u-1");
        let course_id = CourseId::from("c-1");

        for payment in [PaymentProvider::Card, PaymentProvider::Crypto] {
            enrollments
                .enroll(&uid, &course_id, "Rust 101", payment)
                .await
                .unwrap();
        }

        let listed = enrollments.list_enrollments().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, EnrollmentStatus::PendingVerification);
    }

    #[tokio::test]
    async fn enrolled_courses_joins_and_skips_missing() {
        let (_, enrollments, catalog) = stores();
        let uid = UserId::from("u-1");

        let kept = catalog
            .save_course(None, &course("Kept"), &[])
            .await
            .unwrap();
        enrollments
            .enroll(&uid, &kept, "Kept", PaymentProvider::Card)
            .await
            .unwrap();
        enrollments
            .enroll(&uid, &CourseId::from("deleted"), "Gone", PaymentProvider::Card)
            .await
            .unwrap();
        // Another account's enrollment must not leak in.
        enrollments
            .enroll(&UserId::from("u-2"), &kept, "Kept", PaymentProvider::Card)
            .await
            .unwrap();

        let courses = enrollments.enrolled_courses(&uid).await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].title, "Kept");
    }

    #[tokio::test]
    async fn status_update_merges_and_stamps() {
        let (_, enrollments, _) = stores();
        let id = enrollments
            .enroll(
                &UserId::from("u-1"),
                &CourseId::from("c-1"),
                "Rust 101",
                PaymentProvider::Crypto,
            )
            .await
            .unwrap();

        enrollments
            .set_enrollment_status(&id, EnrollmentStatus::Active)
            .await
            .unwrap();

        let listed = enrollments.list_enrollments().await.unwrap();
        assert_eq!(listed[0].status, EnrollmentStatus::Active);
        assert!(listed[0].updated_at.is_some());
        assert_eq!(listed[0].course_title, "Rust 101", "merge kept other fields");
    }
}
