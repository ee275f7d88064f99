//! The `users` collection: one profile document per account, carrying the
//! role the navigation guard checks.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::OffsetDateTime;

use super::{
    collections, decode, note_missing_index, server_timestamp, Direction, DocumentStore, Query,
    StoreError,
};
use crate::identity::AuthIdentity;
use crate::types::{Role, UserId};

/// Per-account profile record.
///
/// A document without a `role` field reads as `Student`; unmodeled fields
/// survive a read-modify-write round trip in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read/write access to the `users` collection.
///
/// The session context and the admin views are both written against this
/// trait; [`Profiles`] implements it over any [`DocumentStore`].
pub trait ProfileStore: Send + Sync + 'static {
    /// Seed a profile document for a freshly signed-up account (merging,
    /// so re-running for an existing account loses nothing).
    fn create_profile(
        &self,
        identity: &AuthIdentity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch one account's profile. `Ok(None)` when no document exists —
    /// a valid state for a live account.
    fn get_profile(
        &self,
        uid: &UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send;

    /// Merge `fields` into one account's profile document.
    fn set_profile(
        &self,
        uid: &UserId,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Assign an account's role, leaving the rest of the profile as-is.
    fn set_role(
        &self,
        uid: &UserId,
        role: Role,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All profiles, newest account first.
    fn list_profiles(&self) -> impl Future<Output = Result<Vec<UserProfile>, StoreError>> + Send;

    /// Server-side count of all profiles.
    fn count_profiles(&self) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Remove one account's profile document.
    fn delete_profile(&self, uid: &UserId)
        -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// [`ProfileStore`] over any document store.
pub struct Profiles<D> {
    store: Arc<D>,
}

// Manual Clone: avoid derive adding a `D: Clone` bound.
impl<D> Clone for Profiles<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<D> Profiles<D> {
    #[must_use]
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }
}

impl<D: DocumentStore> ProfileStore for Profiles<D> {
    fn create_profile(
        &self,
        identity: &AuthIdentity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let mut fields = Map::new();
        fields.insert("uid".into(), json!(identity.uid));
        fields.insert("email".into(), json!(identity.email));
        fields.insert("displayName".into(), json!(identity.display_name));
        fields.insert("createdAt".into(), server_timestamp());
        let uid = identity.uid.clone();
        async move {
            self.store
                .set(collections::USERS, uid.as_str(), fields, true)
                .await
        }
    }

    fn get_profile(
        &self,
        uid: &UserId,
    ) -> impl Future<Output = Result<Option<UserProfile>, StoreError>> + Send {
        let uid = uid.clone();
        async move {
            match self.store.get(collections::USERS, uid.as_str()).await? {
                Some(doc) => {
                    let (_, profile) = decode::<UserProfile>(doc)?;
                    Ok(Some(profile))
                }
                None => Ok(None),
            }
        }
    }

    fn set_profile(
        &self,
        uid: &UserId,
        fields: Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let uid = uid.clone();
        async move {
            self.store
                .set(collections::USERS, uid.as_str(), fields, true)
                .await
        }
    }

    fn set_role(
        &self,
        uid: &UserId,
        role: Role,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let mut fields = Map::new();
        fields.insert("role".into(), json!(role));
        let uid = uid.clone();
        async move {
            self.store
                .set(collections::USERS, uid.as_str(), fields, true)
                .await?;
            tracing::info!(uid = %uid, role = %role, "Role updated");
            Ok(())
        }
    }

    fn list_profiles(&self) -> impl Future<Output = Result<Vec<UserProfile>, StoreError>> + Send {
        async move {
            let docs = self
                .store
                .query(
                    collections::USERS,
                    Query::new().order_by("createdAt", Direction::Descending),
                )
                .await
                .inspect_err(|e| note_missing_index(collections::USERS, e))?;
            docs.into_iter()
                .map(|doc| decode::<UserProfile>(doc).map(|(_, profile)| profile))
                .collect()
        }
    }

    fn count_profiles(&self) -> impl Future<Output = Result<u64, StoreError>> + Send {
        async move { self.store.count(collections::USERS, None).await }
    }

    fn delete_profile(
        &self,
        uid: &UserId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let uid = uid.clone();
        async move { self.store.delete(collections::USERS, uid.as_str()).await }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn profiles() -> Profiles<MemoryStore> {
        Profiles::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let profiles = profiles();
        let identity = AuthIdentity::new("u-1", "ada@example.com").with_display_name("Ada");
        profiles.create_profile(&identity).await.unwrap();

        let profile = profiles
            .get_profile(&UserId::from("u-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.uid, UserId::from("u-1"));
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert_eq!(profile.role, Role::Student, "no stored role reads as student");
        assert!(profile.created_at.is_some(), "createdAt is server-stamped");
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        assert!(profiles()
            .get_profile(&UserId::from("ghost"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn set_role_touches_only_the_role() {
        let profiles = profiles();
        let identity = AuthIdentity::new("u-1", "ada@example.com");
        profiles.create_profile(&identity).await.unwrap();

        profiles
            .set_role(&UserId::from("u-1"), Role::Admin)
            .await
            .unwrap();

        let profile = profiles
            .get_profile(&UserId::from("u-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert_eq!(profile.email, "ada@example.com");
    }

    #[tokio::test]
    async fn list_is_newest_first_and_count_matches() {
        let profiles = profiles();
        for uid in ["u-1", "u-2", "u-3"] {
            profiles
                .create_profile(&AuthIdentity::new(uid, format!("{uid}@example.com")))
                .await
                .unwrap();
            // Distinct createdAt stamps for a meaningful order.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let listed = profiles.list_profiles().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].uid, UserId::from("u-3"));
        assert_eq!(profiles.count_profiles().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_removes_the_document() {
        let profiles = profiles();
        let identity = AuthIdentity::new("u-1", "ada@example.com");
        profiles.create_profile(&identity).await.unwrap();
        profiles.delete_profile(&UserId::from("u-1")).await.unwrap();
        assert!(profiles
            .get_profile(&UserId::from("u-1"))
            .await
            .unwrap()
            .is_none());
    }
}
