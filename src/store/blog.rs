//! The `blogPosts` collection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use super::{
    collections, decode, encode, new_doc_id, note_missing_index, server_timestamp, Direction,
    DocumentStore, Query, StoreError,
};
use crate::types::PostId;

/// How many posts the home page preview shows.
pub const RECENT_POSTS_DEFAULT: usize = 3;

/// Blog post record. `published_at` is stamped once at creation,
/// `updated_at` on every later save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(skip)]
    pub id: PostId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The blog over any document store.
pub struct Blog<D> {
    store: Arc<D>,
}

// Manual Clone: avoid derive adding a `D: Clone` bound.
impl<D> Clone for Blog<D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<D> Blog<D> {
    #[must_use]
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }
}

fn decode_post(doc: super::Document) -> Result<BlogPost, StoreError> {
    let (id, mut post) = decode::<BlogPost>(doc)?;
    post.id = PostId::from(id);
    Ok(post)
}

impl<D: DocumentStore> Blog<D> {
    /// The `limit` most recent posts, newest first. The home page preview
    /// passes [`RECENT_POSTS_DEFAULT`].
    ///
    /// # Errors
    ///
    /// Propagates store failures, including the missing `publishedAt`
    /// index as [`StoreError::FailedPrecondition`].
    pub async fn recent_posts(&self, limit: usize) -> Result<Vec<BlogPost>, StoreError> {
        let docs = self
            .store
            .query(
                collections::BLOG_POSTS,
                Query::new()
                    .order_by("publishedAt", Direction::Descending)
                    .limit(limit),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::BLOG_POSTS, e))?;
        docs.into_iter().map(decode_post).collect()
    }

    /// Every post, newest first.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn list_posts(&self) -> Result<Vec<BlogPost>, StoreError> {
        let docs = self
            .store
            .query(
                collections::BLOG_POSTS,
                Query::new().order_by("publishedAt", Direction::Descending),
            )
            .await
            .inspect_err(|e| note_missing_index(collections::BLOG_POSTS, e))?;
        docs.into_iter().map(decode_post).collect()
    }

    /// One post by id. `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn post(&self, id: &PostId) -> Result<Option<BlogPost>, StoreError> {
        match self.store.get(collections::BLOG_POSTS, id.as_str()).await? {
            Some(doc) => Ok(Some(decode_post(doc)?)),
            None => Ok(None),
        }
    }

    /// Create a post (no `id`, stamps `publishedAt`) or update one
    /// (stamps `updatedAt`); returns the post's id.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn save_post(&self, id: Option<&PostId>, post: &BlogPost) -> Result<PostId, StoreError> {
        let (post_id, stamp_field) = match id {
            Some(id) => (id.clone(), "updatedAt"),
            None => (PostId::from(new_doc_id()), "publishedAt"),
        };

        let mut fields = encode(post_id.as_str(), post)?;
        fields.insert(stamp_field.into(), server_timestamp());
        self.store
            .set(collections::BLOG_POSTS, post_id.as_str(), fields, true)
            .await?;
        Ok(post_id)
    }

    /// Delete one post.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn delete_post(&self, id: &PostId) -> Result<(), StoreError> {
        self.store.delete(collections::BLOG_POSTS, id.as_str()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn blog() -> Blog<MemoryStore> {
        Blog::new(Arc::new(MemoryStore::new()))
    }

    fn post(title: &str) -> BlogPost {
        BlogPost {
            id: PostId::default(),
            title: title.to_owned(),
            content: String::new(),
            author: None,
            published_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn create_stamps_published_at_only() {
        let blog = blog();
        let id = blog.save_post(None, &post("First")).await.unwrap();

        let stored = blog.post(&id).await.unwrap().unwrap();
        assert!(stored.published_at.is_some());
        assert!(stored.updated_at.is_none());
    }

    #[tokio::test]
    async fn update_stamps_updated_at_and_keeps_published_at() {
        let blog = blog();
        let id = blog.save_post(None, &post("First")).await.unwrap();
        let stored = blog.post(&id).await.unwrap().unwrap();

        let mut edited = stored.clone();
        edited.title = "First, edited".to_owned();
        blog.save_post(Some(&id), &edited).await.unwrap();

        let after = blog.post(&id).await.unwrap().unwrap();
        assert_eq!(after.title, "First, edited");
        assert_eq!(after.published_at, stored.published_at);
        assert!(after.updated_at.is_some());
    }

    #[tokio::test]
    async fn recent_posts_are_newest_first_and_limited() {
        let blog = blog();
        for title in ["a", "b", "c", "d"] {
            blog.save_post(None, &post(title)).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let recent = blog.recent_posts(RECENT_POSTS_DEFAULT).await.unwrap();
        let titles: Vec<&str> = recent.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["d", "c", "b"]);
    }

    #[tokio::test]
    async fn delete_removes_the_post() {
        let blog = blog();
        let id = blog.save_post(None, &post("gone")).await.unwrap();
        blog.delete_post(&id).await.unwrap();
        assert!(blog.post(&id).await.unwrap().is_none());
    }
}
