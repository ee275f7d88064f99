//! The document store: a keyed-JSON-record backend, the trait both the
//! hosted client and the in-memory store implement, and the typed
//! collections the platform keeps in it.

pub mod blog;
pub mod catalog;
pub mod enrollments;
pub mod memory;
pub mod profiles;
#[cfg(feature = "rest")]
pub mod rest;
pub mod stats;

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::macros::format_description;
use time::OffsetDateTime;
use ulid::Ulid;

/// Collection names in the hosted store.
pub(crate) mod collections {
    pub const USERS: &str = "users";
    pub const COURSES: &str = "courses";
    pub const LESSONS: &str = "lessons";
    pub const BLOG_POSTS: &str = "blogPosts";
    pub const ENROLLMENTS: &str = "enrollments";
}

/// A stored document: its collection-unique id plus its JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

/// Equality filter on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub equals: Value,
}

impl Filter {
    #[must_use]
    pub fn eq(field: impl Into<String>, equals: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: equals.into(),
        }
    }
}

/// Sort direction for an ordered query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Declarative query over one collection: optional equality filter,
/// optional single-field order, optional limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) filter: Option<Filter>,
    pub(crate) order: Option<(String, Direction)>,
    pub(crate) limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.filter = Some(Filter::eq(field, equals));
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((field.into(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum Write {
    Set {
        collection: String,
        id: String,
        fields: Map<String, Value>,
        merge: bool,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// Ordered set of writes applied atomically by [`DocumentStore::commit`].
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        collection: impl Into<String>,
        id: impl Into<String>,
        fields: Map<String, Value>,
        merge: bool,
    ) -> &mut Self {
        self.writes.push(Write::Set {
            collection: collection.into(),
            id: id.into(),
            fields,
            merge,
        });
        self
    }

    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) -> &mut Self {
        self.writes.push(Write::Delete {
            collection: collection.into(),
            id: id.into(),
        });
        self
    }

    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Errors from the document store layer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store rejected the request because a required index (or other
    /// server-side precondition) is missing.
    #[error("Store precondition failed: {0}")]
    FailedPrecondition(String),

    /// Transport or server failure.
    #[error("Store error during {operation}: {detail}")]
    Unavailable {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// A document's fields did not match the expected record shape.
    #[error("Malformed document {id}: {source}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[cfg(feature = "rest")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Keyed-JSON-record persistence.
///
/// Implemented by [`rest::RestStore`] for the hosted service and
/// [`memory::MemoryStore`] for tests and local development; the typed
/// collection wrappers work against any implementation.
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch one document. `Ok(None)` when it does not exist.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Write one document. With `merge`, supplied fields are laid over the
    /// existing ones; without, the document is replaced.
    fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        merge: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete one document. Deleting a missing document is not an error.
    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Run a [`Query`] against one collection.
    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Server-side count of the documents matching `filter` (all documents
    /// when `None`).
    fn count(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Apply every write in `batch`, atomically and in order.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Sentinel field value replaced with the store's clock at write time.
pub(crate) const SERVER_TIMESTAMP: &str = "__server_timestamp__";

/// Field value that the store resolves to its own clock when the write is
/// applied (so record timestamps do not depend on client clocks).
#[must_use]
pub fn server_timestamp() -> Value {
    Value::String(SERVER_TIMESTAMP.to_owned())
}

pub(crate) fn is_server_timestamp(value: &Value) -> bool {
    matches!(value, Value::String(s) if s == SERVER_TIMESTAMP)
}

/// Resolve timestamp sentinels in-place against the local clock. Used by
/// the in-memory store; the hosted store resolves them server-side.
///
/// Fixed-width fractional seconds, so the stored strings order
/// lexicographically the way the instants order chronologically.
pub(crate) fn resolve_server_timestamps(fields: &mut Map<String, Value>) {
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    );
    let now = OffsetDateTime::now_utc()
        .format(format)
        .expect("RFC 3339 formatting of the current time cannot fail");
    for value in fields.values_mut() {
        if is_server_timestamp(value) {
            *value = Value::String(now.clone());
        }
    }
}

/// Mint a collection-unique document id, client-side (the hosted SDK does
/// the same, so batches can reference documents before they exist).
#[must_use]
pub fn new_doc_id() -> String {
    Ulid::new().to_string()
}

/// Decode a document into a typed record, returning the id alongside.
pub(crate) fn decode<T: DeserializeOwned>(doc: Document) -> Result<(String, T), StoreError> {
    let Document { id, fields } = doc;
    match serde_json::from_value(Value::Object(fields)) {
        Ok(record) => Ok((id, record)),
        Err(source) => Err(StoreError::Malformed { id, source }),
    }
}

/// Encode a typed record into document fields.
pub(crate) fn encode<T: Serialize>(id: &str, record: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::Malformed {
            id: id.to_owned(),
            source: serde::de::Error::custom(format!("expected a JSON object, got {other}")),
        }),
        Err(source) => Err(StoreError::Malformed {
            id: id.to_owned(),
            source,
        }),
    }
}

/// Ordered queries need a server-side index; surface that loudly before
/// propagating (the caller still gets the error).
pub(crate) fn note_missing_index(collection: &str, error: &StoreError) {
    if let StoreError::FailedPrecondition(detail) = error {
        tracing::error!(
            collection,
            detail,
            "Store index missing: create the index for this collection's ordered query"
        );
    }
}
