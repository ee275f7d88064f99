//! In-memory [`DocumentStore`], matching the hosted store's query, count,
//! and batch semantics. Backs the test suite and local development.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;

use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::{
    resolve_server_timestamps, Direction, Document, DocumentStore, Filter, Query, StoreError,
    Write, WriteBatch,
};

type Fields = Map<String, Value>;
type Collections = BTreeMap<String, BTreeMap<String, Fields>>;

/// In-memory [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(collections: &mut Collections, write: Write) {
        match write {
            Write::Set {
                collection,
                id,
                mut fields,
                merge,
            } => {
                resolve_server_timestamps(&mut fields);
                let docs = collections.entry(collection).or_default();
                match docs.get_mut(&id) {
                    Some(existing) if merge => {
                        for (key, value) in fields {
                            existing.insert(key, value);
                        }
                    }
                    _ => {
                        docs.insert(id, fields);
                    }
                }
            }
            Write::Delete { collection, id } => {
                if let Some(docs) = collections.get_mut(&collection) {
                    docs.remove(&id);
                }
            }
        }
    }

    fn matches(fields: &Fields, filter: Option<&Filter>) -> bool {
        filter.map_or(true, |f| fields.get(&f.field) == Some(&f.equals))
    }
}

impl DocumentStore for MemoryStore {
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send {
        let doc = self
            .collections
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_owned(),
                fields: fields.clone(),
            });
        async move { Ok(doc) }
    }

    fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        merge: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        Self::apply(
            &mut self.collections.lock(),
            Write::Set {
                collection: collection.to_owned(),
                id: id.to_owned(),
                fields,
                merge,
            },
        );
        async { Ok(()) }
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        Self::apply(
            &mut self.collections.lock(),
            Write::Delete {
                collection: collection.to_owned(),
                id: id.to_owned(),
            },
        );
        async { Ok(()) }
    }

    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send {
        let mut docs: Vec<Document> = self
            .collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| Self::matches(fields, query.filter.as_ref()))
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order {
            docs.sort_by(|a, b| {
                let ordering = compare_values(a.fields.get(field), b.fields.get(field));
                match direction {
                    Direction::Ascending => ordering,
                    Direction::Descending => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }

        async move { Ok(docs) }
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let count = self
            .collections
            .lock()
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|fields| Self::matches(fields, filter.as_ref()))
                    .count() as u64
            })
            .unwrap_or(0);
        async move { Ok(count) }
    }

    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send {
        // One lock span over the whole batch: readers see all of it or
        // none of it.
        let mut collections = self.collections.lock();
        for write in batch.into_writes() {
            Self::apply(&mut collections, write);
        }
        async { Ok(()) }
    }
}

/// Field ordering: strings and RFC 3339 timestamps lexicographically,
/// numbers numerically, bools false-first; missing fields sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
