//! Client for the hosted document store's REST surface.

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::{
    is_server_timestamp, Direction, Document, DocumentStore, Filter, Query, StoreError, Write,
    WriteBatch,
};
use crate::config::Config;

/// [`DocumentStore`] backed by the hosted service.
///
/// Missing documents read as `None`, a missing server-side index surfaces
/// as [`StoreError::FailedPrecondition`], and timestamp sentinels are sent
/// as transforms the service resolves against its own clock.
pub struct RestStore {
    http: reqwest::Client,
    store_url: Url,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SetBody {
    fields: Map<String, Value>,
    merge: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    set_to_server_time: Vec<String>,
}

impl SetBody {
    fn new(mut fields: Map<String, Value>, merge: bool) -> Self {
        let set_to_server_time: Vec<String> = fields
            .iter()
            .filter(|(_, value)| is_server_timestamp(value))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &set_to_server_time {
            fields.remove(key);
        }
        Self {
            fields,
            merge,
            set_to_server_time,
        }
    }
}

#[derive(Serialize)]
struct FilterBody {
    field: String,
    equals: Value,
}

impl From<Filter> for FilterBody {
    fn from(filter: Filter) -> Self {
        Self {
            field: filter.field,
            equals: filter.equals,
        }
    }
}

#[derive(Serialize)]
struct OrderBody {
    field: String,
    direction: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<FilterBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_by: Option<OrderBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

impl From<Query> for QueryBody {
    fn from(query: Query) -> Self {
        Self {
            filter: query.filter.map(Into::into),
            order_by: query.order.map(|(field, direction)| OrderBody {
                field,
                direction: match direction {
                    Direction::Ascending => "ascending",
                    Direction::Descending => "descending",
                },
            }),
            limit: query.limit,
        }
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    documents: Vec<Document>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CountBody {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<FilterBody>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum WriteBody {
    #[serde(rename_all = "camelCase")]
    Set {
        collection: String,
        id: String,
        fields: Map<String, Value>,
        merge: bool,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        set_to_server_time: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Delete {
        collection: String,
        id: String,
    },
}

impl From<Write> for WriteBody {
    fn from(write: Write) -> Self {
        match write {
            Write::Set {
                collection,
                id,
                fields,
                merge,
            } => {
                let body = SetBody::new(fields, merge);
                Self::Set {
                    collection,
                    id,
                    fields: body.fields,
                    merge: body.merge,
                    set_to_server_time: body.set_to_server_time,
                }
            }
            Write::Delete { collection, id } => Self::Delete { collection, id },
        }
    }
}

#[derive(Serialize)]
struct CommitBody {
    writes: Vec<WriteBody>,
}

impl RestStore {
    /// Create a client for the document store named in `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            store_url: config.store_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.store_url.clone();
        url.path_segments_mut()
            .expect("store URL is validated as a base at configuration")
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("key", &self.api_key);
        url
    }

    fn doc_url(&self, collection: &str, id: &str) -> Url {
        self.url(&["collections", collection, "docs", id])
    }

    fn op_url(&self, collection: &str, verb: &str) -> Url {
        self.url(&["collections", &format!("{collection}:{verb}")])
    }

    /// Checks HTTP response status; returns the response on success or a
    /// typed store error.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        if detail.contains("FAILED_PRECONDITION") {
            return Err(StoreError::FailedPrecondition(detail));
        }
        Err(StoreError::Unavailable {
            operation,
            status: Some(status),
            detail,
        })
    }
}

impl DocumentStore for RestStore {
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send {
        let url = self.doc_url(collection, id);
        async move {
            let response = self.http.get(url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = Self::ensure_success(response, "document read").await?;
            Ok(Some(response.json::<Document>().await?))
        }
    }

    fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Map<String, Value>,
        merge: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let url = self.doc_url(collection, id);
        let body = SetBody::new(fields, merge);
        async move {
            let response = self.http.patch(url).json(&body).send().await?;
            Self::ensure_success(response, "document write").await?;
            Ok(())
        }
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        let url = self.doc_url(collection, id);
        async move {
            let response = self.http.delete(url).send().await?;
            // Deleting a document that is already gone is fine.
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            Self::ensure_success(response, "document delete").await?;
            Ok(())
        }
    }

    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send {
        let url = self.op_url(collection, "query");
        let body = QueryBody::from(query);
        async move {
            let response = self.http.post(url).json(&body).send().await?;
            let response = Self::ensure_success(response, "query").await?;
            Ok(response.json::<QueryResponse>().await?.documents)
        }
    }

    fn count(
        &self,
        collection: &str,
        filter: Option<Filter>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send {
        let url = self.op_url(collection, "count");
        let body = CountBody {
            filter: filter.map(Into::into),
        };
        async move {
            let response = self.http.post(url).json(&body).send().await?;
            let response = Self::ensure_success(response, "count").await?;
            Ok(response.json::<CountResponse>().await?.count)
        }
    }

    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send {
        let url = self.url(&["batch"]);
        let body = CommitBody {
            writes: batch.into_writes().into_iter().map(Into::into).collect(),
        };
        async move {
            let response = self.http.post(url).json(&body).send().await?;
            Self::ensure_success(response, "batch commit").await?;
            Ok(())
        }
    }
}
