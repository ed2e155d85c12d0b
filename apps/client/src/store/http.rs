//! Remote store over the backend's HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use review_core::{HistoryRecord, ItemKey, ScheduleEntry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::remote::{RemoteResult, RemoteStore, RemoteUnavailable};
use crate::identity::Identity;

// === API Request/Response Types ===

#[derive(Debug, Deserialize)]
struct ScheduleListResponse {
    entries: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted_count: usize,
}

#[derive(Debug, Serialize)]
struct AppendHistoryRequest<'a> {
    records: &'a [HistoryRecord],
}

#[derive(Debug, Deserialize)]
struct AppendHistoryResponse {
    inserted_count: usize,
}

#[derive(Debug, Deserialize)]
struct HistoryListResponse {
    records: Vec<HistoryRecord>,
}

/// Remote store backed by the review backend.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create a store for `base_url` whose requests give up after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> RemoteResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteUnavailable::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check if backend is reachable.
    pub async fn check_connectivity(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, identity: &Identity, request: RequestBuilder) -> RemoteResult<Response> {
        request
            .bearer_auth(&identity.access_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteUnavailable::Timeout
                } else {
                    RemoteUnavailable::Transport(e.to_string())
                }
            })
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> RemoteResult<T> {
        let resp = Self::check(resp).await?;
        resp.json()
            .await
            .map_err(|e| RemoteUnavailable::Decode(e.to_string()))
    }

    async fn check(resp: Response) -> RemoteResult<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(RemoteUnavailable::Status { status, message })
    }
}

fn instant_param(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<Option<ScheduleEntry>> {
        let request = self
            .client
            .get(self.url("/api/schedule/item"))
            .query(&[("key", key.as_str())]);
        let resp = self.send(identity, request).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(resp).await.map(Some)
    }

    async fn upsert(&self, identity: &Identity, entry: &ScheduleEntry) -> RemoteResult<()> {
        let request = self.client.put(self.url("/api/schedule")).json(entry);
        let resp = self.send(identity, request).await?;

        // Duplicate key: already stored.
        if resp.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        Self::check(resp).await.map(|_| ())
    }

    async fn list_all(&self, identity: &Identity) -> RemoteResult<Vec<ScheduleEntry>> {
        let request = self.client.get(self.url("/api/schedule"));
        let resp = self.send(identity, request).await?;
        let body: ScheduleListResponse = Self::decode(resp).await?;
        Ok(body.entries)
    }

    async fn list_due_between(
        &self,
        identity: &Identity,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> RemoteResult<Vec<ScheduleEntry>> {
        let mut query = vec![("due_until", instant_param(until))];
        if let Some(from) = from {
            query.push(("due_from", instant_param(from)));
        }

        let request = self.client.get(self.url("/api/schedule")).query(&query);
        let resp = self.send(identity, request).await?;
        let body: ScheduleListResponse = Self::decode(resp).await?;
        Ok(body.entries)
    }

    async fn delete(&self, identity: &Identity, key: &ItemKey) -> RemoteResult<bool> {
        let request = self
            .client
            .delete(self.url("/api/schedule/item"))
            .query(&[("key", key.as_str())]);
        let resp = self.send(identity, request).await?;
        let body: DeleteResponse = Self::decode(resp).await?;
        Ok(body.deleted_count > 0)
    }

    async fn delete_all(&self, identity: &Identity, prefix: Option<&str>) -> RemoteResult<usize> {
        let mut request = self.client.delete(self.url("/api/schedule"));
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        let resp = self.send(identity, request).await?;
        let body: DeleteResponse = Self::decode(resp).await?;
        Ok(body.deleted_count)
    }

    async fn append_history(
        &self,
        identity: &Identity,
        records: &[HistoryRecord],
    ) -> RemoteResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let request = self
            .client
            .post(self.url("/api/history"))
            .json(&AppendHistoryRequest { records });
        let resp = self.send(identity, request).await?;

        if resp.status() == StatusCode::CONFLICT {
            return Ok(0);
        }
        let body: AppendHistoryResponse = Self::decode(resp).await?;
        Ok(body.inserted_count)
    }

    async fn list_history(
        &self,
        identity: &Identity,
        item: Option<&ItemKey>,
        limit: Option<usize>,
    ) -> RemoteResult<Vec<HistoryRecord>> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(item) = item {
            query.push(("item_key", item.to_string()));
        }
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let request = self.client.get(self.url("/api/history")).query(&query);
        let resp = self.send(identity, request).await?;
        let body: HistoryListResponse = Self::decode(resp).await?;
        Ok(body.records)
    }

    async fn clear_history(
        &self,
        identity: &Identity,
        prefix: Option<&str>,
    ) -> RemoteResult<usize> {
        let mut request = self.client.delete(self.url("/api/history"));
        if let Some(prefix) = prefix {
            request = request.query(&[("prefix", prefix)]);
        }
        let resp = self.send(identity, request).await?;
        let body: DeleteResponse = Self::decode(resp).await?;
        Ok(body.deleted_count)
    }
}
