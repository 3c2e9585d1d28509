//! Remote board CRUD client.
//!
//! Plain reqwest against the deployed board API. Every request carries the
//! bearer token when one is configured; a 401 answer to an authenticated
//! request is retried once without the token, because the deployed CRUD
//! tolerates anonymous clients and some reverse proxies reject stale
//! tokens outright.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::json;

use crate::errors::StoreError;

use super::models::{BacklogPatch, BacklogProject, Board, Column, NewTask, Task, TaskPatch};
use super::store::BoardStore;

const BOARD_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpBoardStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBoardStore {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(BOARD_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        with_token: bool,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if with_token && let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        req
    }

    /// Send a request, retrying once without the bearer token when an
    /// authenticated attempt comes back 401.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .request(method.clone(), path, body.as_ref(), true)
            .send()
            .await?;

        let resp = if resp.status() == StatusCode::UNAUTHORIZED && self.token.is_some() {
            self.request(method, path, body.as_ref(), false)
                .send()
                .await?
        } else {
            resp
        };

        if !resp.status().is_success() {
            return Err(StoreError::Http {
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        Ok(self.send(Method::GET, path, None).await?.json().await?)
    }

    async fn send_body(
        &self,
        method: Method,
        path: &str,
        body: &impl Serialize,
    ) -> Result<reqwest::Response, StoreError> {
        self.send(method, path, Some(serde_json::to_value(body)?))
            .await
    }
}

#[async_trait]
impl BoardStore for HttpBoardStore {
    async fn get_board(&self) -> Result<Board, StoreError> {
        self.get_json("/api/board").await
    }

    async fn save_board(&self, board: &Board) -> Result<(), StoreError> {
        // The server owns the backlog; send its current version back so a
        // full-document POST can never clobber it.
        let mut outgoing = board.clone();
        outgoing.backlog = self.get_board().await?.backlog;
        self.send_body(Method::POST, "/api/board", &outgoing).await?;
        Ok(())
    }

    async fn list_backlog(&self) -> Result<Vec<BacklogProject>, StoreError> {
        self.get_json("/api/backlog").await
    }

    async fn update_backlog(&self, id: &str, patch: &BacklogPatch) -> Result<(), StoreError> {
        self.send_body(Method::PUT, &format!("/api/backlog/{}", id), patch)
            .await?;
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        self.get_json("/api/tasks").await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task, StoreError> {
        Ok(self
            .send_body(Method::POST, "/api/tasks", task)
            .await?
            .json()
            .await?)
    }

    async fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.send_body(Method::PUT, &format!("/api/tasks/{}", id), patch)
            .await?;
        Ok(())
    }

    async fn move_task(&self, id: &str, target_column_id: &str) -> Result<(), StoreError> {
        self.send(
            Method::PUT,
            &format!("/api/tasks/{}/move", id),
            Some(json!({ "targetColumnId": target_column_id })),
        )
        .await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        self.send(Method::DELETE, &format!("/api/tasks/{}", id), None)
            .await?;
        Ok(())
    }

    async fn create_column(&self, title: &str) -> Result<Column, StoreError> {
        Ok(self
            .send(
                Method::POST,
                "/api/columns",
                Some(json!({ "title": title })),
            )
            .await?
            .json()
            .await?)
    }

    async fn list_columns(&self) -> Result<Vec<Column>, StoreError> {
        self.get_json("/api/columns").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let store = HttpBoardStore::new("https://board.example/", None);
        assert_eq!(store.base_url, "https://board.example");
    }

    #[test]
    fn request_without_token_has_no_auth_header() {
        let store = HttpBoardStore::new("https://board.example", None);
        let req = store
            .request(Method::GET, "/api/board", None, true)
            .build()
            .unwrap();
        assert!(req.headers().get("authorization").is_none());
    }

    #[test]
    fn retry_variant_drops_auth_header() {
        let store = HttpBoardStore::new("https://board.example", Some("secret".into()));
        let with = store
            .request(Method::GET, "/api/board", None, true)
            .build()
            .unwrap();
        assert!(with.headers().get("authorization").is_some());

        let without = store
            .request(Method::GET, "/api/board", None, false)
            .build()
            .unwrap();
        assert!(without.headers().get("authorization").is_none());
    }
}
