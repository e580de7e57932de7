//! Admin-directory lookup.
//!
//! An optional external collaborator: when configured, room creation asks a
//! remote HTTP endpoint for additional admin identities to seed alongside
//! the creator. The lookup runs before the registry takes the room lock and
//! every failure degrades to an empty list, so correctness never depends on
//! the directory being reachable.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

/// Source of seed admin identities for newly created rooms.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    /// Admin identities for a room; empty on any failure.
    async fn admins_for(&self, room: &str) -> Vec<String>;
}

/// Directory payload: `{"admins": ["alice", "bob"]}`.
#[derive(Debug, Deserialize)]
struct AdminList {
    #[serde(default)]
    admins: Vec<String>,
}

/// HTTP-backed admin directory.
pub struct HttpAdminDirectory {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAdminDirectory {
    /// Create a directory client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn fetch(&self, room: &str) -> Result<Vec<String>, reqwest::Error> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("room", room)])
            .send()
            .await?
            .error_for_status()?;

        let list: AdminList = response.json().await?;
        Ok(list.admins)
    }
}

#[async_trait]
impl AdminDirectory for HttpAdminDirectory {
    async fn admins_for(&self, room: &str) -> Vec<String> {
        match self.fetch(room).await {
            Ok(admins) => {
                debug!(room, count = admins.len(), "admin directory lookup");
                admins
            }
            Err(e) => {
                warn!(room, error = %e, "admin directory lookup failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/admins")
    }

    #[tokio::test]
    async fn test_lookup_returns_admins() {
        let app = Router::new().route(
            "/admins",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(params.get("room").map(String::as_str), Some("lobby"));
                Json(serde_json::json!({"admins": ["ops", "alice"]}))
            }),
        );
        let endpoint = serve(app).await;

        let directory = HttpAdminDirectory::new(endpoint, Duration::from_millis(500)).unwrap();
        let admins = directory.admins_for("lobby").await;
        assert_eq!(admins, vec!["ops", "alice"]);
    }

    #[tokio::test]
    async fn test_malformed_payload_yields_empty() {
        let app = Router::new().route("/admins", get(|| async { "not json" }));
        let endpoint = serve(app).await;

        let directory = HttpAdminDirectory::new(endpoint, Duration::from_millis(500)).unwrap();
        assert!(directory.admins_for("lobby").await.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_yields_empty() {
        let app = Router::new().route(
            "/admins",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let endpoint = serve(app).await;

        let directory = HttpAdminDirectory::new(endpoint, Duration::from_millis(500)).unwrap();
        assert!(directory.admins_for("lobby").await.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_empty() {
        // Nothing listens on this port.
        let directory = HttpAdminDirectory::new(
            "http://127.0.0.1:9/admins",
            Duration::from_millis(200),
        )
        .unwrap();
        assert!(directory.admins_for("lobby").await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_admins_field_yields_empty() {
        let app = Router::new().route(
            "/admins",
            get(|| async { Json(serde_json::json!({"unexpected": true})) }),
        );
        let endpoint = serve(app).await;

        let directory = HttpAdminDirectory::new(endpoint, Duration::from_millis(500)).unwrap();
        assert!(directory.admins_for("lobby").await.is_empty());
    }
}
