//! API server lifecycle: bind → spawn background task → return handle with
//! shutdown channel.

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::api::types::ApiContext;

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Signal graceful shutdown. In-flight requests finish first.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }

    /// Wait for the server task to exit.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("API server task failed: {e}");
            }
        }
    }
}

/// Bind `addr` (port 0 picks an ephemeral port) and serve the API router
/// in a background tokio task.
pub async fn start_server(ctx: ApiContext, addr: SocketAddr) -> Result<ApiServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server on {addr}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let app = api_router(ctx);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::fixtures::{partial_drawing, test_context};
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let mut server = start_server(test_context(), localhost())
            .await
            .expect("server should start");
        assert!(server.port() > 0);

        let url = format!("http://127.0.0.1:{}/api/health", server.port());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn score_round_trip_over_http() {
        let mut server = start_server(test_context(), localhost())
            .await
            .expect("server should start");
        let port = server.port();
        let client = reqwest::Client::new();

        let scored: serde_json::Value = client
            .post(format!("http://127.0.0.1:{port}/api/score"))
            .json(&serde_json::json!({
                "drawing": partial_drawing(),
                "characterId": "character1",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let id = scored["resultId"].as_str().unwrap();

        let resp = client
            .get(format!("http://127.0.0.1:{port}/api/result/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let result: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(result["score"], scored["score"]);

        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let mut server = start_server(test_context(), localhost())
            .await
            .expect("server should start");
        let url = format!("http://127.0.0.1:{}/nonexistent", server.port());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
        server.shutdown();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut server = start_server(test_context(), localhost())
            .await
            .expect("server should start");
        server.shutdown();
        server.shutdown();
        server.stopped().await;
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let mut first = start_server(test_context(), localhost()).await.unwrap();
        let taken = first.addr;
        let err = start_server(test_context(), taken).await.err().unwrap();
        assert!(err.contains("Failed to bind"));
        first.shutdown();
    }
}
