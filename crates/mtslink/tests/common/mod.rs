#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct MediaFile {
    status: StatusCode,
    body: Vec<u8>,
    delay: Option<Duration>,
    /// Send `body` as the first chunk, then never finish the response.
    stall: bool,
}

#[derive(Debug, Clone)]
struct MockState {
    manifest: Arc<Mutex<(StatusCode, String)>>,
    media: Arc<Mutex<HashMap<String, MediaFile>>>,
    media_hits: Arc<AtomicUsize>,
    manifest_hits: Arc<AtomicUsize>,
    cookies: Arc<Mutex<Vec<String>>>,
}

/// In-process stand-in for the MTS Link API and its media CDN.
pub struct MockServer {
    pub base_url: String,
    state: MockState,
}

async fn manifest_handler(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.manifest_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        state.cookies.lock().push(cookie.to_string());
    }
    let (status, body) = state.manifest.lock().clone();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn media_handler(State(state): State<MockState>, Path(name): Path<String>) -> Response {
    state.media_hits.fetch_add(1, Ordering::SeqCst);
    let file = state.media.lock().get(&name).cloned();
    let Some(file) = file else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(delay) = file.delay {
        tokio::time::sleep(delay).await;
    }
    if file.stall {
        let first = futures::stream::once(async move {
            Ok::<_, std::io::Error>(Bytes::from(file.body))
        });
        let body = Body::from_stream(first.chain(futures::stream::pending()));
        return (file.status, body).into_response();
    }
    (file.status, file.body).into_response()
}

impl MockServer {
    pub async fn start() -> Self {
        let state = MockState {
            manifest: Arc::new(Mutex::new((StatusCode::NOT_FOUND, String::new()))),
            media: Arc::new(Mutex::new(HashMap::new())),
            media_hits: Arc::new(AtomicUsize::new(0)),
            manifest_hits: Arc::new(AtomicUsize::new(0)),
            cookies: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/api/eventsessions/{session}/record", get(manifest_handler))
            .route(
                "/api/event-sessions/{session}/record-files/{record}/flow",
                get(manifest_handler),
            )
            .route("/media/{name}", get(media_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn set_manifest(&self, status: StatusCode, body: impl Into<String>) {
        *self.state.manifest.lock() = (status, body.into());
    }

    pub fn set_manifest_json(&self, body: Value) {
        self.set_manifest(StatusCode::OK, body.to_string());
    }

    pub fn add_media(&self, name: &str, body: &[u8]) {
        self.add_media_with(name, StatusCode::OK, body, None);
    }

    pub fn add_media_with(
        &self,
        name: &str,
        status: StatusCode,
        body: &[u8],
        delay: Option<Duration>,
    ) {
        self.state.media.lock().insert(
            name.to_string(),
            MediaFile {
                status,
                body: body.to_vec(),
                delay,
                stall: false,
            },
        );
    }

    /// Serve `first_chunk` and then hold the connection open forever.
    pub fn add_stalling_media(&self, name: &str, first_chunk: &[u8]) {
        self.state.media.lock().insert(
            name.to_string(),
            MediaFile {
                status: StatusCode::OK,
                body: first_chunk.to_vec(),
                delay: None,
                stall: true,
            },
        );
    }

    pub fn media_url(&self, name: &str) -> String {
        format!("{}/media/{name}", self.base_url)
    }

    pub fn media_hits(&self) -> usize {
        self.state.media_hits.load(Ordering::SeqCst)
    }

    pub fn manifest_hits(&self) -> usize {
        self.state.manifest_hits.load(Ordering::SeqCst)
    }

    pub fn cookies(&self) -> Vec<String> {
        self.state.cookies.lock().clone()
    }
}
