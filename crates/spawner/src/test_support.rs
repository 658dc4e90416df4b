// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted HTTP service, bundle fixtures and
//! an in-memory engine.

use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::cluster::bundle::{CredentialBundle, REQUIRED_FILES};
use crate::engine::{
    ContainerInfo, ContainerSpec, ContainerState, EngineConnector, EngineError, RemoteEngine,
};
use crate::oauth::client::OAuthClient;
use crate::oauth::token::{epoch_secs, TokenStore};
use crate::oauth::OAuthSettings;

/// Fixture directory with a CA, a client cert/key pair and a `docker.env`.
pub const TESTDATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata");

/// Endpoint named in `testdata/docker.env`.
pub const TEST_ENDPOINT: &str = "172.99.65.237:2376";

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self { status, body: value.to_string().into_bytes() }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self { status, body: body.as_bytes().to_vec() }
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }
}

/// A request seen by [`MockService`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct Script {
    replies: Vec<Reply>,
    calls: usize,
}

#[derive(Default)]
struct ServiceInner {
    scripts: Mutex<HashMap<(Method, String), Script>>,
    log: Mutex<Vec<Recorded>>,
}

/// Scripted HTTP service bound to a random local port.
///
/// Each `(method, path)` answers with its replies in order and repeats the
/// last one. Unscripted requests get a 404.
#[derive(Clone)]
pub struct MockService {
    pub addr: SocketAddr,
    inner: Arc<ServiceInner>,
}

impl MockService {
    pub async fn start() -> Self {
        let inner = Arc::new(ServiceInner::default());
        let app = Router::new().fallback(answer).with_state(Arc::clone(&inner));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Self { addr, inner }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn script(&self, method: Method, path: &str, replies: Vec<Reply>) -> &Self {
        self.inner
            .scripts
            .lock()
            .insert((method, path.to_owned()), Script { replies, calls: 0 });
        self
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.inner.log.lock().iter().filter(|r| r.method == method && r.path == path).count()
    }

    pub fn requests(&self, method: Method, path: &str) -> Vec<Recorded> {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.inner.log.lock().len()
    }
}

async fn answer(
    State(inner): State<Arc<ServiceInner>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned);
    let path = uri.path().to_owned();
    inner.log.lock().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        authorization: header("authorization"),
        accept: header("accept"),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let reply = {
        let mut scripts = inner.scripts.lock();
        match scripts.get_mut(&(method, path)) {
            Some(script) => {
                let idx = script.calls.min(script.replies.len().saturating_sub(1));
                script.calls += 1;
                script.replies.get(idx).cloned()
            }
            None => None,
        }
    };
    let reply = reply.unwrap_or_else(|| Reply::text(404, "not scripted"));
    (StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), reply.body)
}

/// Token endpoint success body.
pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "token_type": "bearer",
    })
}

pub fn oauth_settings(base_url: &str) -> OAuthSettings {
    OAuthSettings {
        base_url: base_url.to_owned(),
        client_id: "spawner-client".to_owned(),
        client_secret: "spawner-secret".to_owned(),
        callback_url: "http://hub.local/oauth/callback".to_owned(),
        request_timeout: Duration::from_secs(5),
    }
}

/// Client for `user` holding a token valid for an hour.
pub fn signed_in_client(base_url: &str, user: &str) -> OAuthClient {
    let tokens = TokenStore::new("access-1".into(), Some("refresh-1".into()), epoch_secs() + 3600);
    OAuthClient::with_tokens(oauth_settings(base_url), user, tokens)
}

/// ZIP archive laid out as the provisioning service serves it.
pub fn bundle_zip(top: &str) -> Vec<u8> {
    let files: Vec<(String, Vec<u8>)> = REQUIRED_FILES
        .iter()
        .map(|name| {
            let data = std::fs::read(Path::new(TESTDATA).join(name)).expect("read testdata");
            (format!("{top}/{name}"), data)
        })
        .collect();
    zip_of(&[format!("{top}/")], &files)
}

/// ZIP archive with the given directory and file entries.
pub fn zip_of(dirs: &[String], files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for dir in dirs {
        writer.add_directory(dir.as_str(), options).expect("add dir");
    }
    for (name, data) in files {
        writer.start_file(name.as_str(), options).expect("start file");
        writer.write_all(data).expect("write file");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Copy the fixture bundle into `dir`.
pub fn write_bundle(dir: &Path) {
    std::fs::create_dir_all(dir).expect("create bundle dir");
    for name in REQUIRED_FILES {
        std::fs::copy(Path::new(TESTDATA).join(name), dir.join(name)).expect("copy testdata");
    }
}

/// How [`MockEngine::inspect`] answers for an id.
#[derive(Debug, Clone)]
pub enum Inspect {
    Found(ContainerInfo),
    NotFound,
    Fail(u16, String),
}

/// In-memory engine that records every call.
#[derive(Default)]
pub struct MockEngine {
    pub calls: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ContainerSpec>>,
    inspect: Mutex<HashMap<String, Inspect>>,
    pull_error: Mutex<Option<String>>,
    pull_delay: Mutex<Option<Duration>>,
    next_id: Mutex<u32>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_inspect(&self, id: &str, answer: Inspect) {
        self.inspect.lock().insert(id.to_owned(), answer);
    }

    pub fn fail_pull(&self, message: &str) {
        *self.pull_error.lock() = Some(message.to_owned());
    }

    /// Make every pull take `delay`.
    pub fn slow_pull(&self, delay: Duration) {
        *self.pull_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

pub fn running_info(id: &str) -> ContainerInfo {
    ContainerInfo {
        id: id.to_owned(),
        state: ContainerState { running: true, ..Default::default() },
        node_ip: Some("172.99.65.237".to_owned()),
        host_port: Some(32768),
    }
}

#[async_trait]
impl RemoteEngine for MockEngine {
    async fn inspect(&self, id: &str) -> Result<ContainerInfo, EngineError> {
        self.record(format!("inspect {id}"));
        match self.inspect.lock().get(id).cloned() {
            Some(Inspect::Found(info)) => Ok(info),
            Some(Inspect::Fail(status, message)) => Err(EngineError::Api { status, message }),
            Some(Inspect::NotFound) | None => Err(EngineError::NotFound(id.to_owned())),
        }
    }

    async fn pull(&self, image: &str) -> Result<(), EngineError> {
        self.record(format!("pull {image}"));
        let delay = *self.pull_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.pull_error.lock().clone() {
            Some(message) => Err(EngineError::Api { status: 500, message }),
            None => Ok(()),
        }
    }

    async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.record(format!("create {}", spec.name));
        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("container-{}", *next)
        };
        self.created.lock().push(spec.clone());
        self.set_inspect(&id, Inspect::Found(running_info(&id)));
        Ok(id)
    }

    async fn stop(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("stop {id}"));
        let mut map = self.inspect.lock();
        if let Some(Inspect::Found(info)) = map.get_mut(id) {
            info.state.running = false;
            info.state.finished_at = "2026-01-01T00:00:00Z".to_owned();
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.record(format!("remove {id}"));
        self.inspect.lock().remove(id);
        Ok(())
    }
}

/// Connector handing out one shared [`MockEngine`].
pub struct MockConnector {
    pub engine: Arc<MockEngine>,
    pub endpoints: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn new(engine: Arc<MockEngine>) -> Arc<Self> {
        Arc::new(Self { engine, endpoints: Mutex::new(Vec::new()) })
    }
}

impl EngineConnector for MockConnector {
    fn connect(&self, bundle: &CredentialBundle) -> Result<Arc<dyn RemoteEngine>, EngineError> {
        self.endpoints.lock().push(bundle.endpoint());
        Ok(Arc::clone(&self.engine) as Arc<dyn RemoteEngine>)
    }
}
