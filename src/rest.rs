//! REST-backed document store with rate limiting and retry.
//!
//! Implements the store contract against a slash-path document API:
//! `GET/PUT/PATCH/DELETE {base}/{docPath}`, `GET/POST {base}/{collection}`,
//! and `POST {base}/batch` for atomic batches. Transport concerns carry a
//! deliberate policy the rest of the crate does not have:
//!
//! - Sliding-window rate limiting (burst and sustained)
//! - Bounded retry with exponential backoff on 429 and 5xx
//! - Connection pooling via a shared client
//!
//! The API has no push channel, so subscriptions poll on a fixed interval
//! driven by an owned tokio runtime and deliver a snapshot only when its
//! content actually changed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::Engine as _;
use log::{debug, info, warn};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::error::{Result, TripPlanError};
use crate::store::{
    ensure_collection_path, ensure_document_path, CollectionCallback, Document,
    DocumentCallback, DocumentStore, Fields, WatchHandle, WriteBatch,
};

// API rate limits
const BURST_LIMIT: u32 = 20; // Max requests per second
const SUSTAINED_LIMIT: u32 = 150; // Max requests per 10 seconds
const WINDOW_MS: u64 = 10_000; // 10 second window

const MAX_RETRIES: u32 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the REST store.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: String,
    /// How often live subscriptions poll for changes.
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl RestConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Rate limiter using a sliding window.
struct RateLimiter {
    request_times: AsyncMutex<VecDeque<Instant>>,
    consecutive_429s: AtomicU32,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            request_times: AsyncMutex::new(VecDeque::with_capacity(
                SUSTAINED_LIMIT as usize + 10,
            )),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    async fn wait_if_needed(&self) {
        loop {
            let wait_time = {
                let mut times = self.request_times.lock().await;
                let now = Instant::now();

                // Prune requests that fell out of the window.
                let cutoff = now - Duration::from_millis(WINDOW_MS);
                while times.front().map_or(false, |&t| t < cutoff) {
                    times.pop_front();
                }

                if times.len() >= SUSTAINED_LIMIT as usize {
                    times.front().and_then(|&oldest| {
                        let wait_until = oldest + Duration::from_millis(WINDOW_MS);
                        wait_until.checked_duration_since(now)
                    })
                } else {
                    let one_sec_ago = now - Duration::from_secs(1);
                    let in_last_second = times.iter().filter(|&&t| t > one_sec_ago).count();
                    if in_last_second >= BURST_LIMIT as usize {
                        times.iter().find(|&&t| t > one_sec_ago).and_then(|&first| {
                            let wait_until = first + Duration::from_secs(1);
                            wait_until.checked_duration_since(now)
                        })
                    } else {
                        None
                    }
                }
            };

            match wait_time {
                Some(duration) => {
                    debug!("[RestStore] rate limit: waiting {:?}", duration);
                    tokio::time::sleep(duration).await;
                }
                None => break,
            }
        }
    }

    async fn record_request(&self) {
        let mut times = self.request_times.lock().await;
        times.push_back(Instant::now());
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    /// Register a 429 and return how long to back off: 2s, 4s, 8s, 16s.
    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        let backoff_ms = 1000 * (1u64 << count.min(4));
        Duration::from_millis(backoff_ms)
    }
}

/// Backoff for transport-level failures (connect errors, timeouts).
fn transport_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1u64 << attempt.min(4)))
}

/// Whether a payload differs from the last delivered one.
fn should_deliver(last: &Option<Value>, next: &Value) -> bool {
    last.as_ref() != Some(next)
}

enum RestWatcher {
    Document {
        id: u64,
        path: String,
        callback: DocumentCallback,
        last: Option<Value>,
    },
    Collection {
        id: u64,
        path: String,
        callback: CollectionCallback,
        last: Option<Value>,
    },
}

impl RestWatcher {
    fn id(&self) -> u64 {
        match self {
            RestWatcher::Document { id, .. } => *id,
            RestWatcher::Collection { id, .. } => *id,
        }
    }
}

struct RestInner {
    client: Client,
    base_url: String,
    auth_header: String,
    rate_limiter: RateLimiter,
    watchers: Mutex<Vec<RestWatcher>>,
    next_watcher_id: AtomicU64,
}

/// REST implementation of the document store contract.
pub struct RestStore {
    inner: Arc<RestInner>,
    runtime: Runtime,
    poll_task: tokio::task::JoinHandle<()>,
}

fn http_err(e: reqwest::Error) -> TripPlanError {
    TripPlanError::Http {
        message: e.to_string(),
        status_code: e.status().map(|s| s.as_u16()),
    }
}

fn url_for(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

fn check_ok(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TripPlanError::Http {
            message: format!("{} returned {}", context, status),
            status_code: Some(status.as_u16()),
        })
    }
}

async fn send_with_retry(
    inner: &RestInner,
    method: Method,
    url: &str,
    body: Option<&Value>,
) -> Result<Response> {
    let mut attempt = 0u32;
    loop {
        inner.rate_limiter.wait_if_needed().await;

        let mut request = inner
            .client
            .request(method.clone(), url)
            .header("Authorization", &inner.auth_header);
        if let Some(body) = body {
            request = request.json(body);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < MAX_RETRIES {
                        let backoff = inner.rate_limiter.record_429();
                        warn!(
                            "[RestStore] {} {} -> {}, retrying in {:?}",
                            method, url, status, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(TripPlanError::Http {
                        message: format!(
                            "{} {} still failing after {} retries",
                            method, url, MAX_RETRIES
                        ),
                        status_code: Some(status.as_u16()),
                    });
                }
                inner.rate_limiter.record_request().await;
                return Ok(response);
            }
            Err(e) => {
                if attempt < MAX_RETRIES {
                    let backoff = transport_backoff(attempt);
                    warn!(
                        "[RestStore] {} {} transport error ({}), retrying in {:?}",
                        method, url, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
                return Err(http_err(e));
            }
        }
    }
}

async fn fetch_document(inner: &RestInner, path: &str) -> Result<Option<Document>> {
    let url = url_for(&inner.base_url, path);
    let response = send_with_retry(inner, Method::GET, &url, None).await?;
    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let response = check_ok(response, &url)?;
    let doc = response.json::<Document>().await.map_err(http_err)?;
    Ok(Some(doc))
}

async fn fetch_collection(inner: &RestInner, path: &str) -> Result<Vec<Document>> {
    let url = url_for(&inner.base_url, path);
    let response = send_with_retry(inner, Method::GET, &url, None).await?;
    let response = check_ok(response, &url)?;
    response.json::<Vec<Document>>().await.map_err(http_err)
}

#[derive(Deserialize)]
struct CreatedResponse {
    id: String,
}

enum Fetched {
    Document(Option<Document>),
    Collection(Vec<Document>),
}

/// One change-poll cycle over every registered watcher.
async fn poll_once(inner: &Arc<RestInner>) {
    let targets: Vec<(u64, bool, String)> = {
        let watchers = inner.watchers.lock().unwrap();
        watchers
            .iter()
            .map(|w| match w {
                RestWatcher::Document { id, path, .. } => (*id, true, path.clone()),
                RestWatcher::Collection { id, path, .. } => (*id, false, path.clone()),
            })
            .collect()
    };
    if targets.is_empty() {
        return;
    }

    let results = futures::future::join_all(targets.iter().map(|(id, is_doc, path)| {
        let inner = Arc::clone(inner);
        let path = path.clone();
        let id = *id;
        let is_doc = *is_doc;
        async move {
            let fetched = if is_doc {
                fetch_document(&inner, &path).await.map(Fetched::Document)
            } else {
                fetch_collection(&inner, &path).await.map(Fetched::Collection)
            };
            (id, fetched)
        }
    }))
    .await;

    for (id, fetched) in results {
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!("[RestStore] poll fetch for watcher #{} failed: {}", id, e);
                continue;
            }
        };

        let fingerprint = match &fetched {
            Fetched::Document(doc) => serde_json::to_value(doc).unwrap_or(Value::Null),
            Fetched::Collection(docs) => serde_json::to_value(docs).unwrap_or(Value::Null),
        };

        // Decide under the lock, invoke outside it.
        enum Pending {
            Document(DocumentCallback, Option<Document>),
            Collection(CollectionCallback, Vec<Document>),
        }
        let pending = {
            let mut watchers = inner.watchers.lock().unwrap();
            match (watchers.iter_mut().find(|w| w.id() == id), fetched) {
                (
                    Some(RestWatcher::Document { callback, last, .. }),
                    Fetched::Document(doc),
                ) if should_deliver(last, &fingerprint) => {
                    *last = Some(fingerprint);
                    Some(Pending::Document(Arc::clone(callback), doc))
                }
                (
                    Some(RestWatcher::Collection { callback, last, .. }),
                    Fetched::Collection(docs),
                ) if should_deliver(last, &fingerprint) => {
                    *last = Some(fingerprint);
                    Some(Pending::Collection(Arc::clone(callback), docs))
                }
                _ => None,
            }
        };

        match pending {
            Some(Pending::Document(callback, doc)) => callback(doc),
            Some(Pending::Collection(callback, docs)) => callback(docs),
            None => {}
        }
    }
}

async fn poll_loop(inner: Arc<RestInner>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        poll_once(&inner).await;
    }
}

impl RestStore {
    /// Connect to a document API.
    pub fn new(config: RestConfig) -> Result<Self> {
        let auth = base64::engine::general_purpose::STANDARD
            .encode(format!("API_KEY:{}", config.api_key));

        let client = Client::builder()
            .pool_max_idle_per_host(8)
            .timeout(config.request_timeout)
            .build()
            .map_err(http_err)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| TripPlanError::Initialization {
                message: format!("failed to start runtime: {}", e),
            })?;

        let inner = Arc::new(RestInner {
            client,
            base_url: config.base_url.clone(),
            auth_header: format!("Basic {}", auth),
            rate_limiter: RateLimiter::new(),
            watchers: Mutex::new(Vec::new()),
            next_watcher_id: AtomicU64::new(0),
        });

        let poll_inner = Arc::clone(&inner);
        let poll_task = runtime.spawn(poll_loop(poll_inner, config.poll_interval));

        info!(
            "[RestStore] connected to {} (poll every {:?})",
            config.base_url, config.poll_interval
        );

        Ok(Self {
            inner,
            runtime,
            poll_task,
        })
    }

    /// Run a store future to completion from the caller's thread.
    ///
    /// Must not be called from inside the store's own runtime (callbacks
    /// are invoked from it); synchronizer callbacks only touch their local
    /// mirrors, so this does not come up in practice.
    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    fn unregister(inner: &Arc<RestInner>, watcher_id: u64) {
        let mut watchers = inner.watchers.lock().unwrap();
        watchers.retain(|w| w.id() != watcher_id);
    }
}

impl Drop for RestStore {
    fn drop(&mut self) {
        self.poll_task.abort();
    }
}

impl DocumentStore for RestStore {
    fn allocate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn get_document(&self, path: &str) -> Result<Option<Document>> {
        ensure_document_path(path)?;
        self.block_on(fetch_document(&self.inner, path))
    }

    fn list_documents(&self, collection: &str) -> Result<Vec<Document>> {
        ensure_collection_path(collection)?;
        self.block_on(fetch_collection(&self.inner, collection))
    }

    fn set_document(&self, path: &str, data: Fields) -> Result<()> {
        ensure_document_path(path)?;
        let url = url_for(&self.inner.base_url, path);
        let body = Value::Object(data);
        self.block_on(async {
            let response = send_with_retry(&self.inner, Method::PUT, &url, Some(&body)).await?;
            check_ok(response, &url).map(|_| ())
        })
    }

    fn update_document(&self, path: &str, fields: Fields) -> Result<()> {
        ensure_document_path(path)?;
        let url = url_for(&self.inner.base_url, path);
        let body = Value::Object(fields);
        self.block_on(async {
            let response = send_with_retry(&self.inner, Method::PATCH, &url, Some(&body)).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(TripPlanError::NotFound {
                    path: path.to_string(),
                });
            }
            check_ok(response, &url).map(|_| ())
        })
    }

    fn delete_document(&self, path: &str) -> Result<()> {
        ensure_document_path(path)?;
        let url = url_for(&self.inner.base_url, path);
        self.block_on(async {
            let response = send_with_retry(&self.inner, Method::DELETE, &url, None).await?;
            // Deleting an absent document is not an error.
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(());
            }
            check_ok(response, &url).map(|_| ())
        })
    }

    fn add_document(&self, collection: &str, data: Fields) -> Result<String> {
        ensure_collection_path(collection)?;
        let url = url_for(&self.inner.base_url, collection);
        let body = Value::Object(data);
        self.block_on(async {
            let response = send_with_retry(&self.inner, Method::POST, &url, Some(&body)).await?;
            let response = check_ok(response, &url)?;
            let created = response.json::<CreatedResponse>().await.map_err(http_err)?;
            Ok(created.id)
        })
    }

    fn commit_batch(&self, batch: WriteBatch) -> Result<()> {
        for op in batch.ops() {
            ensure_document_path(op.path())?;
        }
        let url = url_for(&self.inner.base_url, "batch");
        let body = serde_json::to_value(&batch).map_err(|e| TripPlanError::Store {
            message: e.to_string(),
        })?;
        self.block_on(async {
            let response = send_with_retry(&self.inner, Method::POST, &url, Some(&body)).await?;
            match response.status() {
                StatusCode::CONFLICT => Err(TripPlanError::PreconditionFailed {
                    message: "batch precondition failed".to_string(),
                }),
                StatusCode::NOT_FOUND => {
                    let path = response.text().await.unwrap_or_default();
                    Err(TripPlanError::NotFound {
                        path: if path.is_empty() {
                            "(unknown)".to_string()
                        } else {
                            path
                        },
                    })
                }
                _ => check_ok(response, &url).map(|_| ()),
            }
        })
    }

    fn watch_document(&self, path: &str, callback: DocumentCallback) -> Result<WatchHandle> {
        ensure_document_path(path)?;
        let initial = self.block_on(fetch_document(&self.inner, path))?;
        let fingerprint = serde_json::to_value(&initial).unwrap_or(Value::Null);

        let id = self.inner.next_watcher_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut watchers = self.inner.watchers.lock().unwrap();
            watchers.push(RestWatcher::Document {
                id,
                path: path.to_string(),
                callback: Arc::clone(&callback),
                last: Some(fingerprint),
            });
        }
        debug!("[RestStore] watch document '{}' (#{})", path, id);

        callback(initial);

        let inner = Arc::clone(&self.inner);
        Ok(WatchHandle::new(move || {
            RestStore::unregister(&inner, id);
        }))
    }

    fn watch_collection(
        &self,
        collection: &str,
        callback: CollectionCallback,
    ) -> Result<WatchHandle> {
        ensure_collection_path(collection)?;
        let initial = self.block_on(fetch_collection(&self.inner, collection))?;
        let fingerprint = serde_json::to_value(&initial).unwrap_or(Value::Null);

        let id = self.inner.next_watcher_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut watchers = self.inner.watchers.lock().unwrap();
            watchers.push(RestWatcher::Collection {
                id,
                path: collection.to_string(),
                callback: Arc::clone(&callback),
                last: Some(fingerprint),
            });
        }
        debug!("[RestStore] watch collection '{}' (#{})", collection, id);

        callback(initial);

        let inner = Arc::clone(&self.inner);
        Ok(WatchHandle::new(move || {
            RestStore::unregister(&inner, id);
        }))
    }
}
