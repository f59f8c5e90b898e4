//! Test doubles for backends, health probes and upstream streams.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{stream, Stream};

use crate::backend::{Backend, ByteStream};
use crate::error::BackendError;
use crate::model::{AssetId, AssetMetadata, BackendMode, Credential};
use crate::range::RangeSpec;
use crate::service::health::HealthProbe;

// ---------------------------------------------------------------------------
// MockBackend
// ---------------------------------------------------------------------------

/// In-memory backend serving one asset's bytes for any id.
pub struct MockBackend {
    mode: BackendMode,
    metadata: AssetMetadata,
    data: Vec<u8>,
    chunk_size: usize,
    metadata_failures: Mutex<VecDeque<BackendError>>,
    stream_failure: Mutex<Option<BackendError>>,
    stream_override: Mutex<Option<ByteStream>>,
    metadata_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    last_range: Mutex<Option<Option<RangeSpec>>>,
    last_credential: Mutex<Option<String>>,
}

impl MockBackend {
    pub fn with_bytes(mode: BackendMode, name: &str, mime_type: &str, data: Vec<u8>) -> Self {
        Self {
            mode,
            metadata: AssetMetadata {
                name: name.to_string(),
                mime_type: mime_type.to_string(),
                size_bytes: data.len() as u64,
            },
            data,
            chunk_size: 7,
            metadata_failures: Mutex::new(VecDeque::new()),
            stream_failure: Mutex::new(None),
            stream_override: Mutex::new(None),
            metadata_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            last_range: Mutex::new(None),
            last_credential: Mutex::new(None),
        }
    }

    /// Queue errors returned by the next metadata calls, in order.
    pub fn fail_metadata(&self, errors: Vec<BackendError>) {
        self.metadata_failures.lock().unwrap().extend(errors);
    }

    /// Make the next `get_stream` call fail.
    pub fn fail_stream(&self, error: BackendError) {
        *self.stream_failure.lock().unwrap() = Some(error);
    }

    /// Serve `stream` on the next `get_stream` call instead of the stored bytes.
    pub fn override_stream(&self, stream: ByteStream) {
        *self.stream_override.lock().unwrap() = Some(stream);
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Range passed to the last `get_stream` call (outer `None`: never called).
    pub fn last_range(&self) -> Option<Option<RangeSpec>> {
        *self.last_range.lock().unwrap()
    }

    pub fn last_credential(&self) -> Option<String> {
        self.last_credential.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    fn mode(&self) -> BackendMode {
        self.mode
    }

    async fn get_metadata(
        &self,
        _asset: &AssetId,
        credential: Option<&Credential>,
    ) -> Result<AssetMetadata, BackendError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credential.lock().unwrap() = credential.map(|c| c.expose().to_string());
        if let Some(err) = self.metadata_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(self.metadata.clone())
    }

    async fn get_stream(
        &self,
        _asset: &AssetId,
        _credential: Option<&Credential>,
        range: Option<RangeSpec>,
    ) -> Result<ByteStream, BackendError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_range.lock().unwrap() = Some(range);
        if let Some(err) = self.stream_failure.lock().unwrap().take() {
            return Err(err);
        }
        if let Some(s) = self.stream_override.lock().unwrap().take() {
            return Ok(s);
        }

        let slice = match range {
            Some(spec) => self.data[spec.start as usize..=spec.end as usize].to_vec(),
            None => self.data.clone(),
        };
        let chunks: Vec<Result<Bytes, BackendError>> = slice
            .chunks(self.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

// ---------------------------------------------------------------------------
// StaticProbe
// ---------------------------------------------------------------------------

/// Health probe with fixed answers per mode that records every call.
pub struct StaticProbe {
    local: bool,
    web: bool,
    calls: Mutex<Vec<BackendMode>>,
}

impl StaticProbe {
    pub fn new(local: bool, web: bool) -> Self {
        Self {
            local,
            web,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<BackendMode> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HealthProbe for StaticProbe {
    async fn probe(&self, mode: BackendMode, _base_url: &str) -> bool {
        self.calls.lock().unwrap().push(mode);
        match mode {
            BackendMode::Local => self.local,
            BackendMode::Web => self.web,
        }
    }
}

// ---------------------------------------------------------------------------
// CountingStream
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    reads: AtomicUsize,
    reads_after_drop: AtomicUsize,
    dropped: AtomicBool,
}

/// Observer for a [`CountingStream`] that outlives it.
#[derive(Clone)]
pub struct StreamProbe(Arc<Counters>);

impl StreamProbe {
    pub fn reads(&self) -> usize {
        self.0.reads.load(Ordering::SeqCst)
    }

    pub fn reads_after_drop(&self) -> usize {
        self.0.reads_after_drop.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> bool {
        self.0.dropped.load(Ordering::SeqCst)
    }
}

/// Endless upstream yielding `chunk_size` zero bytes per read.
pub struct CountingStream {
    chunk_size: usize,
    counters: Arc<Counters>,
}

impl CountingStream {
    pub fn new(chunk_size: usize) -> (Self, StreamProbe) {
        let counters = Arc::new(Counters::default());
        let stream = Self {
            chunk_size,
            counters: Arc::clone(&counters),
        };
        (stream, StreamProbe(counters))
    }
}

impl Stream for CountingStream {
    type Item = Result<Bytes, BackendError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.counters.dropped.load(Ordering::SeqCst) {
            self.counters.reads_after_drop.fetch_add(1, Ordering::SeqCst);
        }
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Some(Ok(Bytes::from(vec![0u8; self.chunk_size]))))
    }
}

impl Drop for CountingStream {
    fn drop(&mut self) {
        self.counters.dropped.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Live upstream
// ---------------------------------------------------------------------------

/// Serve `app` on an ephemeral localhost port; returns its base URL.
pub async fn serve_upstream(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Drain a byte stream into one buffer, failing on any error.
pub async fn collect_stream(stream: ByteStream) -> Vec<u8> {
    use futures_util::StreamExt;
    stream
        .map(|chunk| chunk.unwrap())
        .collect::<Vec<Bytes>>()
        .await
        .concat()
}
