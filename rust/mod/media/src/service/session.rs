use std::time::{Duration, Instant};

use axum::body::Body;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{error, info};

use crate::backend::ByteStream;
use crate::error::BackendError;
use crate::model::{AssetId, BackendMode};

/// How a stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every advertised byte was handed to the response.
    Completed,
    /// The client went away before the last byte.
    Aborted,
    /// Upstream errored, stalled or ended early after headers were sent.
    Failed,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamOutcome::Completed => "completed",
            StreamOutcome::Aborted => "aborted",
            StreamOutcome::Failed => "mid_stream_failure",
        }
    }
}

/// One request's exclusive hold on an upstream byte stream.
///
/// Bytes are pulled only when the response body is polled, so the socket's
/// write readiness paces upstream reads. The session yields at most
/// `expected` bytes, bounds every upstream read by `idle_timeout`, and
/// releases the upstream handle as soon as it finishes. Dropping it early
/// (client disconnect) drops the upstream handle with it.
pub struct StreamSession {
    upstream: Option<ByteStream>,
    asset: AssetId,
    mode: BackendMode,
    expected: u64,
    sent: u64,
    idle_timeout: Duration,
    started: Instant,
    outcome: Option<StreamOutcome>,
}

impl StreamSession {
    pub fn new(
        upstream: ByteStream,
        asset: AssetId,
        mode: BackendMode,
        expected: u64,
        idle_timeout: Duration,
    ) -> Self {
        let mut session = Self {
            upstream: Some(upstream),
            asset,
            mode,
            expected,
            sent: 0,
            idle_timeout,
            started: Instant::now(),
            outcome: None,
        };
        if expected == 0 {
            session.finish(StreamOutcome::Completed, None);
        }
        session
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    /// Pull the next chunk for the client. `None` once the session is over.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes, BackendError>> {
        if self.outcome.is_some() {
            return None;
        }
        let remaining = self.expected - self.sent;
        let upstream = self.upstream.as_mut()?;

        match tokio::time::timeout(self.idle_timeout, upstream.next()).await {
            Err(_) => {
                let err = BackendError::Timeout {
                    timeout_secs: self.idle_timeout.as_secs(),
                };
                self.finish(StreamOutcome::Failed, Some(&err));
                Some(Err(err))
            }
            Ok(None) => {
                let err = BackendError::Malformed(format!(
                    "upstream ended after {} of {} bytes",
                    self.sent, self.expected
                ));
                self.finish(StreamOutcome::Failed, Some(&err));
                Some(Err(err))
            }
            Ok(Some(Err(err))) => {
                self.finish(StreamOutcome::Failed, Some(&err));
                Some(Err(err))
            }
            Ok(Some(Ok(mut chunk))) => {
                if chunk.len() as u64 > remaining {
                    chunk.truncate(remaining as usize);
                }
                self.sent += chunk.len() as u64;
                if self.sent == self.expected {
                    self.finish(StreamOutcome::Completed, None);
                }
                Some(Ok(chunk))
            }
        }
    }

    /// Hand the session to axum as a response body.
    pub fn into_body(self) -> Body {
        Body::from_stream(futures_util::stream::unfold(self, |mut session| async move {
            let item = session.next_chunk().await?;
            Some((item, session))
        }))
    }

    fn finish(&mut self, outcome: StreamOutcome, err: Option<&BackendError>) {
        self.outcome = Some(outcome);
        // Close the upstream connection now rather than when the body is dropped.
        self.upstream = None;

        let duration_ms = self.started.elapsed().as_millis() as u64;
        match outcome {
            StreamOutcome::Completed | StreamOutcome::Aborted => info!(
                asset = %self.asset,
                mode = %self.mode,
                bytes_sent = self.sent,
                content_length = self.expected,
                duration_ms,
                outcome = outcome.as_str(),
                "audio stream finished"
            ),
            StreamOutcome::Failed => error!(
                asset = %self.asset,
                mode = %self.mode,
                bytes_sent = self.sent,
                content_length = self.expected,
                duration_ms,
                outcome = outcome.as_str(),
                error = %err.map(ToString::to_string).unwrap_or_default(),
                "audio stream failed after headers were sent"
            ),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.finish(StreamOutcome::Aborted, None);
        }
    }
}
