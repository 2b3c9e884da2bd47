// Streaming Engine Module
// Character-by-character SSE emulation. Each stream is a small state machine
// (`StreamState`) held in a per-session `StreamRegistry`; an async loop paced by
// a `Pacer` and guarded by a cancellation token drives it.

use crate::latency::{LatencyProfile, Pacer};
use crate::openai::ChatCompletionChunk;
use crate::samples::ContentType;
use async_stream::stream;
use futures::Stream;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Hard ceiling on content chunks per stream
pub const MAX_STREAM_CHUNKS: usize = 500;

/// Terminal SSE line
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Lifecycle of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Emitting,
    Done,
    Cancelled,
}

/// One step of output from a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A single character of content; `first` marks the opening chunk
    Content { text: String, first: bool },
    /// The chunk carrying `finish_reason: "stop"`
    Finish,
    /// The `[DONE]` sentinel; nothing follows it
    Done,
}

/// Per-stream emission state
#[derive(Debug, Clone)]
pub struct StreamState {
    stream_id: String,
    content_buffer: String,
    /// Byte offset of the next character to emit
    cursor: usize,
    content_type: ContentType,
    emitted: usize,
    finish_sent: bool,
    phase: StreamPhase,
}

impl StreamState {
    pub fn new(
        stream_id: impl Into<String>,
        content: impl Into<String>,
        content_type: ContentType,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            content_buffer: content.into(),
            cursor: 0,
            content_type,
            emitted: 0,
            finish_sent: false,
            phase: StreamPhase::Emitting,
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn content(&self) -> &str {
        &self.content_buffer
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase != StreamPhase::Emitting
    }

    /// Rewind to the start of new content
    pub fn reset(&mut self, content: impl Into<String>, content_type: ContentType) {
        self.content_buffer = content.into();
        self.content_type = content_type;
        self.cursor = 0;
        self.emitted = 0;
        self.finish_sent = false;
        self.phase = StreamPhase::Emitting;
    }

    pub fn cancel(&mut self) {
        if self.phase == StreamPhase::Emitting {
            self.phase = StreamPhase::Cancelled;
        }
    }

    /// Advance by one event. Returns `None` once the stream is terminal.
    pub fn step(&mut self) -> Option<StreamEvent> {
        if self.phase != StreamPhase::Emitting {
            return None;
        }

        if self.finish_sent {
            self.phase = StreamPhase::Done;
            return Some(StreamEvent::Done);
        }

        if self.cursor >= self.content_buffer.len() {
            self.finish_sent = true;
            return Some(StreamEvent::Finish);
        }

        if self.emitted >= MAX_STREAM_CHUNKS {
            tracing::warn!(
                stream_id = %self.stream_id,
                emitted = self.emitted,
                "Stream hit the chunk ceiling, forcing termination"
            );
            self.phase = StreamPhase::Done;
            return Some(StreamEvent::Done);
        }

        let ch = self.content_buffer[self.cursor..].chars().next()?;
        self.cursor += ch.len_utf8();
        self.emitted += 1;
        Some(StreamEvent::Content {
            text: ch.to_string(),
            first: self.emitted == 1,
        })
    }
}

struct ActiveStream {
    state: StreamState,
    cancel: CancellationToken,
}

/// Live stream states keyed by stream id. Clones share the same map.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    streams: Arc<Mutex<HashMap<String, ActiveStream>>>,
    next_id: Arc<AtomicU64>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveStream>> {
        // A panic while holding the lock cannot leave a half-written entry,
        // so a poisoned map is still consistent.
        self.streams.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new stream and return its id
    pub fn open(
        &self,
        content: impl Into<String>,
        content_type: ContentType,
        cancel: CancellationToken,
    ) -> String {
        let stream_id = format!("stream-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let state = StreamState::new(stream_id.clone(), content, content_type);
        self.lock()
            .insert(stream_id.clone(), ActiveStream { state, cancel });
        tracing::debug!(%stream_id, content_type = %content_type, "Stream opened");
        stream_id
    }

    /// Replace a live stream's content and rewind it. Returns false when the
    /// stream no longer exists.
    pub fn reset(&self, stream_id: &str, content: impl Into<String>, content_type: ContentType) -> bool {
        match self.lock().get_mut(stream_id) {
            Some(active) => {
                active.state.reset(content, content_type);
                true
            }
            None => false,
        }
    }

    /// Advance a stream by one event, discarding its state once terminal.
    /// The event comes with the content type it was produced under.
    pub fn step(&self, stream_id: &str) -> Option<(StreamEvent, ContentType)> {
        let mut streams = self.lock();
        let active = streams.get_mut(stream_id)?;
        let event = active.state.step();
        let content_type = active.state.content_type();
        if active.state.is_finished() {
            streams.remove(stream_id);
            tracing::debug!(%stream_id, "Stream completed");
        }
        event.map(|event| (event, content_type))
    }

    /// Cancel a live stream and discard its state. Returns false if it had
    /// already finished or been removed.
    pub fn cancel(&self, stream_id: &str) -> bool {
        match self.lock().remove(stream_id) {
            Some(mut active) => {
                active.state.cancel();
                active.cancel.cancel();
                tracing::debug!(%stream_id, "Stream cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every live stream
    pub fn clear(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, mut active) in drained {
            active.state.cancel();
            active.cancel.cancel();
        }
    }

    /// Snapshot of a live stream's state
    pub fn state(&self, stream_id: &str) -> Option<StreamState> {
        self.lock().get(stream_id).map(|active| active.state.clone())
    }

    pub fn contains(&self, stream_id: &str) -> bool {
        self.lock().contains_key(stream_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("live_streams", &self.len())
            .finish()
    }
}

/// Identity shared by every chunk of one completion
#[derive(Debug, Clone)]
pub struct ChunkIdentity {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl ChunkIdentity {
    fn encode(&self, event: &StreamEvent, content_type: ContentType) -> String {
        let chunk = ChatCompletionChunk::new(self.id.clone(), self.model.clone(), self.created);
        match event {
            StreamEvent::Content { text, first } => {
                let chunk = chunk.with_content(text.clone(), *first);
                if *first {
                    format_sse(&chunk.with_content_type(content_type.as_str()))
                } else {
                    format_sse(&chunk)
                }
            }
            StreamEvent::Finish => {
                format_sse(&chunk.with_finish("stop").with_content_type(content_type.as_str()))
            }
            StreamEvent::Done => SSE_DONE.to_string(),
        }
    }
}

/// Format a chunk as a Server-Sent Event
pub fn format_sse(chunk: &ChatCompletionChunk) -> String {
    let json = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    format!("data: {}\n\n", json)
}

/// Removes the stream's state if the body is dropped before completion,
/// which is how a closed client connection surfaces.
struct DropGuard {
    registry: StreamRegistry,
    stream_id: String,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.registry.cancel(&self.stream_id);
    }
}

/// A live SSE stream returned by a handler
pub struct StreamHandle {
    stream_id: String,
    content_type: ContentType,
    cancel: CancellationToken,
    body: Pin<Box<dyn Stream<Item = String> + Send>>,
}

impl StreamHandle {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Token that aborts the stream when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The SSE byte sequence, one `data: ...\n\n` event per item
    pub fn into_sse(self) -> Pin<Box<dyn Stream<Item = String> + Send>> {
        self.body
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("stream_id", &self.stream_id)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Opens streams against a registry with a given pacing
#[derive(Debug, Clone)]
pub struct StreamEmulator {
    registry: StreamRegistry,
    latency: LatencyProfile,
}

impl StreamEmulator {
    pub fn new(registry: StreamRegistry, latency: LatencyProfile) -> Self {
        Self { registry, latency }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Register `content` as a new stream and build its paced SSE body
    pub fn open(
        &self,
        identity: ChunkIdentity,
        content: impl Into<String>,
        content_type: ContentType,
    ) -> StreamHandle {
        let cancel = CancellationToken::new();
        let stream_id = self.registry.open(content, content_type, cancel.clone());

        let registry = self.registry.clone();
        let token = cancel.clone();
        let id = stream_id.clone();
        let interval = self.latency.chunk_interval;

        let guard = DropGuard {
            registry: registry.clone(),
            stream_id: id.clone(),
        };

        let body = Box::pin(stream! {
            let _guard = guard;
            let mut pacer = Pacer::new(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        registry.cancel(&id);
                        break;
                    }
                    _ = pacer.tick() => {}
                }

                let Some((event, current_type)) = registry.step(&id) else {
                    break;
                };
                let done = event == StreamEvent::Done;
                yield identity.encode(&event, current_type);
                if done {
                    break;
                }
            }
        });

        StreamHandle {
            stream_id,
            content_type,
            cancel,
            body,
        }
    }
}
