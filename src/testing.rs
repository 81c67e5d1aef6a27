//! Shared fixtures for unit tests

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::TransferError;
use crate::observer::{Progress, TransferObserver};
use crate::request::Method;
use crate::source::{ApiSource, Source};
use crate::transport::{
    EventStream, RequestBody, ResolvedRequest, Transport, TransportError, TransportEvent,
};

pub(crate) fn test_source() -> Arc<dyn Source> {
    Arc::new(ApiSource::new("test", "https://api.test/api", Some("test-key".to_string())).unwrap())
}

enum Entry {
    Progress(Progress),
    Success(String),
    Failure(&'static str),
}

/// Observer keeping every callback in arrival order
pub(crate) struct RecordingObserver<T> {
    entries: Mutex<Vec<Entry>>,
    _output: std::marker::PhantomData<fn(T)>,
}

impl<T> RecordingObserver<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            _output: std::marker::PhantomData,
        })
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|entry| match entry {
                Entry::Progress(_) => "progress".to_string(),
                Entry::Success(output) => format!("success {output}"),
                Entry::Failure(code) => format!("failure {code}"),
            })
            .collect()
    }

    pub(crate) fn progress(&self) -> Vec<Progress> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Progress(progress) => Some(*progress),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn fractions(&self) -> Vec<f64> {
        self.progress()
            .iter()
            .filter_map(Progress::as_fraction)
            .collect()
    }

    pub(crate) fn terminal_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| !matches!(entry, Entry::Progress(_)))
            .count()
    }
}

impl<T: Debug + 'static> TransferObserver<T> for RecordingObserver<T> {
    fn on_progress(&self, progress: Progress) {
        self.entries.lock().unwrap().push(Entry::Progress(progress));
    }

    fn on_success(&self, output: T) {
        self.entries
            .lock()
            .unwrap()
            .push(Entry::Success(format!("{output:?}")));
    }

    fn on_failure(&self, error: TransferError) {
        self.entries.lock().unwrap().push(Entry::Failure(error.code()));
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(Value),
    Chunks {
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
    },
    Status(u16),
    /// Sends the head and `chunks`, then the connection drops
    FailAfter {
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
    },
    /// Sends the head and `chunks`, then goes quiet without closing
    Stall {
        chunks: Vec<Bytes>,
        content_length: Option<u64>,
    },
    /// Never answers
    Hang,
}

impl Reply {
    pub(crate) fn json(value: Value) -> Self {
        Reply::Json(value)
    }

    pub(crate) fn chunks(chunks: Vec<&[u8]>, content_length: Option<u64>) -> Self {
        Reply::Chunks {
            chunks: chunks.into_iter().map(Bytes::copy_from_slice).collect(),
            content_length,
        }
    }

    fn events(self) -> EventStream {
        type Event = Result<TransportEvent, TransportError>;
        let head = |content_length: Option<u64>| -> Event {
            Ok(TransportEvent::Response {
                status: 200,
                content_length,
            })
        };

        match self {
            Reply::Json(value) => {
                let body = Bytes::from(value.to_string());
                let events: Vec<Event> = vec![
                    head(Some(body.len() as u64)),
                    Ok(TransportEvent::Chunk(body)),
                    Ok(TransportEvent::Complete),
                ];
                stream::iter(events).boxed()
            }
            Reply::Chunks {
                chunks,
                content_length,
            } => {
                let mut events: Vec<Event> = vec![head(content_length)];
                events.extend(chunks.into_iter().map(|c| Ok(TransportEvent::Chunk(c))));
                events.push(Ok(TransportEvent::Complete));
                stream::iter(events).boxed()
            }
            Reply::Status(status) => stream::iter(vec![Err(TransportError::Status {
                status,
                body: String::new(),
            })])
            .boxed(),
            Reply::FailAfter {
                chunks,
                content_length,
            } => {
                let mut events: Vec<Event> = vec![head(content_length)];
                events.extend(chunks.into_iter().map(|c| Ok(TransportEvent::Chunk(c))));
                events.push(Err(TransportError::Body("connection reset".to_string())));
                stream::iter(events).boxed()
            }
            Reply::Stall {
                chunks,
                content_length,
            } => {
                let mut events: Vec<Event> = vec![head(content_length)];
                events.extend(chunks.into_iter().map(|c| Ok(TransportEvent::Chunk(c))));
                stream::iter(events).chain(stream::pending()).boxed()
            }
            Reply::Hang => stream::pending().boxed(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub body_chunks: usize,
}

impl RecordedCall {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-process transport answering from a route table.
///
/// A route matches the request path exactly or below the `/api` prefix of
/// [`test_source`]. Upload bodies are drained before replying so progress
/// fires the way it would on a real connection.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<Vec<(String, Reply)>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    in_flight: Arc<AtomicUsize>,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn route(&self, path: &str, reply: Reply) {
        self.routes.lock().unwrap().push((path.to_string(), reply));
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Exchanges whose stream has not been dropped yet
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, path: &str) -> Reply {
        self.routes
            .lock()
            .unwrap()
            .iter()
            .find(|(route, _)| route == path || format!("/api{route}") == path)
            .map(|(_, reply)| reply.clone())
            .unwrap_or(Reply::Status(404))
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: ResolvedRequest, body: Option<RequestBody>) -> EventStream {
        let reply = self.reply_for(request.url.path());
        let calls = self.calls.clone();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self.in_flight.clone());

        let exchange = async move {
            let mut recorded = RecordedCall {
                method: request.method,
                path: request.url.path().to_string(),
                query: request.url.query().map(str::to_string),
                headers: request.headers,
                body: None,
                body_chunks: 0,
            };

            if let Some(RequestBody::Multipart { mut content, .. }) = body {
                let mut data = Vec::new();
                while let Some(chunk) = content.next().await {
                    match chunk {
                        Ok(chunk) => {
                            recorded.body_chunks += 1;
                            data.extend_from_slice(&chunk);
                        }
                        Err(e) => {
                            calls.lock().unwrap().push(recorded);
                            return stream::iter(vec![Err(TransportError::Io(e))]).boxed();
                        }
                    }
                }
                recorded.body = Some(data);
            }

            calls.lock().unwrap().push(recorded);
            reply.events()
        };

        stream::once(exchange)
            .flatten()
            .map(move |event| {
                let _held = &guard;
                event
            })
            .boxed()
    }
}
