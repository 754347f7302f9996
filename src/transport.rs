//! The per-request output side of the responder.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::ResponderError;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok = 200,
    NotFound = 404,
}

impl StatusCode {
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub const fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::NotFound => "Not Found",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// 200 head describing the content about to be streamed.
    pub fn ok(content_type: impl Into<String>, content_length: u64) -> Self {
        Self {
            status: StatusCode::Ok,
            headers: vec![
                (CONTENT_TYPE.to_string(), content_type.into()),
                (CONTENT_LENGTH.to_string(), content_length.to_string()),
            ],
        }
    }

    /// 404 head with an empty body.
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NotFound,
            headers: vec![(CONTENT_LENGTH.to_string(), "0".to_string())],
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Receives the effects of one request.
///
/// The responder guarantees the call order: at most one
/// [`start_response`](Self::start_response), then any number of
/// [`receive_data`](Self::receive_data), then at most one of
/// [`finish`](Self::finish) or [`fail`](Self::fail).
pub trait TransportSink: Send + Sync {
    fn start_response(&self, head: ResponseHead);

    fn receive_data(&self, data: Bytes);

    fn finish(&self);

    fn fail(&self, error: ResponderError);
}

/// One call observed by a [`RecordingSink`].
#[derive(Debug)]
pub enum TransportEvent {
    Head(ResponseHead),
    Data(Bytes),
    Finish,
    Fail(ResponderError),
}

/// Sink that keeps every call in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TransportEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<TransportEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl TransportSink for RecordingSink {
    fn start_response(&self, head: ResponseHead) {
        self.events.lock().push(TransportEvent::Head(head));
    }

    fn receive_data(&self, data: Bytes) {
        self.events.lock().push(TransportEvent::Data(data));
    }

    fn finish(&self) {
        self.events.lock().push(TransportEvent::Finish);
    }

    fn fail(&self, error: ResponderError) {
        self.events.lock().push(TransportEvent::Fail(error));
    }
}

/// Forwards every call to a channel, for consumers that write asynchronously.
///
/// Calls made after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: TransportEvent) {
        let _ = self.tx.send(event);
    }
}

impl TransportSink for ChannelSink {
    fn start_response(&self, head: ResponseHead) {
        self.send(TransportEvent::Head(head));
    }

    fn receive_data(&self, data: Bytes) {
        self.send(TransportEvent::Data(data));
    }

    fn finish(&self) {
        self.send(TransportEvent::Finish);
    }

    fn fail(&self, error: ResponderError) {
        self.send(TransportEvent::Fail(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_head() {
        let head = ResponseHead::ok("video/mp4", 5_000_000);
        assert_eq!(head.status, StatusCode::Ok);
        assert_eq!(head.header("content-type"), Some("video/mp4"));
        assert_eq!(head.header(CONTENT_LENGTH), Some("5000000"));
    }

    #[test]
    fn test_not_found_head() {
        let head = ResponseHead::not_found();
        assert_eq!(head.status.as_u16(), 404);
        assert_eq!(head.status.to_string(), "404 Not Found");
        assert_eq!(head.header(CONTENT_TYPE), None);
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        sink.start_response(ResponseHead::ok("text/html", 2));
        sink.receive_data(Bytes::from_static(b"hi"));
        sink.finish();

        let events = sink.take_events();
        assert!(matches!(events[0], TransportEvent::Head(_)));
        assert!(matches!(&events[1], TransportEvent::Data(d) if &d[..] == b"hi"));
        assert!(matches!(events[2], TransportEvent::Finish));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_closes_with_senders() {
        let (sink, mut rx) = ChannelSink::channel();
        sink.start_response(ResponseHead::not_found());
        sink.finish();
        drop(sink);

        assert!(matches!(rx.recv().await, Some(TransportEvent::Head(_))));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Finish)));
        assert!(rx.recv().await.is_none());
    }
}
