//! Channel-based transport.
//!
//! Delivers frames pushed through tokio channels instead of a socket. This
//! is useful for bridging another source (a message bus subscriber, a file
//! replayer) into the ingestion layer, and for driving the connection state
//! machine deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::{mpsc, Mutex};

use super::{Connector, FrameStream};
use crate::error::TransportError;

type FrameSender = mpsc::UnboundedSender<Result<String, TransportError>>;
type FrameReceiver = mpsc::UnboundedReceiver<Result<String, TransportError>>;

/// Answer to the next connection attempt.
#[derive(Debug)]
enum LinkOffer {
    Accept(FrameReceiver),
    Refuse(String),
}

/// A connector whose connections are handed out through [`LinkOffers`].
///
/// Each call to [`Connector::connect`] waits for the next offer: an accepted
/// offer becomes a live link, a refused one a failed attempt. Once every
/// [`LinkOffers`] is dropped, connection attempts fail with
/// [`TransportError::Closed`].
///
/// # Example
///
/// ```
/// use lathewatch::source::ChannelConnector;
///
/// let (offers, connector) = ChannelConnector::create("bridge");
/// let link = offers.accept();
/// link.send(r#"{"mean": 1.0}"#);
/// ```
#[derive(Debug)]
pub struct ChannelConnector {
    offers: Mutex<mpsc::UnboundedReceiver<LinkOffer>>,
    description: String,
    attempts: AtomicUsize,
}

impl ChannelConnector {
    /// Create a connector and the handle that feeds it connections.
    pub fn create(source_description: &str) -> (LinkOffers, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            offers: Mutex::new(rx),
            description: format!("channel: {}", source_description),
            attempts: AtomicUsize::new(0),
        };
        (LinkOffers { tx }, connector)
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<FrameStream, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut offers = self.offers.lock().await;
        match offers.recv().await {
            Some(LinkOffer::Accept(mut frames)) => {
                Ok(stream::poll_fn(move |cx| frames.poll_recv(cx)).boxed())
            }
            Some(LinkOffer::Refuse(reason)) => Err(TransportError::Connection(reason)),
            None => Err(TransportError::Closed),
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Producer side of a [`ChannelConnector`].
#[derive(Debug, Clone)]
pub struct LinkOffers {
    tx: mpsc::UnboundedSender<LinkOffer>,
}

impl LinkOffers {
    /// Let the next connection attempt succeed.
    ///
    /// Offers queue up, so this may be called before the attempt is made.
    pub fn accept(&self) -> LinkHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(LinkOffer::Accept(rx));
        LinkHandle { tx }
    }

    /// Make the next connection attempt fail.
    pub fn refuse(&self, reason: impl Into<String>) {
        let _ = self.tx.send(LinkOffer::Refuse(reason.into()));
    }
}

/// Sending end of one accepted link. Dropping it closes the link.
#[derive(Debug)]
pub struct LinkHandle {
    tx: FrameSender,
}

impl LinkHandle {
    /// Push a text frame. Returns `false` if the link is gone.
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.tx.send(Ok(frame.into())).is_ok()
    }

    /// Fail the link with a stream error.
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(Err(TransportError::Stream(reason.into())));
    }

    /// Close the link cleanly.
    pub fn close(self) {}

    /// Whether the reading side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepted_link_delivers_frames() {
        let (offers, connector) = ChannelConnector::create("test");
        let link = offers.accept();
        link.send("one");
        link.send("two");
        link.close();

        let frames: Vec<String> = connector
            .connect()
            .await
            .unwrap()
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(frames, vec!["one", "two"]);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failed_link_yields_error() {
        let (offers, connector) = ChannelConnector::create("test");
        offers.accept().fail("reset by peer");

        let mut frames = connector.connect().await.unwrap();
        assert!(matches!(frames.next().await, Some(Err(TransportError::Stream(_)))));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_refused_and_closed() {
        let (offers, connector) = ChannelConnector::create("test");
        offers.refuse("busy");
        assert!(matches!(connector.connect().await, Err(TransportError::Connection(r)) if r == "busy"));

        drop(offers);
        assert!(matches!(connector.connect().await, Err(TransportError::Closed)));
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_link_handle_sees_reader_drop() {
        let (offers, connector) = ChannelConnector::create("test");
        let link = offers.accept();
        let frames = connector.connect().await.unwrap();
        assert!(!link.is_closed());

        drop(frames);
        assert!(link.is_closed());
        assert!(!link.send("late"));
    }

    #[test]
    fn test_description() {
        let (_offers, connector) = ChannelConnector::create("rabbitmq://localhost");
        assert_eq!(connector.description(), "channel: rabbitmq://localhost");
    }
}
