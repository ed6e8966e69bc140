use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{DeliveryFailure, Result};
use crate::events::TelemetryEvent;
use crate::hub::{StreamHub, SubscriberId};

/// Hub-side handle for one subscriber: a bounded outbound queue of JSON lines
pub struct Subscriber {
    tx: mpsc::Sender<Arc<str>>,
}

impl Subscriber {
    pub fn new(tx: mpsc::Sender<Arc<str>>) -> Self {
        Self { tx }
    }

    /// Create a subscriber and the receiving end its connection drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Queue a line without waiting
    pub fn try_deliver(&self, line: &Arc<str>) -> std::result::Result<(), DeliveryFailure> {
        match self.tx.try_send(Arc::clone(line)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DeliveryFailure::Full),
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Subscriber query received on a connection
#[derive(Debug, PartialEq)]
enum ClientCommand {
    Status,
    Latest,
}

impl ClientCommand {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "status" => Some(Self::Status),
            "latest" => Some(Self::Latest),
            _ => None,
        }
    }
}

/// Client connection wrapper
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub fn new(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Pump queued lines to the socket and answer queries until either side closes.
    ///
    /// The subscriber is unregistered from `hub` on exit.
    pub async fn run(self, id: SubscriberId, mut outbound: mpsc::Receiver<Arc<str>>, hub: StreamHub) {
        let (reader, mut writer) = self.stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    let Some(line) = queued else {
                        tracing::debug!("Subscriber {} dropped by hub", id);
                        break;
                    };
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        tracing::debug!("Write to subscriber {} failed: {}", id, e);
                        break;
                    }
                }
                incoming = lines.next_line() => {
                    match incoming {
                        Ok(Some(request)) => {
                            if let Err(e) = Self::answer(&request, &hub, &mut writer).await {
                                tracing::debug!("Reply to subscriber {} failed: {}", id, e);
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::debug!("Read from subscriber {} failed: {}", id, e);
                            break;
                        }
                    }
                }
            }
        }

        hub.unregister(id);
        tracing::info!("Client {} disconnected", id);
    }

    async fn answer<W>(request: &str, hub: &StreamHub, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let reply = match ClientCommand::parse(request) {
            Some(ClientCommand::Status) => hub.status(),
            Some(ClientCommand::Latest) => hub.latest().unwrap_or_else(|| hub.status()),
            None => {
                tracing::debug!("Ignoring unknown client request: {}", request.trim());
                return Ok(());
            }
        };

        writer.write_all(reply.to_json_line()?.as_bytes()).await?;
        Ok(())
    }
}

/// Render an event once for every subscriber
pub(crate) fn encode(event: &TelemetryEvent) -> Result<Arc<str>> {
    Ok(Arc::from(event.to_json_line()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(ClientCommand::parse("status\n"), Some(ClientCommand::Status));
        assert_eq!(ClientCommand::parse("  LATEST "), Some(ClientCommand::Latest));
        assert_eq!(ClientCommand::parse("toggle"), None);
    }

    #[test]
    fn test_try_deliver_full_and_closed() {
        let (subscriber, mut rx) = Subscriber::channel(1);
        let line: Arc<str> = Arc::from("{}\n");

        assert_eq!(subscriber.try_deliver(&line), Ok(()));
        assert_eq!(subscriber.try_deliver(&line), Err(DeliveryFailure::Full));

        assert_eq!(rx.try_recv().unwrap().as_ref(), "{}\n");
        drop(rx);
        assert_eq!(subscriber.try_deliver(&line), Err(DeliveryFailure::Closed));
        assert!(subscriber.is_closed());
    }
}
