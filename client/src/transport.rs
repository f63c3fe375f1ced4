//! Boundary with the wire transport.
//!
//! The runtime only needs something that accepts a control message and
//! eventually answers it. Connection handling, framing and request/response
//! matching live behind [`Transport`].

use crate::error::TransportError;
use async_trait::async_trait;
use rom_types::{Reply, Request, ServerError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Channel that carries control messages to the media server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for the reply that belongs to it.
    async fn send(&self, request: Request) -> Result<Reply, TransportError>;
}

/// A request waiting for its reply on the server side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct PendingRequest {
    pub request: Request,
    reply: oneshot::Sender<Result<Reply, ServerError>>,
}

impl PendingRequest {
    /// Answer the request. Returns `false` if the caller went away.
    pub fn respond(self, reply: Result<Reply, ServerError>) -> bool {
        self.reply.send(reply).is_ok()
    }

    pub fn reply(self, reply: Reply) -> bool {
        self.respond(Ok(reply))
    }

    pub fn fail(self, error: ServerError) -> bool {
        self.respond(Err(error))
    }
}

/// In-process transport: requests are handed to a [`ServerEnd`], which
/// answers each one through its own reply slot, in any order.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<PendingRequest>,
}

/// Receiving side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ServerEnd {
    rx: mpsc::UnboundedReceiver<PendingRequest>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, ServerEnd) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, ServerEnd { rx })
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, request: Request) -> Result<Reply, TransportError> {
        let method = request.method();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                request,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::Closed("server end dropped".to_string()))?;
        trace!("Queued {} request", method);

        match reply_rx.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(error)) => {
                debug!("{} request failed: {}", method, error);
                Err(TransportError::Server(error))
            }
            Err(_) => Err(TransportError::Closed(format!(
                "{} request dropped without a reply",
                method
            ))),
        }
    }
}

impl ServerEnd {
    /// Wait for the next request; `None` once every transport handle is gone.
    pub async fn next(&mut self) -> Option<PendingRequest> {
        self.rx.recv().await
    }

    /// Take a request if one is already queued.
    pub fn try_next(&mut self) -> Option<PendingRequest> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rom_types::ObjectId;
    use serde_json::json;

    #[tokio::test]
    async fn test_replies_matched_to_requests_out_of_order() {
        let (transport, mut server) = ChannelTransport::pair();

        let first = tokio::spawn({
            let transport = transport.clone();
            async move {
                transport
                    .send(Request::Release {
                        target: ObjectId::new("a"),
                    })
                    .await
            }
        });
        let a = server.next().await.unwrap();

        let second = tokio::spawn({
            let transport = transport.clone();
            async move {
                transport
                    .send(Request::Release {
                        target: ObjectId::new("b"),
                    })
                    .await
            }
        });
        let b = server.next().await.unwrap();

        assert!(b.reply(Reply::value(json!("b"))));
        assert!(a.reply(Reply::value(json!("a"))));

        assert_eq!(first.await.unwrap(), Ok(Reply::value(json!("a"))));
        assert_eq!(second.await.unwrap(), Ok(Reply::value(json!("b"))));
    }

    #[tokio::test]
    async fn test_server_error_and_closed() {
        let (transport, mut server) = ChannelTransport::pair();
        let call = tokio::spawn({
            let transport = transport.clone();
            async move {
                transport
                    .send(Request::Release {
                        target: ObjectId::new("a"),
                    })
                    .await
            }
        });
        server.next().await.unwrap().fail(ServerError::new(40101, "not found"));
        assert!(matches!(call.await.unwrap(), Err(TransportError::Server(_))));

        drop(server);
        let result = transport
            .send(Request::Release {
                target: ObjectId::new("a"),
            })
            .await;
        assert!(matches!(result, Err(TransportError::Closed(_))));
    }
}
