//! ZeroMQ implementation of [`Bus`].
//!
//! The bridge binds both sockets; producers connect a PUB socket to the
//! subscribe endpoint and consumers connect a SUB socket to the publish
//! endpoint.
//!
//! A background task owns the SUB socket and forwards every received message
//! into an unbounded channel, so receipt keeps pace with the bus no matter
//! how long one relay iteration takes.  The channel is unbounded: a bus that
//! outpaces the TCP side grows memory instead of blocking the bus.

use std::time::Duration;

use async_trait::async_trait;
use station_core::Message;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info};
use zeromq::{PubSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use super::{Bus, BusError};

/// Upper bound on handing one message to the PUB socket.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

/// PUB/SUB pair bound by the bridge.
pub struct ZmqBus {
    publisher: PubSocket,
    inbound: mpsc::UnboundedReceiver<Message>,
    receiver_task: JoinHandle<()>,
    publish_endpoint: String,
    subscribe_endpoint: String,
}

impl ZmqBus {
    /// Binds the publish and subscribe sockets and starts the receiver task.
    ///
    /// The subscription is empty, i.e. every topic is received.  Endpoints
    /// with port 0 are resolved; see [`publish_endpoint`](Self::publish_endpoint).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Bind`] if either endpoint cannot be bound and
    /// [`BusError::Subscribe`] if the subscription is rejected.
    pub async fn setup(publish_endpoint: &str, subscribe_endpoint: &str) -> Result<Self, BusError> {
        let mut publisher = PubSocket::new();
        let bound_pub = publisher
            .bind(publish_endpoint)
            .await
            .map_err(|source| BusError::Bind {
                endpoint: publish_endpoint.to_string(),
                source,
            })?;

        let mut subscriber = SubSocket::new();
        let bound_sub = subscriber
            .bind(subscribe_endpoint)
            .await
            .map_err(|source| BusError::Bind {
                endpoint: subscribe_endpoint.to_string(),
                source,
            })?;
        subscriber.subscribe("").await.map_err(BusError::Subscribe)?;

        info!("bus: publishing on {bound_pub}, subscribed on {bound_sub}");

        let (tx, inbound) = mpsc::unbounded_channel();
        let receiver_task = tokio::spawn(receive_loop(subscriber, tx));

        Ok(Self {
            publisher,
            inbound,
            receiver_task,
            publish_endpoint: bound_pub.to_string(),
            subscribe_endpoint: bound_sub.to_string(),
        })
    }

    /// The endpoint the PUB socket is bound to, with any port 0 resolved.
    pub fn publish_endpoint(&self) -> &str {
        &self.publish_endpoint
    }

    /// The endpoint the SUB socket is bound to, with any port 0 resolved.
    pub fn subscribe_endpoint(&self) -> &str {
        &self.subscribe_endpoint
    }
}

async fn receive_loop(mut subscriber: SubSocket, tx: mpsc::UnboundedSender<Message>) {
    loop {
        match subscriber.recv().await {
            Ok(zmq_msg) => {
                for message in split_parts(zmq_msg) {
                    debug!(bytes = message.len(), "received from bus");
                    if tx.send(message).is_err() {
                        // The bus handle was dropped.
                        return;
                    }
                }
            }
            Err(e) => {
                error!("bus receive failed, no further bus messages will be relayed: {e}");
                break;
            }
        }
    }
}

/// Turns every part of a (possibly multipart) bus message into its own
/// [`Message`], in part order.  Clients see one frame per part.
fn split_parts(zmq_msg: ZmqMessage) -> Vec<Message> {
    zmq_msg
        .into_vec()
        .into_iter()
        .map(|part| Message::new(part.to_vec()))
        .collect()
}

#[async_trait]
impl Bus for ZmqBus {
    fn try_get(&mut self) -> Option<Message> {
        match self.inbound.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    async fn publish(&mut self, message: Message) -> Result<(), BusError> {
        let zmq_msg = ZmqMessage::from(message.into_bytes());
        match timeout(PUBLISH_TIMEOUT, self.publisher.send(zmq_msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BusError::Send(e)),
            Err(_) => Err(BusError::SendTimeout(PUBLISH_TIMEOUT)),
        }
    }
}

impl Drop for ZmqBus {
    fn drop(&mut self) {
        self.receiver_task.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
