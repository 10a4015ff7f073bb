//! The transport carries [Message]s between ring members.
//!
//! The [Transport] trait is the seam to a real network. [MemoryTransport] delivers
//! messages to nodes living in the same process; it still encodes every request and
//! response, so nodes share no memory and a missing or dropped node looks exactly like
//! an unreachable peer.
#![warn(missing_docs)]
use std::sync::Arc;
use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::dht::NodeDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindSuccessorStep;
use crate::message::Message;
use crate::message::Response;

/// Point to point calls between ring members.
///
/// Timeouts and retries are the business of the implementation. A call that can't be
/// delivered must fail with [Error::UnreachablePeer].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `message` to `to` and wait for its response.
    async fn send(&self, to: &NodeDescriptor, message: Message) -> Result<Response>;
}

/// Receiver side of the [Transport].
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Apply `message` to the local node.
    async fn handle_message(&self, message: Message) -> Result<Response>;
}

/// Typed calls on top of [Transport::send].
#[async_trait]
pub trait TransportExt: Transport {
    /// Exchange identifier spaces with `to`.
    async fn handshake(&self, to: &NodeDescriptor, space: IdentifierSpace) -> Result<IdentifierSpace> {
        match self.send(to, Message::Handshake(space)).await? {
            Response::Space(space) => Ok(space),
            resp => Err(unexpected("Handshake", resp)),
        }
    }

    /// Run one routing step at `to`.
    async fn find_successor_step(&self, to: &NodeDescriptor, id: Identifier) -> Result<FindSuccessorStep> {
        match self.send(to, Message::FindSuccessor(id)).await? {
            Response::Step(step) => Ok(step),
            resp => Err(unexpected("FindSuccessor", resp)),
        }
    }

    /// Read the predecessor of `to`.
    async fn get_predecessor(&self, to: &NodeDescriptor) -> Result<Option<NodeDescriptor>> {
        match self.send(to, Message::GetPredecessor).await? {
            Response::Node(node) => Ok(node),
            resp => Err(unexpected("GetPredecessor", resp)),
        }
    }

    /// Read the successor of `to`.
    async fn get_successor(&self, to: &NodeDescriptor) -> Result<NodeDescriptor> {
        match self.send(to, Message::GetSuccessor).await? {
            Response::Node(Some(node)) => Ok(node),
            resp => Err(unexpected("GetSuccessor", resp)),
        }
    }

    /// Tell `to` that `candidate` may be its predecessor.
    async fn notify(&self, to: &NodeDescriptor, candidate: NodeDescriptor) -> Result<()> {
        expect_ack("Notify", self.send(to, Message::Notify(candidate)).await?)
    }

    /// Tell `to` that `candidate` may be its successor.
    async fn update_successor(&self, to: &NodeDescriptor, candidate: NodeDescriptor) -> Result<()> {
        expect_ack(
            "UpdateSuccessor",
            self.send(to, Message::UpdateSuccessor(candidate)).await?,
        )
    }

    /// Take over the entries `to` holds in `(from, end]`.
    async fn hand_off(
        &self,
        to: &NodeDescriptor,
        from: Identifier,
        end: Identifier,
    ) -> Result<Vec<(Identifier, Bytes)>> {
        match self.send(to, Message::HandOff { from, to: end }).await? {
            Response::Entries(entries) => Ok(entries),
            resp => Err(unexpected("HandOff", resp)),
        }
    }

    /// Store a value at `to`.
    async fn put(&self, to: &NodeDescriptor, id: Identifier, value: Bytes) -> Result<()> {
        expect_ack("Put", self.send(to, Message::Put { id, value }).await?)
    }

    /// Read a value from `to`.
    async fn get(&self, to: &NodeDescriptor, id: Identifier) -> Result<Option<Bytes>> {
        match self.send(to, Message::Get { id }).await? {
            Response::Value(value) => Ok(value),
            resp => Err(unexpected("Get", resp)),
        }
    }

    /// Delete a value at `to`.
    async fn remove(&self, to: &NodeDescriptor, id: Identifier) -> Result<Option<Bytes>> {
        match self.send(to, Message::Remove { id }).await? {
            Response::Value(value) => Ok(value),
            resp => Err(unexpected("Remove", resp)),
        }
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

fn expect_ack(name: &str, resp: Response) -> Result<()> {
    match resp {
        Response::Ack => Ok(()),
        resp => Err(unexpected(name, resp)),
    }
}

fn unexpected(name: &str, resp: Response) -> Error {
    match resp {
        Response::Rejected(reason) => Error::PeerRejected(reason),
        resp => {
            tracing::error!("unexpected response for {}: {:?}", name, resp);
            Error::UnexpectedResponse(name.to_string())
        }
    }
}

/// [Transport] for nodes living in one process, keyed by address.
///
/// Handlers are held weakly: dropping a node makes it unreachable.
#[derive(Default)]
pub struct MemoryTransport {
    handlers: DashMap<String, Weak<dyn MessageHandler>>,
}

impl MemoryTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver messages for `address` to `handler`.
    pub fn register<H>(&self, address: &str, handler: &Arc<H>)
    where H: MessageHandler + 'static {
        let handler: Weak<H> = Arc::downgrade(handler);
        let handler: Weak<dyn MessageHandler> = handler;
        self.handlers.insert(address.to_string(), handler);
    }

    /// Stop delivering messages to `address`, simulating a peer that went away.
    pub fn disconnect(&self, address: &str) {
        if self.handlers.remove(address).is_some() {
            tracing::info!("memory transport: {} disconnected", address);
        }
    }

    /// Returns `true` if messages to `address` can be delivered.
    pub fn is_connected(&self, address: &str) -> bool {
        self.handler(address).is_some()
    }

    fn handler(&self, address: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(address).and_then(|h| h.value().upgrade())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, to: &NodeDescriptor, message: Message) -> Result<Response> {
        let Some(handler) = self.handler(&to.address) else {
            tracing::debug!("memory transport: {} is unreachable", to);
            return Err(Error::UnreachablePeer(to.to_string()));
        };

        let name = message.name();
        let request = Message::decode(&message.encode()?)?;
        let response = match handler.handle_message(request).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("{} rejected {}: {}", to, name, e);
                Response::Rejected(e.to_string())
            }
        };
        Response::decode(&response.encode()?)
    }
}
