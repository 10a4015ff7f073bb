//! A ring member: the [PeerRing] state of one node together with the [Transport] it
//! uses to reach its peers.
//!
//! [PeerRing] only ever computes one local step and returns a [RingAction]; [RingNode]
//! carries those actions out. Routing is iterative: the node asking for a key performs
//! every hop itself, one transport call per hop, so a lookup suspends only between hops
//! and is bounded by the configured hop limit.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::config::RingConfig;
use crate::dht::Chord;
use crate::dht::ChordStorage;
use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::dht::NodeDescriptor;
use crate::dht::NodeStatus;
use crate::dht::PeerRing;
use crate::dht::PeerRingRemoteAction;
use crate::dht::RingAction;
use crate::error::Error;
use crate::error::Result;
use crate::message::FindSuccessorStep;
use crate::message::Message;
use crate::message::Response;
use crate::transport::MessageHandler;
use crate::transport::Transport;
use crate::transport::TransportExt;

/// Result of a traced lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    /// Identifier looked up.
    pub target: Identifier,
    /// Node owning `target`.
    pub owner: NodeDescriptor,
    /// Nodes contacted, in order. Failed attempts are included.
    pub route: Vec<Identifier>,
}

impl Lookup {
    /// Number of transport calls the lookup took.
    pub fn hops(&self) -> usize {
        self.route.len()
    }
}

/// A member of the ring.
pub struct RingNode {
    dht: Arc<PeerRing>,
    transport: Arc<dyn Transport>,
    max_hops: u32,
}

impl RingNode {
    /// Create a detached node.
    pub fn new(
        descriptor: NodeDescriptor,
        config: &RingConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let space = config.space()?;
        Ok(Self {
            dht: Arc::new(PeerRing::new(descriptor, space)?),
            transport,
            max_hops: config.hop_bound(),
        })
    }

    /// Ring state of this node.
    pub fn dht(&self) -> Arc<PeerRing> {
        self.dht.clone()
    }

    /// Descriptor of this node.
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.dht.descriptor
    }

    /// Identifier of this node.
    pub fn id(&self) -> Identifier {
        self.dht.id()
    }

    /// Identifier space of this node.
    pub fn space(&self) -> IdentifierSpace {
        self.dht.space
    }

    /// Lifecycle status of this node.
    pub fn status(&self) -> Result<NodeStatus> {
        self.dht.status()
    }

    /// Find the node owning `id`.
    pub async fn find_successor(&self, id: Identifier) -> Result<NodeDescriptor> {
        Ok(self.lookup(id).await?.owner)
    }

    /// Find the node owning `id`, recording the route taken.
    pub async fn lookup(&self, id: Identifier) -> Result<Lookup> {
        self.route(None, id).await
    }

    /// Iterative routing. `start` is the first node to ask, this node when `None`.
    async fn route(&self, start: Option<&NodeDescriptor>, target: Identifier) -> Result<Lookup> {
        if !self.space().contains(target) {
            return Err(Error::IdentifierOutOfRange {
                id: target.value(),
                bits: self.space().bits(),
            });
        }

        let mut route = vec![];
        // `None` while the current step was computed by this node.
        let mut responder: Option<NodeDescriptor> = None;
        let mut step = match start {
            Some(node) if node.id != self.id() => {
                route.push(node.id);
                let step = self.step_at(node, target).await?;
                responder = Some(node.clone());
                step
            }
            _ => self.local_step(target)?,
        };

        loop {
            let (next, fallback) = match step {
                FindSuccessorStep::Found(owner) => {
                    tracing::debug!(
                        "{} lookup {} -> {} in {} hops",
                        self.descriptor(),
                        target,
                        owner,
                        route.len()
                    );
                    return Ok(Lookup {
                        target,
                        owner,
                        route,
                    });
                }
                FindSuccessorStep::Forward { next, successor } => (next, successor),
            };

            let hops = route.len() as u32;
            if hops >= self.max_hops {
                tracing::warn!(
                    "{} lookup {} exceeded {} hops, route: {:?}",
                    self.descriptor(),
                    target,
                    self.max_hops,
                    route
                );
                return Err(Error::RoutingFailure {
                    target: target.value(),
                    hops,
                });
            }

            route.push(next.id);
            match self.step_at(&next, target).await {
                Ok(s) => {
                    responder = Some(next);
                    step = s;
                }
                Err(Error::UnreachablePeer(peer)) => {
                    tracing::warn!(
                        "{} lookup {}: {} unreachable, skipping it",
                        self.descriptor(),
                        target,
                        peer
                    );
                    self.dht.remove(next.id)?;
                    step = match &responder {
                        // we chose `next` from our own fingers, retry with what is left
                        None => self.local_step(target)?,
                        Some(_) if fallback.id != next.id => FindSuccessorStep::Forward {
                            next: fallback.clone(),
                            successor: fallback,
                        },
                        Some(_) => return Err(Error::UnreachablePeer(peer)),
                    };
                    if let FindSuccessorStep::Forward { next: retry, .. } = &step {
                        if retry.id == next.id {
                            return Err(Error::UnreachablePeer(peer));
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn local_step(&self, target: Identifier) -> Result<FindSuccessorStep> {
        match self.dht.find_successor(target)? {
            RingAction::Some(owner) => Ok(FindSuccessorStep::Found(owner)),
            RingAction::RemoteAction(next, PeerRingRemoteAction::FindSuccessor(_)) => {
                Ok(FindSuccessorStep::Forward {
                    next,
                    successor: self.dht.successor()?,
                })
            }
            act => {
                tracing::error!("Invalid RingAction {:?}", act);
                Err(Error::PeerRingInvalidAction)
            }
        }
    }

    async fn step_at(&self, node: &NodeDescriptor, target: Identifier) -> Result<FindSuccessorStep> {
        if node.id == self.id() {
            return self.local_step(target);
        }
        self.transport.find_successor_step(node, target).await
    }

    /// Join the ring `bootstrap` belongs to, or start a new ring when `None`.
    ///
    /// The successor and its predecessor are both read before any state changes. Then
    /// the successor is asked to adopt this node as predecessor and the old predecessor
    /// to adopt it as successor. Finally the entries this node now owns are taken over
    /// from the successor.
    pub async fn join(&self, bootstrap: Option<&NodeDescriptor>) -> Result<()> {
        let Some(bootstrap) = bootstrap else {
            return self.dht.join_alone();
        };
        if bootstrap.id == self.id() {
            if bootstrap == self.descriptor() {
                return self.dht.join_alone();
            }
            return Err(Error::IdentifierCollision(self.id().value()));
        }

        let remote_space = self.transport.handshake(bootstrap, self.space()).await?;
        self.space().ensure_compatible(&remote_space)?;

        let successor = self.route(Some(bootstrap), self.id()).await?.owner;
        if successor.id == self.id() {
            return Err(Error::IdentifierCollision(self.id().value()));
        }
        let predecessor = self.transport.get_predecessor(&successor).await?;
        // the arc taken over from the successor, the whole (successor, self] when the
        // successor knows no predecessor
        let from = predecessor.as_ref().map_or(successor.id, |p| p.id);

        let action = self.dht.join(successor.clone(), predecessor)?;
        self.run_action(action).await?;

        let entries = self
            .transport
            .hand_off(&successor, from, self.id())
            .await?;
        let count = entries.len();
        for (id, value) in entries {
            self.dht.storage_put(id, value).await?;
        }
        tracing::info!(
            "{} joined via {}, successor: {}, took over {} entries",
            self.descriptor(),
            bootstrap,
            successor,
            count
        );
        Ok(())
    }

    /// One round of stabilization: adopt the predecessor of our successor if it sits
    /// between us, then notify the successor.
    pub async fn stabilize(&self) -> Result<()> {
        let successor = self.dht.successor()?;
        let x = if successor.id == self.id() {
            self.dht.predecessor()?
        } else {
            self.transport.get_predecessor(&successor).await?
        };
        let action = self.dht.stabilize(x)?;
        self.run_action(action).await
    }

    /// Refresh every finger.
    ///
    /// A failing lookup doesn't stop the others; the first error is returned once all
    /// entries were tried.
    pub async fn fix_fingers(&self) -> Result<()> {
        let action = self.dht.fix_fingers()?;
        self.fix_with(action, true).await
    }

    /// Refresh the next finger in rotation.
    ///
    /// The refresh counts as complete once a whole rotation changed no entry.
    pub async fn fix_next_finger(&self) -> Result<()> {
        let action = self.dht.fix_next_finger()?;
        self.fix_with(action, false).await
    }

    async fn fix_with(&self, action: RingAction, full: bool) -> Result<()> {
        let mut changed = false;
        let mut rotated = false;
        let mut first_err = None;
        for act in action.into_actions() {
            match act {
                RingAction::RemoteAction(
                    _,
                    PeerRingRemoteAction::FindSuccessorForFix { index, start },
                ) => match self.find_successor(start).await {
                    Ok(owner) => {
                        let entry_changed = self.dht.set_finger(index, owner)?;
                        if !full {
                            rotated = self.dht.record_fix_rotation(index, !entry_changed)?;
                        }
                        changed |= entry_changed;
                    }
                    Err(e) => {
                        if !full {
                            self.dht.record_fix_rotation(index, false)?;
                        }
                        tracing::warn!(
                            "{} fix finger {} ({}) failed: {}",
                            self.descriptor(),
                            index,
                            start,
                            e
                        );
                        first_err.get_or_insert(e);
                    }
                },
                act => {
                    tracing::error!("Invalid RingAction {:?}", act);
                    return Err(Error::PeerRingInvalidAction);
                }
            }
        }
        let complete = if full { first_err.is_none() } else { rotated };
        self.dht.record_fix_fingers(changed, complete)?;
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Carry out `Notify` and `UpdateSuccessor` actions, locally when they target this node.
    async fn run_action(&self, action: RingAction) -> Result<()> {
        for act in action.into_actions() {
            match act {
                RingAction::RemoteAction(target, PeerRingRemoteAction::Notify(candidate)) => {
                    if target.id == self.id() {
                        self.dht.notify(candidate)?;
                    } else {
                        self.transport.notify(&target, candidate).await?;
                    }
                }
                RingAction::RemoteAction(
                    target,
                    PeerRingRemoteAction::UpdateSuccessor(candidate),
                ) => {
                    if target.id == self.id() {
                        self.dht.update_successor(candidate)?;
                    } else {
                        self.transport.update_successor(&target, candidate).await?;
                    }
                }
                act => {
                    tracing::error!("Invalid RingAction {:?}", act);
                    return Err(Error::PeerRingInvalidAction);
                }
            }
        }
        Ok(())
    }

    /// Store `value` under `key` at the node owning `hash(key)`.
    pub async fn put(&self, key: impl AsRef<[u8]>, value: impl Into<Bytes>) -> Result<()> {
        self.put_hashed(self.space().hash(key), value.into()).await
    }

    /// Read the value of `key`. `Ok(None)` means no value is stored.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        self.get_hashed(self.space().hash(key)).await
    }

    /// Delete the value of `key`, returning it.
    pub async fn remove(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let id = self.space().hash(key);
        let owner = self.find_successor(id).await?;
        if owner.id == self.id() {
            return self.dht.storage_remove(id).await;
        }
        self.transport.remove(&owner, id).await
    }

    /// Store `value` under an already hashed identifier.
    pub async fn put_hashed(&self, id: Identifier, value: Bytes) -> Result<()> {
        let owner = self.find_successor(id).await?;
        tracing::debug!("{} put {} at {}", self.descriptor(), id, owner);
        if owner.id == self.id() {
            return self.dht.storage_put(id, value).await;
        }
        self.transport.put(&owner, id, value).await
    }

    /// Read the value of an already hashed identifier.
    pub async fn get_hashed(&self, id: Identifier) -> Result<Option<Bytes>> {
        let owner = self.find_successor(id).await?;
        if owner.id == self.id() {
            return self.dht.storage_get(id).await;
        }
        self.transport.get(&owner, id).await
    }

    fn ensure_member(&self, id: Identifier) -> Result<()> {
        if !self.space().contains(id) {
            return Err(Error::Configuration(format!(
                "identifier {} does not fit a {} bits identifier space",
                id,
                self.space().bits()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for RingNode {
    async fn handle_message(&self, message: Message) -> Result<Response> {
        tracing::trace!("{} handle {:?}", self.descriptor(), message);
        match message {
            Message::Handshake(space) => {
                if let Err(e) = self.space().ensure_compatible(&space) {
                    tracing::warn!("{} handshake: {}", self.descriptor(), e);
                }
                Ok(Response::Space(self.space()))
            }
            Message::FindSuccessor(id) => {
                self.ensure_member(id)?;
                Ok(Response::Step(self.local_step(id)?))
            }
            Message::GetPredecessor => Ok(Response::Node(self.dht.predecessor()?)),
            Message::GetSuccessor => Ok(Response::Node(Some(self.dht.successor()?))),
            Message::Notify(candidate) => {
                self.ensure_member(candidate.id)?;
                self.dht.notify(candidate)?;
                Ok(Response::Ack)
            }
            Message::UpdateSuccessor(candidate) => {
                self.ensure_member(candidate.id)?;
                self.dht.update_successor(candidate)?;
                Ok(Response::Ack)
            }
            Message::HandOff { from, to } => {
                self.ensure_member(from)?;
                self.ensure_member(to)?;
                Ok(Response::Entries(self.dht.hand_off(from, to).await?))
            }
            Message::Put { id, value } => {
                self.ensure_member(id)?;
                self.dht.storage_put(id, value).await?;
                Ok(Response::Ack)
            }
            Message::Get { id } => {
                self.ensure_member(id)?;
                Ok(Response::Value(self.dht.storage_get(id).await?))
            }
            Message::Remove { id } => {
                self.ensure_member(id)?;
                Ok(Response::Value(self.dht.storage_remove(id).await?))
            }
        }
    }
}
