//! Bootstrap registry of the members of a ring.
//!
//! The directory only helps a new node find someone to join through, and lets tests
//! and inspection enumerate the members. Routing never consults it.
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::dht::Identifier;
use crate::dht::IdentifierSpace;
use crate::error::Error;
use crate::error::Result;
use crate::node::RingNode;

pub struct RingDirectory {
    space: IdentifierSpace,
    members: DashMap<Identifier, Arc<RingNode>>,
}

impl RingDirectory {
    pub fn new(space: IdentifierSpace) -> Self {
        Self {
            space,
            members: DashMap::new(),
        }
    }

    pub fn space(&self) -> IdentifierSpace {
        self.space
    }

    /// The member a new node joins through, the one with the lowest identifier.
    pub fn bootstrap(&self) -> Option<Arc<RingNode>> {
        self.members
            .iter()
            .min_by_key(|entry| *entry.key())
            .map(|entry| entry.value().clone())
    }

    /// Join `node` to the ring through the bootstrap member and register it.
    /// The first node admitted starts the ring.
    pub async fn admit(&self, node: Arc<RingNode>) -> Result<()> {
        self.space.ensure_compatible(&node.space())?;
        if self.members.contains_key(&node.id()) {
            return Err(Error::IdentifierCollision(node.id().value()));
        }

        let bootstrap = self.bootstrap();
        let bootstrap = bootstrap.as_ref().map(|b| b.descriptor());
        node.join(bootstrap).await?;
        self.register(node)
    }

    /// Register a node that is already a member of the ring.
    pub fn register(&self, node: Arc<RingNode>) -> Result<()> {
        self.space.ensure_compatible(&node.space())?;
        match self.members.entry(node.id()) {
            Entry::Occupied(entry) => Err(Error::IdentifierCollision(entry.key().value())),
            Entry::Vacant(entry) => {
                tracing::debug!("directory: registered {}", node.descriptor());
                entry.insert(node);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: Identifier) -> Option<Arc<RingNode>> {
        self.members.get(&id).map(|entry| entry.value().clone())
    }

    /// Members sorted by identifier.
    pub fn members(&self) -> Vec<Arc<RingNode>> {
        let mut members: Vec<Arc<RingNode>> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by_key(|node| node.id());
        members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
