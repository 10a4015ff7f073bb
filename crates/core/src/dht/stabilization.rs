//! Stabilization run daemons to maintain dht.

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::config::RingConfig;
use crate::error::Result;
use crate::node::RingNode;

/// The stabilization runner of one node.
///
/// `stabilize` and `fix_fingers` run on independent timers so a slow finger refresh
/// never delays the repair of successor pointers.
#[derive(Clone)]
pub struct Stabilizer {
    node: Arc<RingNode>,
    stabilize_interval: Duration,
    fix_fingers_interval: Duration,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(node: Arc<RingNode>, config: &RingConfig) -> Self {
        Self {
            node,
            stabilize_interval: config.stabilize_interval(),
            fix_fingers_interval: config.fix_fingers_interval(),
        }
    }

    /// Run stabilization once: one stabilize round, then a full finger refresh.
    pub async fn stabilize(&self) -> Result<()> {
        tracing::debug!("STABILIZATION stabilize start");
        if let Err(e) = self.node.stabilize().await {
            tracing::error!("[stabilize] Failed on stabilize {:?}", e);
        }
        tracing::debug!("STABILIZATION stabilize end");
        tracing::debug!("STABILIZATION fix_fingers start");
        if let Err(e) = self.node.fix_fingers().await {
            tracing::error!("[stabilize] Failed on fix_finger {:?}", e);
        }
        tracing::debug!("STABILIZATION fix_fingers end");
        Ok(())
    }

    async fn stabilize_loop(&self) {
        loop {
            let timeout = Delay::new(self.stabilize_interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => self
                    .node
                    .stabilize()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to stabilize {:?}", e)),
            }
        }
    }

    async fn fix_fingers_loop(&self) {
        loop {
            let timeout = Delay::new(self.fix_fingers_interval).fuse();
            pin_mut!(timeout);
            select! {
                _ = timeout => self
                    .node
                    .fix_next_finger()
                    .await
                    .unwrap_or_else(|e| tracing::error!("failed to fix finger {:?}", e)),
            }
        }
    }

    /// Run both maintenance timers until the returned future is dropped.
    pub async fn wait(self: Arc<Self>) {
        futures::join!(self.stabilize_loop(), self.fix_fingers_loop());
    }
}
