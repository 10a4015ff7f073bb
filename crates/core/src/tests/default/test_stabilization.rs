use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::config::RingConfig;
use crate::dht::DigestAlgorithm;
use crate::dht::NodeStatus;
use crate::dht::Stabilizer;
use crate::error::Error;
use crate::error::Result;
use crate::tests::default::assert_single_cycle;
use crate::tests::default::gen_node;
use crate::tests::default::gen_random_ids;
use crate::tests::default::gen_ring;
use crate::tests::default::TestRing;
use crate::transport::TransportExt;

#[tokio::test]
async fn test_single_node_ring() -> Result<()> {
    let ring = gen_ring(8, &[42]).await?;
    let node = ring.node(42);
    assert_eq!(node.dht().successor()?, *node.descriptor());
    assert_eq!(node.dht().predecessor()?, Some(node.descriptor().clone()));
    assert_single_cycle(&ring).await;
    assert_eq!(node.find_successor(ring.id(200)).await?.id, ring.id(42));
    Ok(())
}

#[tokio::test]
async fn test_join_splices_immediately() -> Result<()> {
    let ring = TestRing::new(RingConfig::new(8))?;
    for id in [10, 50, 150, 200] {
        ring.admit(id).await?;
        assert_single_cycle(&ring).await;
    }
    let joined = ring.node(200);
    assert_eq!(joined.status()?, NodeStatus::Attached);
    assert_eq!(
        ring.transport.get_successor(ring.node(150).descriptor()).await?,
        *joined.descriptor()
    );
    assert_eq!(
        ring.transport.get_predecessor(ring.node(10).descriptor()).await?,
        Some(joined.descriptor().clone())
    );
    Ok(())
}

#[tokio::test]
async fn test_join_and_restabilize() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    ring.admit(100).await?;
    ring.stabilize_rounds(2).await?;
    assert_single_cycle(&ring).await;
    assert_eq!(ring.ids(), vec![10, 50, 100, 150, 200]);

    for node in ring.directory.members() {
        assert_eq!(node.find_successor(ring.id(75)).await?.id, ring.id(100));
    }
    Ok(())
}

#[tokio::test]
async fn test_random_joins_form_single_cycle() -> Result<()> {
    let ids = gen_random_ids(12, 16);
    let ring = gen_ring(12, &ids).await?;
    assert_single_cycle(&ring).await;
    Ok(())
}

#[tokio::test]
async fn test_concurrent_joins_converge() -> Result<()> {
    let ring = gen_ring(8, &[10, 130]).await?;
    let bootstrap = ring.node(10).descriptor().clone();

    let joining = [30, 60, 90, 160, 200, 240]
        .into_iter()
        .map(|id| ring.gen_node(id))
        .collect::<Result<Vec<_>>>()?;
    let joins = joining.iter().map(|node| node.join(Some(&bootstrap)));
    for res in join_all(joins).await {
        res?;
    }
    for node in joining {
        ring.directory.register(node)?;
    }

    ring.stabilize_rounds(6).await?;
    assert_single_cycle(&ring).await;
    Ok(())
}

#[tokio::test]
async fn test_status_reaches_stable() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    for node in ring.directory.members() {
        assert_ne!(node.status()?, NodeStatus::Unjoined);
    }

    ring.stabilize_rounds(2).await?;
    ring.stabilize_all().await?;
    for node in ring.directory.members() {
        assert_eq!(node.status()?, NodeStatus::Stable, "node {}", node.id());
    }

    // the successor of the new node learns about it and leaves Stable
    ring.admit(100).await?;
    assert_eq!(ring.node(150).status()?, NodeStatus::Converging);
    assert_eq!(ring.node(100).status()?, NodeStatus::Attached);

    ring.stabilize_rounds(3).await?;
    ring.stabilize_all().await?;
    for node in ring.directory.members() {
        assert_eq!(node.status()?, NodeStatus::Stable, "node {}", node.id());
    }
    Ok(())
}

#[tokio::test]
async fn test_background_maintenance_reaches_stable() -> Result<()> {
    let config = RingConfig {
        stabilize_interval_ms: 2,
        fix_fingers_interval_ms: 2,
        ..RingConfig::new(8)
    };
    let ring = TestRing::new(config)?;
    for id in [10, 50, 150, 200] {
        ring.admit(id).await?;
    }
    assert_ne!(ring.node(200).status()?, NodeStatus::Stable);

    let runners = ring
        .directory
        .members()
        .into_iter()
        .map(|node| Arc::new(Stabilizer::new(node, &ring.config)).wait());
    let waiting = tokio::time::timeout(Duration::from_millis(1500), join_all(runners)).await;
    assert!(waiting.is_err());

    assert_single_cycle(&ring).await;
    for node in ring.directory.members() {
        assert_eq!(node.status()?, NodeStatus::Stable, "node {}", node.id());
    }
    Ok(())
}

#[tokio::test]
async fn test_join_with_mismatched_space_fails() -> Result<()> {
    let ring = gen_ring(8, &[10, 50]).await?;
    let bootstrap = ring.node(10).descriptor().clone();

    let wide = gen_node(&ring.transport, &RingConfig::new(16), 1000)?;
    assert!(matches!(
        wide.join(Some(&bootstrap)).await,
        Err(Error::Configuration(_))
    ));

    let sha256 = RingConfig {
        digest: DigestAlgorithm::Sha256,
        ..RingConfig::new(8)
    };
    let other = gen_node(&ring.transport, &sha256, 100)?;
    assert!(matches!(
        other.join(Some(&bootstrap)).await,
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        ring.directory.admit(other.clone()).await,
        Err(Error::Configuration(_))
    ));

    // the ring is untouched
    assert_single_cycle(&ring).await;
    assert_eq!(other.status()?, NodeStatus::Unjoined);
    Ok(())
}

#[tokio::test]
async fn test_identifier_collision() -> Result<()> {
    let ring = gen_ring(8, &[10, 50]).await?;
    let bootstrap = ring.node(10).descriptor().clone();

    let space = ring.config.space()?;
    let twin = Arc::new(crate::node::RingNode::new(
        crate::dht::NodeDescriptor::new(space.identifier(50)?, "mem://twin"),
        &ring.config,
        ring.transport.clone(),
    )?);
    ring.transport.register("mem://twin", &twin);

    assert!(matches!(
        twin.join(Some(&bootstrap)).await,
        Err(Error::IdentifierCollision(50))
    ));
    assert!(matches!(
        ring.directory.admit(twin).await,
        Err(Error::IdentifierCollision(50))
    ));
    assert_single_cycle(&ring).await;
    Ok(())
}
