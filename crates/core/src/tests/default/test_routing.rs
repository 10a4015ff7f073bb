use crate::config::RingConfig;
use crate::dht::Chord;
use crate::dht::IdentifierSpace;
use crate::error::Error;
use crate::error::Result;
use crate::tests::default::expected_owner;
use crate::tests::default::gen_random_ids;
use crate::tests::default::gen_ring;
use crate::tests::default::TestRing;
use crate::transport::TransportExt;

#[tokio::test]
async fn test_find_successor_small_ring() -> Result<()> {
    let ring = gen_ring(4, &[1, 4, 8, 12]).await?;
    let id = |v| ring.id(v);

    let node = ring.node(1);
    assert_eq!(node.find_successor(id(5)).await?.id, id(8));
    assert_eq!(node.find_successor(id(4)).await?.id, id(4));
    assert_eq!(node.find_successor(id(0)).await?.id, id(1));
    assert_eq!(node.find_successor(id(13)).await?.id, id(1));

    for node in ring.directory.members() {
        for k in 0..16 {
            let owner = node.find_successor(id(k)).await?;
            assert_eq!(owner.id.value(), expected_owner(&[1, 4, 8, 12], k));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_lookup_hops_bounded_after_fix_fingers() -> Result<()> {
    let ids = [10, 50, 90, 130, 170, 210];
    let ring = gen_ring(8, &ids).await?;

    for node in ring.directory.members() {
        for k in 0..256 {
            let lookup = node.lookup(ring.id(k)).await?;
            assert_eq!(lookup.owner.id.value(), expected_owner(&ids, k));
            assert!(
                lookup.hops() <= 8,
                "lookup of {} from {} took {:?}",
                k,
                node.id(),
                lookup.route
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_fingers_point_at_successor_of_start() -> Result<()> {
    let ids = [10, 50, 90, 130, 170, 210];
    let ring = gen_ring(8, &ids).await?;
    let space = ring.config.space()?;

    for node in ring.inspect().await.nodes {
        let fingers = node.fingers();
        assert_eq!(fingers.len(), 8);
        for (k, finger) in fingers.into_iter().enumerate() {
            let start = space.finger_start(ring.id(node.id), k).value();
            assert_eq!(
                finger,
                Some(expected_owner(&ids, start)),
                "finger {} of {}",
                k,
                node.id
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_random_ring_routing() -> Result<()> {
    let ids = gen_random_ids(16, 24);
    let ring = gen_ring(16, &ids).await?;

    let keys = gen_random_ids(16, 64);
    for node in ring.directory.members() {
        for k in keys.iter() {
            let lookup = node.lookup(ring.id(*k)).await?;
            assert_eq!(lookup.owner.id.value(), expected_owner(&ids, *k));
            assert!(lookup.hops() <= 16);
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_lookup_skips_unreachable_finger() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 90, 130, 170, 210]).await?;
    ring.kill(90);

    let node = ring.node(10);
    let lookup = node.lookup(ring.id(160)).await?;
    assert_eq!(lookup.owner.id, ring.id(170));
    // 90 failed, then 50 forwards to 130 which knows the owner
    assert_eq!(lookup.route, vec![ring.id(90), ring.id(50), ring.id(130)]);
    assert_eq!(lookup.hops(), 3);
    assert!(!node.dht().lock_finger()?.contains(ring.id(90)));
    Ok(())
}

#[tokio::test]
async fn test_lookup_falls_back_to_responder_successor() -> Result<()> {
    let ids: Vec<u64> = (0..16).map(|i| i * 16 + 3).collect();
    let ring = gen_ring(8, &ids).await?;
    ring.kill(99);

    // 3 picks 67 itself; 67 answers with its finger 99, which is dead, so the lookup
    // continues at 83, the successor of 67, and 83 forwards to 115
    let node = ring.node(3);
    let lookup = node.lookup(ring.id(120)).await?;
    assert_eq!(lookup.owner.id, ring.id(131));
    assert_eq!(lookup.route, vec![
        ring.id(67),
        ring.id(99),
        ring.id(83),
        ring.id(115)
    ]);
    assert_eq!(lookup.hops(), 4);

    // a lookup either finds the right owner or reports the dead peer, and some of them
    // only succeed by falling back past a hop chosen remotely
    let mut fallbacks = 0;
    for source in ids.iter().filter(|id| **id != 99) {
        let node = ring.node(*source);
        for k in 0..256 {
            match node.lookup(ring.id(k)).await {
                Ok(lookup) => {
                    assert_eq!(
                        lookup.owner.id.value(),
                        expected_owner(&ids, k),
                        "lookup of {} from {}",
                        k,
                        source
                    );
                    if lookup.route.iter().skip(1).any(|id| id.value() == 99) {
                        fallbacks += 1;
                    }
                }
                Err(Error::UnreachablePeer(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }
    assert!(fallbacks > 0);
    Ok(())
}

#[tokio::test]
async fn test_lookup_fails_when_no_progress_is_possible() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 90, 130, 170, 210]).await?;
    ring.kill(170);

    let node = ring.node(10);
    assert!(matches!(
        node.find_successor(ring.id(200)).await,
        Err(Error::UnreachablePeer(_))
    ));
    // keys not owned by 170 are still found
    assert_eq!(node.find_successor(ring.id(100)).await?.id, ring.id(130));
    Ok(())
}

#[tokio::test]
async fn test_routing_failure_when_hop_bound_exceeded() -> Result<()> {
    let config = RingConfig {
        max_hops: Some(2),
        ..RingConfig::new(4)
    };
    let ring = TestRing::new(config)?;
    let ids: Vec<u64> = (1..16).step_by(2).collect();
    let nodes = ids
        .iter()
        .map(|id| ring.gen_node(*id))
        .collect::<Result<Vec<_>>>()?;

    // wire the ring by hand, every node only knows its neighbours
    for (i, node) in nodes.iter().enumerate() {
        let succ = nodes[(i + 1) % nodes.len()].descriptor().clone();
        let pred = nodes[(i + nodes.len() - 1) % nodes.len()].descriptor().clone();
        node.dht().join(succ, Some(pred))?;
    }

    assert!(matches!(
        nodes[0].find_successor(ring.id(14)).await,
        Err(Error::RoutingFailure { target: 14, hops: 2 })
    ));
    assert_eq!(nodes[0].find_successor(ring.id(5)).await?.id, ring.id(5));
    Ok(())
}

#[tokio::test]
async fn test_out_of_range_identifiers_rejected() -> Result<()> {
    let ring = gen_ring(8, &[10, 50]).await?;
    let node = ring.node(10);
    let wide = IdentifierSpace::with_bits(16)?.identifier(300)?;

    assert!(matches!(
        node.find_successor(wide).await,
        Err(Error::IdentifierOutOfRange { id: 300, bits: 8 })
    ));
    assert!(matches!(
        ring.transport
            .find_successor_step(ring.node(50).descriptor(), wide)
            .await,
        Err(Error::PeerRejected(reason)) if reason.contains("Configuration")
    ));
    Ok(())
}
