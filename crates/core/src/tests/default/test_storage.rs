use bytes::Bytes;

use crate::dht::ChordStorage;
use crate::error::Result;
use crate::tests::default::expected_owner;
use crate::tests::default::gen_ring;

#[tokio::test]
async fn test_put_is_stored_at_owner() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    let space = ring.config.space()?;
    assert_eq!(space.hash("key-48"), ring.id(37));

    ring.node(200).put("key-48", "v1").await?;
    let owner = ring.node(50).dht();
    assert_eq!(owner.storage_get(ring.id(37)).await?, Some(Bytes::from("v1")));
    assert_eq!(ring.node(10).dht().storage_get(ring.id(37)).await?, None);

    for node in ring.directory.members() {
        assert_eq!(node.get("key-48").await?, Some(Bytes::from("v1")));
    }
    Ok(())
}

#[tokio::test]
async fn test_get_missing_key_is_none() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    // "B" hashes to 236, owned by 10
    assert_eq!(ring.config.space()?.hash("B"), ring.id(236));
    assert_eq!(ring.node(10).get("B").await?, None);
    assert_eq!(ring.node(150).get("B").await?, None);
    Ok(())
}

#[tokio::test]
async fn test_put_get_from_any_node() -> Result<()> {
    let ids = [10, 50, 90, 130, 170, 210];
    let ring = gen_ring(8, &ids).await?;
    let space = ring.config.space()?;
    let members = ring.directory.members();

    for i in 0..40 {
        let key = format!("key-{i}");
        let writer = &members[i % members.len()];
        writer.put(&key, format!("value-{i}")).await?;

        let owner = ring.node(expected_owner(&ids, space.hash(&key).value()));
        assert!(owner.dht().storage_get(space.hash(&key)).await?.is_some());
    }

    for node in members.iter() {
        for i in 0..40 {
            let key = format!("key-{i}");
            assert_eq!(node.get(&key).await?, Some(Bytes::from(format!("value-{i}"))));
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_put_overwrites_and_remove() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    let a = ring.node(10);
    let b = ring.node(150);

    a.put("A", "v1").await?;
    b.put("A", "v2").await?;
    assert_eq!(a.get("A").await?, Some(Bytes::from("v2")));

    assert_eq!(b.remove("A").await?, Some(Bytes::from("v2")));
    assert_eq!(a.get("A").await?, None);
    assert_eq!(a.remove("A").await?, None);

    a.put_hashed(ring.id(255), Bytes::from("wrapped")).await?;
    assert_eq!(
        ring.node(10).dht().storage_get(ring.id(255)).await?,
        Some(Bytes::from("wrapped"))
    );
    assert_eq!(b.get_hashed(ring.id(255)).await?, Some(Bytes::from("wrapped")));
    Ok(())
}

#[tokio::test]
async fn test_join_takes_over_keys() -> Result<()> {
    let ring = gen_ring(8, &[10, 50, 150, 200]).await?;
    let space = ring.config.space()?;
    let writer = ring.node(10);

    // "hello" -> 77 and "world" -> 67 belong to 150 until 100 joins, "A" -> 27 stays at 50
    for key in ["hello", "world", "A"] {
        writer.put(key, key.to_uppercase()).await?;
    }
    assert!(ring
        .node(150)
        .dht()
        .storage_get(space.hash("hello"))
        .await?
        .is_some());

    let joined = ring.admit(100).await?;
    ring.stabilize_rounds(2).await?;

    assert_eq!(
        joined.dht().storage_get(space.hash("hello")).await?,
        Some(Bytes::from("HELLO"))
    );
    assert_eq!(
        joined.dht().storage_get(space.hash("world")).await?,
        Some(Bytes::from("WORLD"))
    );
    assert_eq!(ring.node(150).dht().storage_get(space.hash("hello")).await?, None);
    assert_eq!(
        ring.node(50).dht().storage_get(space.hash("A")).await?,
        Some(Bytes::from("A"))
    );

    for node in ring.directory.members() {
        assert_eq!(node.get("hello").await?, Some(Bytes::from("HELLO")));
        assert_eq!(node.get("A").await?, Some(Bytes::from("A")));
    }
    Ok(())
}
