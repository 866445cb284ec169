use std::sync::Arc;
use std::time::Duration;

use suzaku_transport::connections::DummyNetwork;
use suzaku_transport::SharedScheduler;
use suzaku_transport::TokioScheduler;

use crate::ddll::Mode;
use crate::error::Error;
use crate::error::Result;
use crate::inspect::ManagerInspect;
use crate::inspect::NodeInspect;
use crate::message::GetStat;
use crate::message::GetStatMulti;
use crate::message::Message;
use crate::message::MessagePayload;
use crate::ring::Link;
use crate::ring::RingKey;
use crate::tests::default::key;
use crate::tests::default::prepare_manager;
use crate::tests::default::settle;
use crate::tests::default::test_config;

#[tokio::test(start_paused = true)]
async fn test_create_node_rejects_duplicate_key() -> Result<()> {
    let network = DummyNetwork::new();
    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let manager = prepare_manager(&network, &scheduler, "a", test_config())?;

    manager.create_node(key(10))?;
    assert!(matches!(
        manager.create_node(key(10)),
        Err(Error::KeyAlreadyExists(_))
    ));
    assert!(matches!(
        manager.remove_node(&key(20)),
        Err(Error::NoSuchKey(_))
    ));
    let removed = manager.remove_node(&key(10))?;
    assert_eq!(removed.me().key, key(10));
    assert!(manager.node(&key(10)).is_none());

    manager.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_is_rejected() -> Result<()> {
    let network = DummyNetwork::new();
    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let mut config = test_config();
    config.suzaku.branching_bits = 0;

    let result = prepare_manager(&network, &scheduler, "a", config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_answers_heartbeats_and_unknown_keys() -> Result<()> {
    let network = DummyNetwork::new();
    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let manager = prepare_manager(&network, &scheduler, "a", test_config())?;
    let node = manager.create_node(key(10))?;
    node.insert_as_initial().await?;
    manager.create_node(key(20))?;

    let stranger = Link::new("b".into(), key(99));
    let heartbeat = MessagePayload::new(
        stranger.clone(),
        node.me().clone(),
        Message::GetStatMulti(GetStatMulti {
            keys: vec![key(10), key(20), key(30)],
        }),
    );
    let Some(Message::SetStatMulti(reply)) = manager.dispatch(&heartbeat).await else {
        panic!("expected SetStatMulti");
    };
    assert_eq!(reply.stats.len(), 3);
    assert_eq!(reply.stats[0].as_ref().map(|s| s.mode), Some(Mode::In));
    // 20 exists but has not joined, 30 does not exist
    assert!(reply.stats[1].is_none());
    assert!(reply.stats[2].is_none());

    let misdirected = MessagePayload::new(
        stranger,
        Link::new("a".into(), RingKey::search(30)),
        Message::GetStat(GetStat { req_no: 1 }),
    );
    assert!(matches!(
        manager.dispatch(&misdirected).await,
        Some(Message::Failure(_))
    ));

    manager.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_nodes_sharing_an_endpoint() -> Result<()> {
    let network = DummyNetwork::new();
    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let a = prepare_manager(&network, &scheduler, "a", test_config())?;
    let b = prepare_manager(&network, &scheduler, "b", test_config())?;

    let n10 = a.create_node(key(10))?;
    let n20 = b.create_node(key(20))?;
    let n30 = a.create_node(key(30))?;
    let n40 = b.create_node(key(40))?;
    n10.insert_as_initial().await?;
    for node in [&n20, &n30, &n40] {
        assert!(node.insert(n10.me()).await?);
        settle().await;
    }

    assert_eq!(n10.ddll().right()?, Some(n20.me().clone()));
    assert_eq!(n30.ddll().left()?, Some(n20.me().clone()));
    assert_eq!(n40.ddll().right()?, Some(n10.me().clone()));

    // b crashes and takes 20 and 40 with it
    network.kill(b.endpoint());
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(n10.ddll().right()?, Some(n30.me().clone()));
    assert_eq!(n10.ddll().left()?, Some(n30.me().clone()));
    assert_eq!(n30.ddll().right()?, Some(n10.me().clone()));
    assert_eq!(n30.ddll().left()?, Some(n10.me().clone()));

    a.shutdown();
    b.shutdown();
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_inspect_reports_links_and_tables() -> Result<()> {
    let network = DummyNetwork::new();
    let scheduler: SharedScheduler = Arc::new(TokioScheduler::new());
    let manager = prepare_manager(&network, &scheduler, "a", test_config())?;
    let n10 = manager.create_node(key(10))?;
    let n20 = manager.create_node(key(20))?;
    n10.insert_as_initial().await?;
    assert!(n20.insert(n10.me()).await?);
    settle().await;
    n10.suzaku().update_pass().await?;

    let inspect = NodeInspect::inspect(&n10)?;
    assert_eq!(inspect.mode, Mode::In);
    assert_eq!(inspect.right, Some(n20.me().to_string()));
    assert_eq!(inspect.left, Some(n20.me().to_string()));
    assert_eq!(inspect.update_cycles, 1);
    assert_eq!(inspect.forward[0].primary, n20.me().to_string());

    let json = serde_json::to_string(&inspect).unwrap();
    let back: NodeInspect = serde_json::from_str(&json).unwrap();
    assert_eq!(back, inspect);

    let all = ManagerInspect::inspect(&manager);
    assert_eq!(all.endpoint, "a");
    assert_eq!(all.nodes.len(), 2);

    manager.shutdown();
    Ok(())
}
