//! Admission control over the wire: garbage, blacklists, unknown
//! relays.

use skyhub_core::addr::NetAddress;
use skyhub_core::wire::RELAY_MAGIC;

use crate::*;

/// Garbage gets counted, remembered as an error session, and never
/// answered.
#[tokio::test]
async fn garbage_is_recorded_and_ignored() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let client = Client::new().await?;

    client.send(hub_addr, b"definitely not a packet").await?;

    assert!(wait_for(|| hub.stats.snapshot().invalid_packets == 1).await);
    let bad = hub.sessions.find_by_name("* Bad Client *").unwrap();
    assert!(bad.error.is_some());
    assert!(client.recv_timeout(300).await.is_none());
    Ok(())
}

/// Blacklisted sources are dropped before any parsing; no session, no
/// reply, only a counter.
#[tokio::test]
async fn blacklisted_source_is_silently_dropped() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let client = Client::new().await?;
    hub.add_blacklist(
        "test block",
        NetAddress::from(client.addr),
        0,
        unix_now(),
    );

    client
        .send(
            hub_addr,
            &position_packet("D-ABCD", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC),
        )
        .await?;

    assert!(wait_for(|| hub.stats.snapshot().blacklist_rejected == 1).await);
    assert!(hub.sessions.is_empty());
    assert!(client.recv_timeout(300).await.is_none());
    Ok(())
}

/// Relay-stamped traffic from an unknown address blacklists the
/// sender; everything after that dies on the blacklist.
#[tokio::test]
async fn unknown_relay_is_auto_blacklisted() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let impostor = Client::new().await?;

    let pkt = position_packet("REMOTE", "c172p", pos_near_eddf(0.0), 0, RELAY_MAGIC);
    impostor.send(hub_addr, &pkt).await?;

    assert!(wait_for(|| hub.stats.snapshot().unknown_relay == 1).await);
    let block = hub
        .blacklist
        .find_containing(&NetAddress::from(impostor.addr))
        .expect("impostor not blacklisted");
    assert_eq!(block.name, "not a valid relay");
    assert!(hub.sessions.is_empty());

    impostor.send(hub_addr, &pkt).await?;
    assert!(wait_for(|| hub.stats.snapshot().blacklist_rejected == 1).await);
    Ok(())
}

/// A whitelisted peer may speak with the relay magic and its traffic
/// opens remote sessions.
#[tokio::test]
async fn whitelisted_relay_opens_remote_sessions() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let peer = Client::new().await?;
    hub.add_whitelist(NetAddress::from(peer.addr), unix_now());

    peer.send(
        hub_addr,
        &position_packet("REMOTE", "c172p", pos_near_eddf(0.0), 0, RELAY_MAGIC),
    )
    .await?;

    assert!(wait_for(|| hub.sessions.find_by_name("REMOTE").is_some()).await);
    let s = hub.sessions.find_by_name("REMOTE").unwrap();
    assert!(!s.is_local);
    assert_eq!(hub.stats.snapshot().remote_sessions, 1);
    Ok(())
}

/// Silent sessions disappear after ttl + join grace.
#[tokio::test]
async fn silent_sessions_expire() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams {
        session_ttl: 1,
        ..HubParams::default()
    })
    .await?;
    let client = Client::new().await?;

    client
        .send(
            hub_addr,
            &position_packet("D-ABCD", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(wait_for(|| hub.sessions.len() == 1).await);

    // past ttl and past the 30s join grace
    hub.expire(unix_now() + 40);
    assert!(hub.sessions.is_empty());
    assert_eq!(hub.stats.snapshot().local_sessions, 0);
    Ok(())
}
