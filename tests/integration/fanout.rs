//! End-to-end fan-out over real loopback sockets.

use skyhub_core::wire::RELAY_MAGIC;

use crate::*;

/// Two clients in radar range see each other's reports, stamped with
/// the client magic.
#[tokio::test]
async fn nearby_clients_hear_each_other() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let alpha = Client::new().await?;
    let bravo = Client::new().await?;

    let pkt_a = position_packet("ALPHA", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC);
    alpha.send(hub_addr, &pkt_a).await?;
    assert!(wait_for(|| hub.sessions.find_by_name("ALPHA").is_some()).await);

    let pkt_b = position_packet("BRAVO", "c182", pos_near_eddf(10.0), 0, MSG_MAGIC);
    bravo.send(hub_addr, &pkt_b).await?;

    // BRAVO's report reaches ALPHA
    let received = alpha.recv_timeout(2000).await.expect("no packet forwarded");
    let header = decode_header(&received);
    assert_eq!(header.magic, MSG_MAGIC);
    assert_eq!(header.callsign, "BRAVO");
    assert_eq!(received.len(), pkt_b.len());

    // and ALPHA's next report reaches BRAVO
    alpha.send(hub_addr, &pkt_a).await?;
    let received = bravo.recv_timeout(2000).await.expect("no packet forwarded");
    assert_eq!(decode_header(&received).callsign, "ALPHA");
    Ok(())
}

/// Clients far outside each other's radar range stay isolated.
#[tokio::test]
async fn distant_clients_are_isolated() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let alpha = Client::new().await?;
    let bravo = Client::new().await?;

    alpha
        .send(
            hub_addr,
            &position_packet("ALPHA", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(wait_for(|| hub.sessions.find_by_name("ALPHA").is_some()).await);

    // 500 NM away, both on the 100 NM fallback range
    bravo
        .send(
            hub_addr,
            &position_packet("BRAVO", "c182", pos_near_eddf(500.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(wait_for(|| hub.sessions.find_by_name("BRAVO").is_some()).await);

    assert!(alpha.recv_timeout(300).await.is_none());
    assert!(bravo.recv_timeout(300).await.is_none());
    Ok(())
}

/// A ping comes straight back as a pong without opening a session.
#[tokio::test]
async fn ping_pong_round_trip() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let client = Client::new().await?;

    client.send(hub_addr, &ping_packet("PINGER")).await?;
    let reply = client.recv_timeout(2000).await.expect("no pong");
    let header = decode_header(&reply);
    assert_eq!(header.id(), MsgId::Pong);
    assert_eq!(header.callsign, "PINGER");
    assert!(hub.sessions.is_empty());
    Ok(())
}

/// A crossfeed sink receives a copy of every relayed packet, stamped
/// with the relay magic.
#[tokio::test]
async fn crossfeed_receives_relay_stamped_copies() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let feed = Client::new().await?;
    hub.add_crossfeed(
        "test feed",
        skyhub_core::addr::NetAddress::from(feed.addr),
        unix_now(),
    );

    let client = Client::new().await?;
    let pkt = position_packet("D-ABCD", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC);
    client.send(hub_addr, &pkt).await?;

    let copy = feed.recv_timeout(2000).await.expect("no crossfeed copy");
    assert_eq!(decode_header(&copy).magic, RELAY_MAGIC);
    assert_eq!(decode_header(&copy).callsign, "D-ABCD");
    assert_eq!(copy.len(), pkt.len());
    assert_eq!(hub.stats.snapshot().crossfeed_sent, 1);
    Ok(())
}

/// An observer callsign receives traffic but its own reports are not
/// forwarded to other clients.
#[tokio::test]
async fn observers_are_invisible() -> Result<()> {
    let (hub, hub_addr) = spawn_hub(HubParams::default()).await?;
    let pilot = Client::new().await?;
    let observer = Client::new().await?;

    pilot
        .send(
            hub_addr,
            &position_packet("ALPHA", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(wait_for(|| hub.sessions.find_by_name("ALPHA").is_some()).await);

    observer
        .send(
            hub_addr,
            &position_packet("obsEDDF", "ufo", pos_near_eddf(1.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(wait_for(|| hub.sessions.find_by_name("obsEDDF").is_some()).await);
    assert!(pilot.recv_timeout(300).await.is_none());

    // the pilot's next report still reaches the observer
    pilot
        .send(
            hub_addr,
            &position_packet("ALPHA", "c172p", pos_near_eddf(0.0), 0, MSG_MAGIC),
        )
        .await?;
    assert!(observer.recv_timeout(2000).await.is_some());
    Ok(())
}
