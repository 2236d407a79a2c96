//! Session tickets over a connection.

use std::sync::Arc;
use std::time::Duration;

use handshaker::{Config, Error, MemorySessionCache, NamedGroup, SessionCache, SessionKey};

use crate::common::*;

#[test]
fn tickets_reach_the_client_cache() {
    let _ = env_logger::try_init();

    let client_cache = Arc::new(MemorySessionCache::new(8, Duration::from_secs(3600)));
    let server_cache = Arc::new(MemorySessionCache::new(8, Duration::from_secs(3600)));
    let (mut client, mut server) = connect(
        config(
            Config::builder()
                .groups(&[NamedGroup::X25519])
                .server_name("example.org")
                .with_session_cache(client_cache.clone()),
        ),
        config(
            Config::builder()
                .groups(&[NamedGroup::X25519])
                .session_ticket_lifetime(Duration::from_secs(300))
                .with_session_cache(server_cache.clone()),
        ),
    );

    server.send_new_session_ticket().unwrap();
    server.send_new_session_ticket().unwrap();
    client.process().unwrap();

    let session = client_cache
        .get(&SessionKey::HostPort("example.org".into(), 443))
        .expect("ticket stored");
    assert_eq!(session.lifetime, Some(Duration::from_secs(300)));
    let ticket = session.ticket.clone().expect("ticket bytes");

    // The server keeps the same PSK under the ticket.
    let stored = server_cache
        .get(&SessionKey::Id(ticket))
        .expect("server side ticket");
    assert_eq!(stored.secret, session.secret);
}

#[test]
fn clients_do_not_issue_tickets() {
    let (mut client, _) = connect(config(Config::builder()), config(Config::builder()));
    assert!(matches!(
        client.send_new_session_ticket(),
        Err(Error::UnsupportedOperation(_))
    ));
}
