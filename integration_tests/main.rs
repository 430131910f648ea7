mod common;

use relaylink::message::{read_message, write_message};
use relaylink::{Message, Status};

use common::{connect, ephemeral_port, loopback_config, recv_timeout, settle, start_server};

#[tokio::test]
async fn plain_tcp_echo() {
    let (server, addr, mut events) = start_server(loopback_config(ephemeral_port())).await;

    let mut client = connect(addr).await;
    let connected_id = recv_timeout(&mut events.connected)
        .await
        .expect("ClientConnected did not fire");

    write_message(&mut client, &Message::normal(vec![0x01, 0x02, 0x03]))
        .await
        .unwrap();

    let (id, payload) = recv_timeout(&mut events.messages)
        .await
        .expect("MessageReceived did not fire");
    assert_eq!(id, connected_id);
    assert_eq!(payload, vec![0x01, 0x02, 0x03]);

    drop(client);
    let disconnected_id = recv_timeout(&mut events.disconnected)
        .await
        .expect("ClientDisconnected did not fire");
    assert_eq!(disconnected_id, connected_id);

    server.shutdown().await;
}

#[tokio::test]
async fn ip_rejection() {
    let mut config = loopback_config(ephemeral_port());
    config.allow_list = vec!["10.0.0.1".parse().unwrap()];
    let (server, addr, mut events) = start_server(config).await;

    let client = connect(addr).await;
    settle().await;

    assert!(recv_timeout(&mut events.connected).await.is_none());
    assert!(server.list_clients().is_empty());

    drop(client);
    server.shutdown().await;
}

#[tokio::test]
async fn shared_secret_happy_path() {
    let mut config = loopback_config(ephemeral_port());
    config.shared_secret = Some("s3cr3t".to_string());
    let (server, addr, mut events) = start_server(config).await;

    let mut client = connect(addr).await;
    let prompt = read_message(&mut client).await.unwrap();
    assert_eq!(prompt.status, Status::AuthRequired);
    assert_eq!(prompt.payload, b"Authentication required");

    write_message(
        &mut client,
        &Message::auth_request(b"s3cr3t".to_vec()),
    )
    .await
    .unwrap();

    let reply = read_message(&mut client).await.unwrap();
    assert_eq!(reply.status, Status::AuthSuccess);
    assert_eq!(reply.payload, b"Authentication successful");

    write_message(&mut client, &Message::normal(vec![0xAA]))
        .await
        .unwrap();
    let (_, payload) = recv_timeout(&mut events.messages)
        .await
        .expect("MessageReceived did not fire after authentication");
    assert_eq!(payload, vec![0xAA]);

    server.shutdown().await;
}

#[tokio::test]
async fn shared_secret_mismatch() {
    let mut config = loopback_config(ephemeral_port());
    config.shared_secret = Some("s3cr3t".to_string());
    let (server, addr, mut events) = start_server(config).await;

    let mut client = connect(addr).await;
    let _prompt = read_message(&mut client).await.unwrap();

    write_message(&mut client, &Message::auth_request(b"wrong".to_vec()))
        .await
        .unwrap();
    let reply = read_message(&mut client).await.unwrap();
    assert_eq!(reply.status, Status::AuthFailure);
    assert_eq!(reply.payload, b"Authentication declined");

    write_message(&mut client, &Message::normal(vec![0x01]))
        .await
        .unwrap();
    let reprompt = read_message(&mut client).await.unwrap();
    assert_eq!(reprompt.status, Status::AuthRequired);
    assert_eq!(reprompt.payload, b"Authentication required");

    assert!(recv_timeout(&mut events.messages).await.is_none());

    server.shutdown().await;
}

#[tokio::test]
async fn administrative_disconnect() {
    let (server, addr, mut events) = start_server(loopback_config(ephemeral_port())).await;

    let client_a = connect(addr).await;
    let id_a = recv_timeout(&mut events.connected).await.unwrap();
    let _client_b = connect(addr).await;
    let id_b = recv_timeout(&mut events.connected).await.unwrap();

    server.disconnect_client(id_a.as_str()).await;

    let disconnected = recv_timeout(&mut events.disconnected)
        .await
        .expect("ClientDisconnected did not fire for the disconnected client");
    assert_eq!(disconnected, id_a);
    assert!(!server.is_client_connected(id_a.as_str()));
    assert!(server.is_client_connected(id_b.as_str()));

    drop(client_a);
    server.shutdown().await;
}

#[tokio::test]
async fn graceful_shutdown_under_load() {
    let (server, addr, mut events) = start_server(loopback_config(ephemeral_port())).await;

    const CLIENTS: usize = 20;
    let mut clients = Vec::with_capacity(CLIENTS);
    for _ in 0..CLIENTS {
        clients.push(connect(addr).await);
        recv_timeout(&mut events.connected)
            .await
            .expect("ClientConnected did not fire for one of the load clients");
    }

    server.shutdown().await;

    for _ in 0..CLIENTS {
        recv_timeout(&mut events.disconnected)
            .await
            .expect("ClientDisconnected did not fire for one of the load clients");
    }
    assert!(server.list_clients().is_empty());
}
