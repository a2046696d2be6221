//! Integration tests for the skiff chat engine
//!
//! These exercise the engine end to end: session registry over a real file
//! store, turn delivery over a loopback WebSocket backend, fallback delivery
//! over a loopback HTTP responder, and rehydration across process restarts
//! (simulated by building a fresh registry over the same store).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use skiff_core::config::ServerConfig;
use skiff_core::{
    BackendClient, ChannelManager, ChannelStatus, FileStore, MessageDispatcher, MemoryStore,
    Role, SessionRegistry, TurnOptions, TURN_FAILED_TEXT,
};
use tempfile::TempDir;

fn dispatcher_for(base: &str, timeout_secs: u64) -> MessageDispatcher {
    let config = ServerConfig {
        http_base: base.to_string(),
        ws_base: None,
        timeout_secs,
    };
    MessageDispatcher::new(BackendClient::new(&config).unwrap())
}

/// Loopback chat WebSocket endpoint: thinking status, then an echo reply,
/// for every client frame on every accepted connection.
async fn spawn_ws_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        WsMessage::Text(text) => {
                            let value: serde_json::Value =
                                serde_json::from_str(text.as_str()).unwrap();
                            let user_text = value["message"].as_str().unwrap().to_string();
                            let _ = ws
                                .send(WsMessage::Text(
                                    r#"{"type":"status","content":"thinking"}"#.into(),
                                ))
                                .await;
                            let reply = serde_json::json!({
                                "type": "message",
                                "content": format!("re: {}", user_text),
                                "sources": [],
                            });
                            let _ = ws.send(WsMessage::Text(reply.to_string().into())).await;
                        }
                        WsMessage::Close(_) => break,
                        _ => {}
                    }
                }
            });
        }
    });

    addr
}

/// Loopback HTTP responder for POST /chat/message: counts requests and
/// answers every one with a fixed reply body.
async fn spawn_http_backend(reply_text: &'static str) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_srv = hits.clone();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            let hits = hits_srv.clone();
            tokio::spawn(async move {
                // Read headers, then the content-length body.
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                let header_end = loop {
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };

                let headers = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
                let content_length: usize = headers
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);

                while buf.len() < header_end + content_length {
                    let n = match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => n,
                    };
                    buf.extend_from_slice(&chunk[..n]);
                }

                hits.fetch_add(1, Ordering::SeqCst);

                let body = serde_json::json!({
                    "message": reply_text,
                    "sources": [],
                    "session_id": null,
                })
                .to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    (addr, hits)
}

/// Loopback WebSocket endpoint that acknowledges one turn with a thinking
/// status and then drops the connection without replying.
async fn spawn_flaky_ws_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(WsMessage::Text(_))) = ws.next().await {
            let _ = ws
                .send(WsMessage::Text(
                    r#"{"type":"status","content":"thinking"}"#.into(),
                ))
                .await;
        }
        // Connection dropped here, reply never sent.
    });

    addr
}

/// Loopback responder that answers every request with 404.
async fn spawn_not_found_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => break,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let body = r#"{"detail":"Session not found"}"#;
                let response = format!(
                    "HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    addr
}

fn client_for(addr: std::net::SocketAddr) -> BackendClient {
    BackendClient::new(&ServerConfig {
        http_base: format!("http://{}", addr),
        ws_base: None,
        timeout_secs: 5,
    })
    .unwrap()
}

// ============================================
// End-to-end turn
// ============================================

#[tokio::test]
async fn test_scenario_create_send_reconcile() {
    let store = Arc::new(MemoryStore::new());
    let mut registry = SessionRegistry::new(store);
    registry.hydrate().await;

    let s1 = registry.create_session().unwrap();
    let dispatcher = dispatcher_for("http://127.0.0.1:1/api", 2);

    dispatcher
        .begin_turn(&mut registry, "Hi", Some(&s1))
        .unwrap();
    {
        let session = registry.session(&s1).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[0].content, "Hi");
    }
    let created = registry.session(&s1).unwrap().created_at;
    assert!(registry.session(&s1).unwrap().updated_at >= created);

    // Simulated fallback reply
    dispatcher.complete_turn(&mut registry, &s1, "Hello", vec![]);
    let session = registry.session(&s1).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].content, "Hello");
    assert!(!registry.state().is_loading);
}

// ============================================
// Turn ordering
// ============================================

#[tokio::test]
async fn test_realtime_turns_interleave_in_submission_order() {
    let addr = spawn_ws_backend().await;
    let store = Arc::new(MemoryStore::new());
    let mut registry = SessionRegistry::new(store);
    registry.hydrate().await;
    let session_id = registry.create_session().unwrap();

    let dispatcher = dispatcher_for("http://127.0.0.1:1/api", 2);
    let mut channel = ChannelManager::connect(format!("ws://{}", addr));
    assert_eq!(channel.wait_ready().await, ChannelStatus::Connected);

    for turn in ["one", "two", "three"] {
        dispatcher
            .send_turn(&mut registry, Some(&channel), turn, &TurnOptions::default())
            .await
            .unwrap();

        // Pump the channel until the reply lands.
        while registry.state().is_loading {
            let frame = channel.recv().await.expect("channel closed early");
            dispatcher.handle_frame(&mut registry, &session_id, frame);
        }
    }

    let session = registry.session(&session_id).unwrap();
    let transcript: Vec<(Role, &str)> = session
        .messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        transcript,
        vec![
            (Role::User, "one"),
            (Role::Assistant, "re: one"),
            (Role::User, "two"),
            (Role::Assistant, "re: two"),
            (Role::User, "three"),
            (Role::Assistant, "re: three"),
        ]
    );

    channel.close();
}

#[tokio::test]
async fn test_fallback_turns_interleave_in_submission_order() {
    let (addr, _hits) = spawn_http_backend("noted").await;
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    registry.hydrate().await;
    let session_id = registry.create_session().unwrap();

    let dispatcher = dispatcher_for(&format!("http://{}", addr), 5);

    for turn in ["a", "b"] {
        dispatcher
            .send_turn(&mut registry, None, turn, &TurnOptions::default())
            .await
            .unwrap();
    }

    let session = registry.session(&session_id).unwrap();
    let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    assert_eq!(session.messages[0].content, "a");
    assert_eq!(session.messages[1].content, "noted");
}

#[tokio::test]
async fn test_channel_loss_mid_turn_is_failed_and_unblocks_later_turns() {
    let addr = spawn_flaky_ws_backend().await;
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    registry.hydrate().await;
    let session_id = registry.create_session().unwrap();

    let dispatcher = dispatcher_for("http://127.0.0.1:1/api", 2);
    let mut channel = ChannelManager::connect(format!("ws://{}", addr));
    assert_eq!(channel.wait_ready().await, ChannelStatus::Connected);

    dispatcher
        .send_turn(&mut registry, Some(&channel), "Hi", &TurnOptions::default())
        .await
        .unwrap();

    // Drain what arrives; recv() returning None means the channel is gone.
    while let Some(frame) = channel.recv().await {
        dispatcher.handle_frame(&mut registry, &session_id, frame);
    }
    assert_eq!(channel.status(), ChannelStatus::Disconnected);
    assert!(registry.state().is_loading);

    dispatcher.handle_channel_loss(&mut registry, &session_id);

    // The turn resolved to one appended error reply and the engine accepts
    // the next submission.
    let session = registry.session(&session_id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].content, "Hi");
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert_eq!(session.messages[1].content, TURN_FAILED_TEXT);
    assert!(!registry.state().is_loading);

    dispatcher
        .begin_turn(&mut registry, "still there?", None)
        .unwrap();
}

// ============================================
// Fallback correctness
// ============================================

#[tokio::test]
async fn test_each_fallback_turn_hits_endpoint_exactly_once() {
    let (addr, hits) = spawn_http_backend("ok").await;
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    registry.hydrate().await;
    let session_id = registry.create_session().unwrap();

    let dispatcher = dispatcher_for(&format!("http://{}", addr), 5);

    for i in 0..3 {
        dispatcher
            .send_turn(&mut registry, None, &format!("turn {}", i), &TurnOptions::default())
            .await
            .unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // One user message and exactly one assistant message per turn
    assert_eq!(registry.session(&session_id).unwrap().messages.len(), 6);
}

#[tokio::test]
async fn test_fallback_failure_still_appends_exactly_one_reply() {
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    registry.hydrate().await;
    let session_id = registry.create_session().unwrap();

    // Nothing listens here.
    let dispatcher = dispatcher_for("http://127.0.0.1:1/api", 2);
    dispatcher
        .send_turn(&mut registry, None, "anyone there?", &TurnOptions::default())
        .await
        .unwrap();

    let session = registry.session(&session_id).unwrap();
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[1].content, TURN_FAILED_TEXT);
    assert_eq!(registry.state().error.as_deref(), Some(TURN_FAILED_TEXT));
}

// ============================================
// Remote session endpoints
// ============================================

#[tokio::test]
async fn test_history_of_unknown_session_is_none() {
    let addr = spawn_not_found_backend().await;
    let client = client_for(addr);

    let history = client.history("ghost").await.unwrap();
    assert!(history.is_none());
}

#[tokio::test]
async fn test_remote_delete_of_unknown_session_is_false() {
    let addr = spawn_not_found_backend().await;
    let client = client_for(addr);

    assert!(!client.delete_session("ghost").await.unwrap());
}

// ============================================
// Hydration and persistence
// ============================================

#[tokio::test]
async fn test_no_mutation_observable_before_hydration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    // Seed a persisted record with one session.
    {
        let mut registry = SessionRegistry::new(Arc::new(FileStore::new(&path)));
        registry.hydrate().await;
        let id = registry.create_session().unwrap();
        registry
            .add_message(skiff_core::Message::user("kept"), Some(&id))
            .unwrap();
    }

    // A fresh registry refuses mutations while pending, and the attempted
    // writes leave no trace after hydration.
    let mut registry = SessionRegistry::new(Arc::new(FileStore::new(&path)));
    assert!(registry.create_session().is_err());
    registry.switch_session("anything");
    registry.delete_session("anything");

    registry.hydrate().await;
    assert_eq!(registry.state().sessions.len(), 1);
    let current = registry.current_session().unwrap();
    assert_eq!(current.messages.len(), 1);
    assert_eq!(current.messages[0].content, "kept");
}

#[tokio::test]
async fn test_rehydration_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    {
        let mut registry = SessionRegistry::new(Arc::new(FileStore::new(&path)));
        registry.hydrate().await;
        let id = registry.create_session().unwrap();
        registry
            .add_message(skiff_core::Message::user("Hi"), Some(&id))
            .unwrap();
        registry
            .add_message(skiff_core::Message::assistant("Hello", None), Some(&id))
            .unwrap();
    }

    let mut first = SessionRegistry::new(Arc::new(FileStore::new(&path)));
    first.hydrate().await;
    let mut second = SessionRegistry::new(Arc::new(FileStore::new(&path)));
    second.hydrate().await;

    assert_eq!(first.state().sessions.len(), second.state().sessions.len());
    assert_eq!(
        first.state().current_session_id,
        second.state().current_session_id
    );
    let id = first.state().current_session_id.clone().unwrap();
    let a = &first.session(&id).unwrap().messages;
    let b = &second.session(&id).unwrap().messages;
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.content, y.content);
    }
}

#[tokio::test]
async fn test_deleting_current_session_never_dangles_across_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let mut registry = SessionRegistry::new(Arc::new(FileStore::new(&path)));
    registry.hydrate().await;
    let first = registry.create_session().unwrap();
    let second = registry.create_session().unwrap();
    registry.delete_session(&second);
    assert_eq!(registry.current_session_id(), Some(first.as_str()));

    // The repointed state is what a restart sees.
    let mut restarted = SessionRegistry::new(Arc::new(FileStore::new(&path)));
    restarted.hydrate().await;
    assert_eq!(restarted.current_session_id(), Some(first.as_str()));
    assert!(restarted.state().sessions.contains_key(&first));
}
