//! End-to-end coverage of the WebSocket session hub: a real server bound
//! to a loopback port, driven over real `tokio-tungstenite` connections
//! exchanging the actual JSON wire protocol.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    connect_ws, test_server, test_server_with_outbound_limits, test_server_with_tts, FailingTtsService, ADMIN_A,
    ADMIN_B,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use services::tts::MockTtsService;
use tokio_tungstenite::tungstenite::Message as WsMessage;

type Socket = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn send(socket: &mut Socket, value: Value) {
    socket.send(WsMessage::Text(value.to_string().into())).await.expect("send failed");
}

async fn recv(socket: &mut Socket) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .expect("socket error");
    match message {
        WsMessage::Text(text) => serde_json::from_str(text.as_ref()).expect("response was not valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn authenticate(socket: &mut Socket, username: &str, password: &str) -> Value {
    send(
        socket,
        json!({ "type": "admin-auth", "method": "credentials", "username": username, "password": password }),
    )
    .await;
    recv(socket).await
}

fn session_config(tts_mode: &str) -> Value {
    json!({
        "sourceLanguage": "en",
        "targetLanguages": ["es", "fr"],
        "enabledLanguages": ["es", "fr"],
        "ttsMode": tts_mode,
        "audioQuality": "high",
        "audioConfig": { "sampleRate": 48000, "encoding": "opus", "channels": 1 },
    })
}

/// S1: an admin creates a session, a client joins and subscribes to a
/// language, and a broadcast translation reaches the client.
#[tokio::test]
async fn s1_create_join_and_broadcast_reaches_subscribed_client() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    let auth = authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    assert_eq!(auth["type"], "admin-auth-response");
    assert!(auth["accessToken"].as_str().is_some_and(|s| !s.is_empty()));

    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s1",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    let created = recv(&mut admin).await;
    assert_eq!(created["type"], "start-session-response");
    assert_eq!(created["session"]["sessionId"], "s1");

    let mut client = connect_ws(addr).await;
    send(&mut client, json!({ "type": "join-session", "sessionId": "s1", "preferredLanguage": "es" })).await;
    let joined = recv(&mut client).await;
    assert_eq!(joined["type"], "session-joined");
    assert_eq!(joined["preferredLanguage"], "es");

    send(
        &mut admin,
        json!({
            "type": "broadcast-translation",
            "sessionId": "s1",
            "original": "hello",
            "translations": { "es": "hola" },
            "generateTTS": false,
        }),
    )
    .await;

    let translation = recv(&mut client).await;
    assert_eq!(translation["type"], "translation");
    assert_eq!(translation["language"], "es");
    assert_eq!(translation["text"], "hola");
    assert!(translation.get("timestamp").is_some());
    assert!(translation.get("audioUrl").is_none());
}

/// S2: two broadcasts of identical text/language/voice content share one
/// synthesized audio fingerprint instead of paying for TTS twice.
#[tokio::test]
async fn s2_duplicate_broadcasts_share_one_audio_fingerprint() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s2",
            "displayName": "Keynote",
            "config": session_config("neural"),
        }),
    )
    .await;
    recv(&mut admin).await;

    let mut client = connect_ws(addr).await;
    send(&mut client, json!({ "type": "join-session", "sessionId": "s2", "preferredLanguage": "es" })).await;
    recv(&mut client).await;

    for _ in 0..2 {
        send(
            &mut admin,
            json!({
                "type": "broadcast-translation",
                "sessionId": "s2",
                "original": "good morning",
                "translations": { "es": "buenos dias" },
                "generateTTS": true,
                "voiceType": "neural",
            }),
        )
        .await;
    }

    let first = recv(&mut client).await;
    let second = recv(&mut client).await;
    let first_url = first["audioUrl"].as_str().expect("first broadcast should carry audio");
    let second_url = second["audioUrl"].as_str().expect("second broadcast should carry audio");
    assert_eq!(first_url, second_url, "identical text/language/voice should fingerprint to the same audio URL");
}

/// S3: an admin who doesn't own a session is rejected when trying to
/// end it, with the exact authorization error code.
#[tokio::test]
async fn s3_non_owner_cannot_end_session() {
    let (addr, _dir) = test_server().await;

    let mut owner = connect_ws(addr).await;
    authenticate(&mut owner, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut owner,
        json!({
            "type": "start-session",
            "sessionId": "s3",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut owner).await;

    let mut intruder = connect_ws(addr).await;
    authenticate(&mut intruder, ADMIN_B.username, ADMIN_B.password).await;
    send(&mut intruder, json!({ "type": "end-session", "sessionId": "s3" })).await;

    let rejection = recv(&mut intruder).await;
    assert_eq!(rejection["type"], "error");
    assert_eq!(rejection["errorCode"], "AUTHZ_SESSION_NOT_OWNED");
}

/// S4: an admin who closes their socket and reconnects with the same
/// credentials is told about the sessions they still own.
#[tokio::test]
async fn s4_reconnect_reports_owned_sessions() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s4",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut admin).await;

    admin.close(None).await.expect("failed to close admin socket");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut admin = connect_ws(addr).await;
    let auth = authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    assert_eq!(auth["type"], "admin-auth-response");

    let reconnection = recv(&mut admin).await;
    assert_eq!(reconnection["type"], "admin-reconnection");
    let owned = reconnection["ownedSessions"].as_array().expect("ownedSessions should be an array");
    assert!(owned.iter().any(|s| s["sessionId"] == "s4"));
}

/// S4 (token path): a client holding a still-valid access token from a
/// prior `admin-auth` can reattach via `method: "token"` instead of
/// resending credentials.
#[tokio::test]
async fn s4_token_reconnect_reattaches_without_credentials() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    let auth = authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    let access_token = auth["accessToken"].as_str().expect("admin-auth-response must carry accessToken").to_string();

    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s4-token",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut admin).await;

    admin.close(None).await.expect("failed to close admin socket");
    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut admin = connect_ws(addr).await;
    send(&mut admin, json!({ "type": "admin-auth", "method": "token", "accessToken": access_token })).await;
    let reauth = recv(&mut admin).await;
    assert_eq!(reauth["type"], "admin-auth-response");

    let reconnection = recv(&mut admin).await;
    assert_eq!(reconnection["type"], "admin-reconnection");
}

/// `list-sessions` reports only the requester's own sessions by default,
/// and every session (annotated with `isOwner`) when `filter: "all"`.
#[tokio::test]
async fn list_sessions_defaults_to_owned_and_all_annotates_is_owner() {
    let (addr, _dir) = test_server().await;

    let mut owner = connect_ws(addr).await;
    authenticate(&mut owner, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut owner,
        json!({
            "type": "start-session",
            "sessionId": "list-s1",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut owner).await;

    let mut other = connect_ws(addr).await;
    authenticate(&mut other, ADMIN_B.username, ADMIN_B.password).await;
    send(
        &mut other,
        json!({
            "type": "start-session",
            "sessionId": "list-s2",
            "displayName": "Town Hall",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut other).await;

    send(&mut owner, json!({ "type": "list-sessions" })).await;
    let owned_only = recv(&mut owner).await;
    assert_eq!(owned_only["type"], "list-sessions-response");
    let sessions = owned_only["sessions"].as_array().unwrap();
    assert!(sessions.iter().all(|s| s["sessionId"] == "list-s1"));

    send(&mut owner, json!({ "type": "list-sessions", "filter": "all" })).await;
    let all = recv(&mut owner).await;
    let sessions = all["sessions"].as_array().unwrap();
    let mine = sessions.iter().find(|s| s["sessionId"] == "list-s1").expect("owned session missing");
    let theirs = sessions.iter().find(|s| s["sessionId"] == "list-s2").expect("other admin's session missing");
    assert_eq!(mine["isOwner"], true);
    assert_eq!(theirs["isOwner"], false);
}

/// S6: when the TTS provider fails, the broadcast still reaches
/// subscribers, just without an audio URL attached.
#[tokio::test]
async fn s6_tts_failure_degrades_to_text_only_broadcast() {
    let (addr, _dir) = test_server_with_tts(Arc::new(FailingTtsService)).await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s6",
            "displayName": "Keynote",
            "config": session_config("neural"),
        }),
    )
    .await;
    recv(&mut admin).await;

    let mut client = connect_ws(addr).await;
    send(&mut client, json!({ "type": "join-session", "sessionId": "s6", "preferredLanguage": "es" })).await;
    recv(&mut client).await;

    send(
        &mut admin,
        json!({
            "type": "broadcast-translation",
            "sessionId": "s6",
            "original": "hello",
            "translations": { "es": "hola" },
            "generateTTS": true,
        }),
    )
    .await;

    let translation = recv(&mut client).await;
    assert_eq!(translation["type"], "translation");
    assert_eq!(translation["text"], "hola");
    assert!(translation.get("audioUrl").is_none(), "failed synthesis must not block the broadcast");
}

/// A session configured for on-device synthesis never calls the TTS
/// Service and tells clients to synthesize for themselves.
#[tokio::test]
async fn local_tts_mode_sets_use_local_tts_instead_of_calling_tts_service() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s-local-tts",
            "displayName": "Keynote",
            "config": session_config("local"),
        }),
    )
    .await;
    recv(&mut admin).await;

    let mut client = connect_ws(addr).await;
    send(&mut client, json!({ "type": "join-session", "sessionId": "s-local-tts", "preferredLanguage": "es" })).await;
    recv(&mut client).await;

    send(
        &mut admin,
        json!({
            "type": "broadcast-translation",
            "sessionId": "s-local-tts",
            "original": "hello",
            "translations": { "es": "hola" },
            "generateTTS": true,
        }),
    )
    .await;

    let translation = recv(&mut client).await;
    assert_eq!(translation["useLocalTTS"], true);
    assert!(translation.get("audioUrl").is_none(), "local tts mode must never call the TTS Service");
}

/// A single `broadcast-translation` fans out to every language in
/// `translations` independently.
#[tokio::test]
async fn broadcast_fans_out_to_every_language_in_the_map() {
    let (addr, _dir) = test_server().await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "multi-lang",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut admin).await;

    let mut es_client = connect_ws(addr).await;
    send(&mut es_client, json!({ "type": "join-session", "sessionId": "multi-lang", "preferredLanguage": "es" })).await;
    recv(&mut es_client).await;

    let mut fr_client = connect_ws(addr).await;
    send(&mut fr_client, json!({ "type": "join-session", "sessionId": "multi-lang", "preferredLanguage": "fr" })).await;
    recv(&mut fr_client).await;

    send(
        &mut admin,
        json!({
            "type": "broadcast-translation",
            "sessionId": "multi-lang",
            "original": "hello",
            "translations": { "es": "hola", "fr": "bonjour" },
            "generateTTS": false,
        }),
    )
    .await;

    let es_translation = recv(&mut es_client).await;
    assert_eq!(es_translation["language"], "es");
    assert_eq!(es_translation["text"], "hola");

    let fr_translation = recv(&mut fr_client).await;
    assert_eq!(fr_translation["language"], "fr");
    assert_eq!(fr_translation["text"], "bonjour");
}

/// S5: a slow client's outbound queue saturates while a burst of
/// translations is broadcast. The slow client misses messages past the
/// soft limit but its socket stays open; a fast client that drains its
/// queue receives every message; the drop count shows up in `/metrics`.
#[tokio::test]
async fn s5_backpressure_drops_the_slow_client_without_disconnecting_it() {
    const SOFT_LIMIT: usize = 3;
    const HARD_LIMIT: usize = 15;
    const BROADCASTS: usize = 20;

    let (addr, _dir) = test_server_with_outbound_limits(Arc::new(MockTtsService), SOFT_LIMIT, HARD_LIMIT).await;

    let mut admin = connect_ws(addr).await;
    authenticate(&mut admin, ADMIN_A.username, ADMIN_A.password).await;
    send(
        &mut admin,
        json!({
            "type": "start-session",
            "sessionId": "s5",
            "displayName": "Keynote",
            "config": session_config("disabled"),
        }),
    )
    .await;
    recv(&mut admin).await;

    let mut slow = connect_ws(addr).await;
    send(&mut slow, json!({ "type": "join-session", "sessionId": "s5", "preferredLanguage": "es" })).await;
    recv(&mut slow).await;

    let mut fast = connect_ws(addr).await;
    send(&mut fast, json!({ "type": "join-session", "sessionId": "s5", "preferredLanguage": "es" })).await;
    recv(&mut fast).await;

    // Never drain `slow` during the burst; drain `fast` after every single
    // broadcast so its queue never builds up.
    for i in 0..BROADCASTS {
        send(
            &mut admin,
            json!({
                "type": "broadcast-translation",
                "sessionId": "s5",
                "original": format!("msg{i}"),
                "translations": { "es": format!("msg{i}") },
                "generateTTS": false,
            }),
        )
        .await;
        let translation = recv(&mut fast).await;
        assert_eq!(translation["text"], format!("msg{i}"));
    }

    // Only the first SOFT_LIMIT broadcasts ever made it into the slow
    // client's queue; the rest were silently skipped for it.
    for i in 0..SOFT_LIMIT {
        let translation = recv(&mut slow).await;
        assert_eq!(translation["text"], format!("msg{i}"));
    }

    // The socket was never force-closed: it still works for later traffic.
    send(
        &mut admin,
        json!({
            "type": "broadcast-translation",
            "sessionId": "s5",
            "original": "after the burst",
            "translations": { "es": "after the burst" },
            "generateTTS": false,
        }),
    )
    .await;
    let recovered = recv(&mut slow).await;
    assert_eq!(recovered["text"], "after the burst");

    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    let body = response.text().await.unwrap();
    assert!(body.contains("hub_broadcast_drops_total"));
    assert!(
        !body.contains("hub_broadcast_drops_total 0"),
        "expected a nonzero drop count, got:\n{body}"
    );
}
