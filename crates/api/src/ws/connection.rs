//! Per-connection state machine: reads `ClientMessage` frames off the
//! socket, dispatches them against the services layer, and writes
//! `ServerMessage` replies plus any broadcast traffic the socket has
//! subscribed to back out. Mirrors the split-socket/event-loop shape used
//! for bidirectional streaming elsewhere in this codebase, generalized from
//! a single realtime session to many named sessions per process.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use domain::{AuthSession, ClientMembership, ErrorCode, ErrorDetails, ErrorEnvelope, TokenBundle, VoiceType};
use futures::{SinkExt, StreamExt};
use services::broadcaster::OutboundMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{AuthMethod, ClientMessage, ServerMessage};
use crate::state::AppState;

const MAX_WEBSOCKET_MESSAGE_BYTES: usize = 256 * 1024;

/// Assumed lifetime of an access token presented via `method: "token"`
/// reconnection. There is no `refreshToken` to fall back on for this path
/// (the client only sends `accessToken`), so the token store will force a
/// fresh `admin-auth` once this elapses rather than attempt a refresh.
const TOKEN_RECONNECT_ASSUMED_TTL_SECS: i64 = 300;

struct ConnectionContext {
    socket_id: String,
    client_ip: String,
    state: AppState,
    tx: mpsc::Sender<OutboundMessage>,
    /// `Some` once an `authenticate` message has succeeded (admin sockets only).
    admin: Option<AuthSession>,
    /// Session this socket is currently subscribed to for broadcast traffic,
    /// if any (clients belong to at most one at a time).
    joined_session: Option<String>,
    /// Cloned into every broadcast-group registration this socket makes;
    /// firing it from any session's hard-limit overflow closes this socket.
    kill: mpsc::Sender<()>,
}

pub async fn handle_socket(socket: WebSocket, state: AppState, client_ip: String) {
    let socket_id = Uuid::new_v4().to_string();
    let hard_limit = state.broadcaster.hard_limit();
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(hard_limit.max(1));
    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);

    let (mut sender, mut receiver) = socket.split();

    let mut ctx = ConnectionContext {
        socket_id: socket_id.clone(),
        client_ip: client_ip.clone(),
        state: state.clone(),
        tx,
        admin: None,
        joined_session: None,
        kill: kill_tx,
    };

    tracing::info!(socket_id = %socket_id, client_ip = %client_ip, "websocket connected");

    let heartbeat_interval = Duration::from_secs(state.config.limits.heartbeat_interval_secs);
    let mut missed_pongs: u32 = 0;
    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.tick().await; // first tick fires immediately; discard it
    let mut shutdown = state.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(socket_id = %socket_id, "closing connection for process shutdown");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if sender.send(Message::Text(message.payload.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_WEBSOCKET_MESSAGE_BYTES {
                            send_error(&ctx, ErrorCode::ValidationInvalidInput, "message exceeds size limit").await;
                            continue;
                        }
                        handle_text_frame(&mut ctx, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(socket_id = %socket_id, error = %err, "websocket read error");
                        break;
                    }
                }
            }
            _ = kill_rx.recv() => {
                tracing::warn!(socket_id = %socket_id, "closing connection after outbound queue hit its hard limit");
                let _ = sender
                    .send(Message::Text(ServerMessage::Error(ErrorEnvelope::new(
                        "error",
                        ErrorCode::SystemConnectionLimitExceeded,
                        "outbound queue overflowed",
                    )).to_json().into()))
                    .await;
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            _ = ticker.tick() => {
                missed_pongs += 1;
                if missed_pongs > state.config.limits.heartbeat_missed_pongs {
                    tracing::warn!(socket_id = %socket_id, "closing connection after missed heartbeats");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    cleanup(&ctx).await;
    tracing::info!(socket_id = %ctx.socket_id, client_ip = %ctx.client_ip, "websocket disconnected");
}

async fn handle_text_frame(ctx: &mut ConnectionContext, text: &str) {
    let message: Result<ClientMessage, _> = serde_json::from_str(text);
    match message {
        Ok(message) => {
            if let Err(err) = route(ctx, message).await {
                send_envelope(ctx, err).await;
            }
        }
        Err(err) => {
            tracing::debug!(socket_id = %ctx.socket_id, error = %err, "unparseable client message");
            send_error(ctx, ErrorCode::ValidationInvalidInput, "malformed message").await;
        }
    }
}

async fn route(ctx: &mut ConnectionContext, message: ClientMessage) -> Result<(), services::ServiceError> {
    use ClientMessage::*;
    match message {
        Authenticate { method, username, password, access_token } => {
            authenticate(ctx, method, username, password, access_token).await
        }
        TokenRefresh { refresh_token } => token_refresh(ctx, refresh_token).await,
        CreateSession { session_id, display_name, config } => {
            create_session(ctx, session_id, display_name, config).await
        }
        UpdateConfig { session_id, config } => update_config(ctx, session_id, config).await,
        PauseSession { session_id } => transition(ctx, session_id, domain::SessionStatus::Paused).await,
        ResumeSession { session_id } => transition(ctx, session_id, domain::SessionStatus::Active).await,
        EndSession { session_id } => end_session(ctx, session_id).await,
        ListSessions { filter } => list_sessions(ctx, filter).await,
        BroadcastTranslation { session_id, original, translations, generate_tts, voice_type } => {
            broadcast_translation(ctx, session_id, original, translations, generate_tts, voice_type).await
        }
        JoinSession { session_id, preferred_language } => join_session(ctx, session_id, preferred_language).await,
        SetLanguage { session_id, new_language } => set_language(ctx, session_id, new_language).await,
        LeaveSession { session_id } => leave_session(ctx, session_id).await,
        HeartbeatPong => Ok(()),
    }
}

/// Requires `ctx` to be authenticated, transparently refreshing the access
/// token via the Token Store if it has expired. If the refresh token is
/// itself no longer valid, the caller is forced back to unauthenticated,
/// told so with an `AUTH_TOKEN_EXPIRED` error for the message it just tried
/// to send, and then a `session-expired` message (invariant: a socket whose
/// token cannot be refreshed cannot invoke any further admin message).
async fn require_admin(ctx: &mut ConnectionContext) -> Result<Uuid, services::ServiceError> {
    if ctx.admin.is_none() {
        return Err(services::ServiceError::new(ErrorCode::AuthSessionNotFound, "authenticate first"));
    }

    match ctx.state.tokens.get_valid(&ctx.socket_id, &ctx.state.identity).await {
        Ok(refreshed) => {
            let admin_id = refreshed.admin_id;
            ctx.admin = Some(refreshed);
            Ok(admin_id)
        }
        Err(_) => {
            ctx.admin = None;
            reply(ctx, ServerMessage::SessionExpired).await;
            Err(services::ServiceError::new(ErrorCode::AuthTokenExpired, "access token could not be refreshed"))
        }
    }
}

async fn authenticate(
    ctx: &mut ConnectionContext,
    method: AuthMethod,
    username: Option<String>,
    password: Option<String>,
    access_token: Option<String>,
) -> Result<(), services::ServiceError> {
    let (bundle, user) = match method {
        AuthMethod::Credentials => {
            let username = username
                .ok_or_else(|| services::ServiceError::new(ErrorCode::ValidationMissingField, "username is required"))?;
            let password = password
                .ok_or_else(|| services::ServiceError::new(ErrorCode::ValidationMissingField, "password is required"))?;
            let bundle = ctx.state.identity.authenticate(&username, &password).await?;
            let user = ctx.state.identity.verify_access_token(&bundle.access_token).await?;
            (bundle, user)
        }
        AuthMethod::Token => {
            let access_token = access_token.ok_or_else(|| {
                services::ServiceError::new(ErrorCode::ValidationMissingField, "accessToken is required")
            })?;
            let user = ctx.state.identity.verify_access_token(&access_token).await?;
            // Reconnecting with a bare access token hands back no refresh
            // token of its own; the client is expected to have one stashed
            // from its original `admin-auth-response` and use `token-refresh`
            // once this assumed lifetime runs out.
            let bundle = TokenBundle {
                access_token,
                id_token: String::new(),
                refresh_token: String::new(),
                expires_in: TOKEN_RECONNECT_ASSUMED_TTL_SECS,
            };
            (bundle, user)
        }
    };

    let session = AuthSession {
        socket_id: ctx.socket_id.clone(),
        admin_id: user.sub,
        access_token: bundle.access_token.clone(),
        refresh_token: bundle.refresh_token.clone(),
        id_token: bundle.id_token.clone(),
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(bundle.expires_in),
    };

    let was_reconnect = !ctx.state.admins.has_active_socket(user.sub).await;
    ctx.state.tokens.insert(session.clone()).await;
    ctx.state.admins.attach_socket(user.sub, &ctx.socket_id).await;
    let identity = ctx.state.admins.get_or_create(user.sub, &user.display_name).await?;
    ctx.admin = Some(session);

    reply(
        ctx,
        ServerMessage::Authenticated {
            admin_id: identity.admin_id,
            display_name: identity.display_name,
            access_token: bundle.access_token,
            id_token: bundle.id_token,
            refresh_token: bundle.refresh_token,
            expires_in: bundle.expires_in,
        },
    )
    .await;

    if was_reconnect && !identity.owned_session_ids.is_empty() {
        handle_admin_reconnection(ctx, user.sub).await;
    }
    Ok(())
}

/// `token-refresh`: exchanges a refresh token for a new bundle without
/// requiring the socket to already be in `ctx.admin` (a socket may hold a
/// refresh token while its access token has already expired server-side).
async fn token_refresh(ctx: &mut ConnectionContext, refresh_token: String) -> Result<(), services::ServiceError> {
    let bundle = ctx.state.identity.refresh(&refresh_token).await?;
    let admin_id = ctx
        .state
        .identity
        .verify_access_token(&bundle.access_token)
        .await?
        .sub;

    let session = AuthSession {
        socket_id: ctx.socket_id.clone(),
        admin_id,
        access_token: bundle.access_token.clone(),
        refresh_token: bundle.refresh_token.clone(),
        id_token: bundle.id_token.clone(),
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(bundle.expires_in),
    };
    ctx.state.tokens.insert(session.clone()).await;
    ctx.admin = Some(session);

    reply(
        ctx,
        ServerMessage::TokenRefreshResponse {
            access_token: bundle.access_token,
            id_token: bundle.id_token,
            refresh_token: bundle.refresh_token,
            expires_in: bundle.expires_in,
        },
    )
    .await;
    Ok(())
}

/// Emitted when an admin reattaches a socket while still owning sessions and
/// no other socket of theirs was attached in the meantime: reports the
/// owned sessions and un-pauses any that had been paused for lack of an
/// attached admin socket.
async fn handle_admin_reconnection(ctx: &mut ConnectionContext, admin_id: Uuid) {
    let mut owned = ctx.state.sessions.list_owned_by(admin_id).await;
    for session in &mut owned {
        if session.status == domain::SessionStatus::Paused {
            if let Ok(resumed) = ctx
                .state
                .sessions
                .transition(&session.session_id, admin_id, domain::SessionStatus::Active)
                .await
            {
                *session = resumed;
            }
        }
        if let Err(err) = ctx
            .state
            .sessions
            .set_admin_socket(&session.session_id, admin_id, Some(ctx.socket_id.clone()))
            .await
        {
            tracing::warn!(session_id = %session.session_id, error = %err, "failed to reattach admin socket");
        }
    }
    reply(ctx, ServerMessage::AdminReconnection { owned_sessions: owned }).await;
}

async fn create_session(
    ctx: &mut ConnectionContext,
    session_id: String,
    display_name: String,
    config: domain::SessionConfig,
) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    ctx.state
        .create_session_limiter
        .check(&format!("{admin_id}:createSession"))
        .await
        .inspect_err(|_| ctx.state.metrics.rate_limit_rejections_total.inc())?;

    let session = ctx
        .state
        .sessions
        .create(session_id.clone(), admin_id, ctx.socket_id.clone(), display_name, config)
        .await?;
    ctx.state.admins.record_owned_session(admin_id, &session_id).await?;
    ctx.state
        .broadcaster
        .register(&session_id, &ctx.socket_id, "_admin", ctx.tx.clone(), ctx.kill.clone())
        .await;
    ctx.joined_session = Some(session_id);
    ctx.state.metrics.sessions_created_total.inc();

    reply(ctx, ServerMessage::SessionCreated { session }).await;
    Ok(())
}

async fn update_config(
    ctx: &mut ConnectionContext,
    session_id: String,
    config: domain::SessionConfig,
) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    let session = ctx.state.sessions.update_config(&session_id, admin_id, config).await?;
    reply(ctx, ServerMessage::SessionUpdated { session }).await;
    Ok(())
}

async fn transition(
    ctx: &mut ConnectionContext,
    session_id: String,
    to: domain::SessionStatus,
) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    let session = ctx.state.sessions.transition(&session_id, admin_id, to).await?;
    reply(ctx, ServerMessage::SessionStatus { session_id: session.session_id, status: session.status }).await;
    Ok(())
}

async fn end_session(ctx: &mut ConnectionContext, session_id: String) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    let session = ctx
        .state
        .sessions
        .transition(&session_id, admin_id, domain::SessionStatus::Ending)
        .await?;
    let session = ctx
        .state
        .sessions
        .transition(&session.session_id, admin_id, domain::SessionStatus::Ended)
        .await?;
    ctx.state.admins.forget_owned_session(admin_id, &session_id).await?;
    ctx.state.broadcaster.unsubscribe(&session_id, &ctx.socket_id).await;
    ctx.state.metrics.sessions_ended_total.inc();
    reply(ctx, ServerMessage::SessionEnded { session_id: session.session_id, status: session.status }).await;
    Ok(())
}

async fn list_sessions(
    ctx: &mut ConnectionContext,
    filter: domain::SessionListFilter,
) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    let sessions = ctx.state.sessions.list_sessions(admin_id, filter).await;
    reply(ctx, ServerMessage::SessionsListed { sessions }).await;
    Ok(())
}

/// Fans one admin utterance out to every language in `translations` at once.
/// Each language is synthesized and published independently so that a
/// synthesis failure or backpressure drop in one language never blocks the
/// others.
async fn broadcast_translation(
    ctx: &mut ConnectionContext,
    session_id: String,
    _original: String,
    translations: HashMap<String, String>,
    generate_tts: bool,
    voice_type: VoiceType,
) -> Result<(), services::ServiceError> {
    let admin_id = require_admin(ctx).await?;
    let session = ctx.state.sessions.get(&session_id).await?;
    if !session.is_owned_by(admin_id) {
        return Err(services::ServiceError::new(ErrorCode::AuthzSessionNotOwned, "caller does not own this session")
            .with_details(ErrorDetails {
                session_id: Some(session_id.clone()),
                operation: Some("broadcastTranslation".to_string()),
                ..Default::default()
            }));
    }
    ctx.state
        .broadcast_limiter
        .check(&format!("{admin_id}:broadcastTranslation"))
        .await
        .inspect_err(|_| ctx.state.metrics.rate_limit_rejections_total.inc())?;

    let timestamp = chrono::Utc::now();
    for (language, text) in translations {
        let audio_url = if generate_tts && session.config.tts_mode.uses_cloud_synthesis() {
            match ctx
                .state
                .audio_cache
                .get_or_synthesize(&text, &language, voice_type, "mp3")
                .await
            {
                Ok((fingerprint, _bytes)) => Some(format!("/audio/{fingerprint}.mp3")),
                Err(err) => {
                    tracing::warn!(session_id = %session_id, language = %language, error = %err, "tts synthesis failed, broadcasting text only");
                    None
                }
            }
        } else {
            None
        };

        let outbound = ServerMessage::Translation {
            session_id: session_id.clone(),
            language: language.clone(),
            text,
            timestamp,
            audio_url,
            use_local_tts: session.config.emits_local_tts(),
        };
        let outcome = ctx
            .state
            .broadcaster
            .publish(&session_id, &language, OutboundMessage { payload: outbound.to_json() })
            .await;
        for socket_id in outcome.overflowing {
            ctx.state.broadcaster.unsubscribe(&session_id, &socket_id).await;
        }
        if outcome.dropped > 0 {
            ctx.state.metrics.broadcast_drops_total.inc_by(outcome.dropped as u64);
        }
        ctx.state.metrics.translations_broadcast_total.inc();
    }
    Ok(())
}

async fn join_session(
    ctx: &mut ConnectionContext,
    session_id: String,
    preferred_language: String,
) -> Result<(), services::ServiceError> {
    let session = ctx.state.sessions.get(&session_id).await?;
    if !session.config.enabled_languages.contains(&preferred_language) {
        return Err(services::ServiceError::new(
            ErrorCode::ValidationInvalidLanguage,
            format!("'{preferred_language}' is not enabled for this session"),
        ));
    }

    let now = chrono::Utc::now();
    ctx.state
        .sessions
        .add_client(
            &session_id,
            ClientMembership {
                socket_id: ctx.socket_id.clone(),
                preferred_language: preferred_language.clone(),
                joined_at: now,
                last_seen: now,
                audio_capabilities: Default::default(),
            },
        )
        .await?;

    ctx.state
        .broadcaster
        .register(&session_id, &ctx.socket_id, &preferred_language, ctx.tx.clone(), ctx.kill.clone())
        .await;
    ctx.joined_session = Some(session_id.clone());

    reply(ctx, ServerMessage::JoinedSession { session_id, preferred_language }).await;
    Ok(())
}

async fn set_language(
    ctx: &mut ConnectionContext,
    session_id: String,
    new_language: String,
) -> Result<(), services::ServiceError> {
    let session = ctx.state.sessions.get(&session_id).await?;
    if !session.config.enabled_languages.contains(&new_language) {
        return Err(services::ServiceError::new(
            ErrorCode::ValidationInvalidLanguage,
            format!("'{new_language}' is not enabled for this session"),
        ));
    }
    ctx.state.broadcaster.update_language(&session_id, &ctx.socket_id, &new_language).await;
    Ok(())
}

async fn leave_session(ctx: &mut ConnectionContext, session_id: String) -> Result<(), services::ServiceError> {
    ctx.state.sessions.remove_client(&session_id, &ctx.socket_id).await?;
    ctx.state.broadcaster.unsubscribe(&session_id, &ctx.socket_id).await;
    if ctx.joined_session.as_deref() == Some(session_id.as_str()) {
        ctx.joined_session = None;
    }
    Ok(())
}

async fn reply(ctx: &ConnectionContext, message: ServerMessage) {
    let _ = ctx.tx.send(OutboundMessage { payload: message.to_json() }).await;
}

async fn send_envelope(ctx: &ConnectionContext, err: services::ServiceError) {
    let mut envelope = ErrorEnvelope::new("error", err.code, err.message);
    if let Some(details) = err.details {
        envelope = envelope.with_details(details);
    }
    if let Some(retry_after) = err.retry_after {
        envelope = envelope.with_retry_after(retry_after);
    }
    reply(ctx, ServerMessage::Error(envelope)).await;
}

async fn send_error(ctx: &ConnectionContext, code: ErrorCode, message: &str) {
    send_envelope(ctx, services::ServiceError::new(code, message)).await;
}

async fn cleanup(ctx: &ConnectionContext) {
    if let Some(session_id) = &ctx.joined_session {
        ctx.state.broadcaster.unsubscribe(session_id, &ctx.socket_id).await;
    }
    if let Some(admin) = &ctx.admin {
        ctx.state.admins.detach_socket(admin.admin_id, &ctx.socket_id).await;
        ctx.state.tokens.remove(&ctx.socket_id).await;
        schedule_pause_on_detach(&ctx.state, admin.admin_id).await;
    }
    ctx.state.connection_limiter.release(&ctx.client_ip).await;
}

/// If this was the admin's last attached socket, pauses their owned,
/// currently-active sessions once the reconnect grace window elapses
/// without another socket attaching in the meantime.
async fn schedule_pause_on_detach(state: &AppState, admin_id: Uuid) {
    if state.admins.has_active_socket(admin_id).await {
        return;
    }
    let state = state.clone();
    let grace = Duration::from_secs(state.config.limits.admin_reconnect_grace_secs);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        if state.admins.has_active_socket(admin_id).await {
            return;
        }
        for session in state.sessions.list_owned_by(admin_id).await {
            if session.status == domain::SessionStatus::Active {
                if let Err(err) = state
                    .sessions
                    .transition(&session.session_id, admin_id, domain::SessionStatus::Paused)
                    .await
                {
                    tracing::warn!(session_id = %session.session_id, error = %err, "failed to pause session after admin detach");
                }
            }
        }
    });
}
