use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

use parley_db::Database;
use parley_types::api::Claims;
use parley_types::events::{DeliveryEvent, GatewayCommand};
use parley_types::models::ChatRef;

use crate::bus::EventBus;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, then forward bus
/// events to the client and accept typing commands until either side closes.
pub async fn handle_connection(
    socket: WebSocket,
    bus: EventBus,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (user_id, username) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", username, user_id);

    // Step 2: Send Ready event
    let ready = DeliveryEvent::Ready {
        user_id,
        username: username.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Step 3: Register this connection on the bus
    let (token, mut events) = bus.subscribe(user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward bus events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = events.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let username_recv = username.clone();
    let bus_recv = bus.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&bus_recv, &db, user_id, &username_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            truncate_for_log(&text, 200)
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    bus.unsubscribe(token).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(i64, String)> {
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.username));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    bus: &EventBus,
    db: &Arc<Database>,
    user_id: i64,
    username: &str,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Typing { chat, is_typing } => {
            if let Err(e) = broadcast_typing(bus, db, user_id, username, chat, is_typing).await {
                warn!("{} ({}) typing signal failed: {}", username, user_id, e);
            }
        }
    }
}

/// Truncate client-supplied text for logging without slicing through a
/// multibyte character.
fn truncate_for_log(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Publish a typing signal to every member of the chat except the sender.
/// Never persisted; receivers expire the indicator on their own.
pub async fn broadcast_typing(
    bus: &EventBus,
    db: &Arc<Database>,
    user_id: i64,
    username: &str,
    chat: ChatRef,
    is_typing: bool,
) -> anyhow::Result<()> {
    let members = {
        let db = db.clone();
        spawn_blocking(move || -> anyhow::Result<_> {
            if db.membership(&chat, user_id)?.is_none() {
                return Err(anyhow!("user {} is not a member of {:?}", user_id, chat));
            }
            db.members_of(&chat)
        })
        .await
        .map_err(|e| anyhow!("join error: {}", e))??
    };

    let event = DeliveryEvent::Typing {
        chat,
        user_id,
        username: username.to_string(),
        is_typing,
    };
    for member in members.iter().filter(|m| m.user_id != user_id) {
        bus.publish(member.user_id, event.clone()).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_truncation_respects_char_boundaries() {
        // 199 ASCII bytes followed by a 2-byte char straddling the limit
        let text = format!("{}é and more", "x".repeat(199));
        let cut = truncate_for_log(&text, 200);
        assert_eq!(cut, "x".repeat(199));

        assert_eq!(truncate_for_log("short", 200), "short");
        assert_eq!(truncate_for_log("ééé", 3), "é");
    }

    #[tokio::test]
    async fn typing_goes_to_other_members_only() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("ann", None, "hash").unwrap();
        let ben = db.create_user("ben", None, "hash").unwrap();
        let conv = db.create_conversation(ann, ben).unwrap();
        let chat = ChatRef::Direct(conv);

        let bus = EventBus::new();
        let (_ta, mut ann_rx) = bus.subscribe(ann).await;
        let (_tb, mut ben_rx) = bus.subscribe(ben).await;

        broadcast_typing(&bus, &db, ann, "ann", chat, true)
            .await
            .unwrap();

        match ben_rx.try_recv() {
            Ok(DeliveryEvent::Typing {
                user_id, is_typing, ..
            }) => {
                assert_eq!(user_id, ann);
                assert!(is_typing);
            }
            other => panic!("expected typing event, got {:?}", other),
        }
        // The sender's own sessions are not notified
        assert!(ann_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_from_non_member_is_rejected() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("ann", None, "hash").unwrap();
        let ben = db.create_user("ben", None, "hash").unwrap();
        let eve = db.create_user("eve", None, "hash").unwrap();
        let conv = db.create_conversation(ann, ben).unwrap();

        let bus = EventBus::new();
        let (_tb, mut ben_rx) = bus.subscribe(ben).await;

        let res = broadcast_typing(&bus, &db, eve, "eve", ChatRef::Direct(conv), true).await;
        assert!(res.is_err());
        assert!(ben_rx.try_recv().is_err());
    }
}
