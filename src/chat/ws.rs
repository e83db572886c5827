use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::protocol::{ClientEvent, ServerEvent};
use super::registry::{ChatRegistry, ConnectionId, Outbox};
use crate::db::{NewChatMessage, Store};

const WELCOME_MESSAGE: &str =
    "Welcome to your BrightDesk chat session! How can I help with your project today?";

/// Lifecycle of one chat connection. The socket closing ends the receive
/// loop, so the terminal state needs no variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Unjoined,
    Joined { booking_id: i64 },
}

#[debug_handler(state = crate::AppState)]
pub async fn chat_ws(
    State(store): State<Store>,
    State(registry): State<ChatRegistry>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, store, registry))
}

async fn handle_socket(socket: WebSocket, store: Store, registry: ChatRegistry) {
    let conn = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = inbox.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let mut state = SessionState::Unjoined;
    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        state = handle_frame(&store, &registry, conn, &outbox, state, &text).await;
    }

    registry.unregister(conn);
    writer.abort();
    debug!(conn = %conn, "socket closed");
}

/// Advance the connection's state machine by one inbound frame. Every failure
/// is reported as an `error` event on this connection; the socket itself is
/// never closed from here.
async fn handle_frame(
    store: &Store,
    registry: &ChatRegistry,
    conn: ConnectionId,
    outbox: &Outbox,
    state: SessionState,
    raw: &str,
) -> SessionState {
    let event = match serde_json::from_str::<ClientEvent>(raw) {
        Ok(event) => event,
        Err(_) => {
            send_to(outbox, &ServerEvent::error("Unrecognized message"));
            return state;
        }
    };

    match (state, event) {
        (SessionState::Unjoined, ClientEvent::Join { chat_key }) => {
            join(store, registry, conn, outbox, &chat_key).await
        }
        (SessionState::Unjoined, ClientEvent::Message { .. }) => {
            send_to(
                outbox,
                &ServerEvent::error("Join a chat session before sending messages"),
            );
            state
        }
        (SessionState::Joined { .. }, ClientEvent::Join { .. }) => {
            send_to(outbox, &ServerEvent::error("Already joined a chat session"));
            state
        }
        (SessionState::Joined { booking_id }, ClientEvent::Message { sender, message }) => {
            send_message(store, registry, outbox, booking_id, sender, message).await;
            state
        }
    }
}

/// Resolve the chat key, bind the connection to the room, replay history and
/// announce the participant. An unknown key leaves the connection unjoined
/// and open; the client decides what to do next.
async fn join(
    store: &Store,
    registry: &ChatRegistry,
    conn: ConnectionId,
    outbox: &Outbox,
    chat_key: &str,
) -> SessionState {
    let booking = match store.booking_by_chat_key(chat_key).await {
        Ok(Some(booking)) => booking,
        Ok(None) => {
            send_to(outbox, &ServerEvent::error("Invalid chat key"));
            return SessionState::Unjoined;
        }
        Err(err) => {
            warn!(conn = %conn, error = %err, "chat key lookup failed");
            send_to(outbox, &ServerEvent::error("Failed to join chat"));
            return SessionState::Unjoined;
        }
    };

    let messages = match store.chat_messages(booking.id).await {
        Ok(messages) => messages,
        Err(err) => {
            warn!(conn = %conn, booking_id = booking.id, error = %err, "history fetch failed");
            send_to(outbox, &ServerEvent::error("Failed to join chat"));
            return SessionState::Unjoined;
        }
    };

    registry.register(booking.id, conn, outbox.clone());
    send_to(outbox, &ServerEvent::History { messages });

    match store
        .create_chat_message(NewChatMessage {
            booking_id: booking.id,
            sender: "system".to_owned(),
            message: WELCOME_MESSAGE.to_owned(),
        })
        .await
    {
        Ok(welcome) => registry.broadcast(booking.id, &ServerEvent::Message { message: welcome }),
        Err(err) => warn!(booking_id = booking.id, error = %err, "welcome message failed"),
    }

    info!(booking_id = booking.id, conn = %conn, "participant joined");
    SessionState::Joined {
        booking_id: booking.id,
    }
}

/// Validate, persist and fan out one participant message. Validation failures
/// go back to the sender alone; the rest of the room sees nothing.
async fn send_message(
    store: &Store,
    registry: &ChatRegistry,
    outbox: &Outbox,
    booking_id: i64,
    sender: String,
    message: String,
) {
    let new = NewChatMessage {
        booking_id,
        sender,
        message,
    };
    if let Err(err) = new.validate() {
        send_to(outbox, &ServerEvent::error(err.to_string()));
        return;
    }
    // The system label is reserved for server-generated notices.
    if new.sender.trim() == "system" {
        send_to(outbox, &ServerEvent::error("Sender name is reserved"));
        return;
    }

    match store.create_chat_message(new).await {
        Ok(saved) => registry.broadcast(booking_id, &ServerEvent::Message { message: saved }),
        Err(err) => {
            warn!(booking_id, error = %err, "failed to persist message");
            send_to(outbox, &ServerEvent::error("Failed to send message"));
        }
    }
}

fn send_to(outbox: &Outbox, event: &ServerEvent) {
    match serde_json::to_string(event) {
        // A closed outbox means the socket is already gone; nothing to do.
        Ok(frame) => {
            let _ = outbox.send(frame);
        }
        Err(err) => warn!(error = %err, "failed to serialize event"),
    }
}
