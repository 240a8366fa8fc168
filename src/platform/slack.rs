//! Slack adapter.
//!
//! Uses the Web API for the workspace snapshot and for sending, and Socket
//! Mode (WebSocket) for receiving. A connection task turns socket frames into
//! [`Event`]s; a sender task drains the outgoing queue.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::{BotIdentity, ConnectInfo, Event, MessageEvent, Outgoing, TransportError};
use crate::bot::directory::{NamedEntry, SessionEntry, Snapshot};
use crate::config::SlackConfig;

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Longest message Slack accepts in a single post.
pub const MAX_MESSAGE_LEN: usize = 4000;

const EVENT_BUFFER: usize = 256;
const PAGE_LIMIT: &str = "200";
const CONVERSATION_TYPES: &str = "public_channel,private_channel,mpim,im";

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Web API error codes that mean the token is unusable.
const AUTH_ERRORS: [&str; 5] = [
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];

#[derive(Debug, Error)]
pub enum SlackApiError {
    #[error("{method} request failed: {source}")]
    Http {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned '{error}'")]
    Api { method: &'static str, error: String },

    #[error("unexpected {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SlackApiError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { error, .. } if AUTH_ERRORS.contains(&error.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Web API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AuthTest {
    user_id: String,
    user: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct UsersPage {
    members: Vec<Member>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct Member {
    id: String,
    name: String,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct ConversationsPage {
    channels: Vec<Conversation>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_mpim: bool,
    /// Counterpart of an IM.
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Clone)]
struct WebApi {
    client: Client,
    bot_token: String,
    app_token: String,
}

impl WebApi {
    fn new(config: &SlackConfig) -> Self {
        Self {
            client: Client::new(),
            bot_token: config.bot_token.clone(),
            app_token: config.app_token.clone(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        token: &str,
        form: &[(&str, &str)],
    ) -> Result<T, SlackApiError> {
        let http = |source| SlackApiError::Http { method, source };

        let body: Value = self
            .client
            .post(format!("{}/{}", SLACK_API_BASE, method))
            .bearer_auth(token)
            .form(form)
            .send()
            .await
            .map_err(http)?
            .error_for_status()
            .map_err(http)?
            .json()
            .await
            .map_err(http)?;

        decode_response(method, body)
    }

    /// Page through a cursor-paginated method until the cursor runs out.
    async fn paginate<T, I>(
        &self,
        method: &'static str,
        extra: &[(&str, &str)],
        mut split: impl FnMut(T) -> (Vec<I>, String),
    ) -> Result<Vec<I>, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut form = vec![("limit", PAGE_LIMIT)];
            form.extend_from_slice(extra);
            if !cursor.is_empty() {
                form.push(("cursor", cursor.as_str()));
            }

            let page: T = self.call(method, &self.bot_token, &form).await?;
            let (mut page_items, next) = split(page);
            items.append(&mut page_items);

            if next.is_empty() {
                return Ok(items);
            }
            cursor = next;
        }
    }

    async fn connect_info(&self) -> Result<ConnectInfo, SlackApiError> {
        let auth: AuthTest = self.call("auth.test", &self.bot_token, &[]).await?;

        let members = self
            .paginate("users.list", &[], |page: UsersPage| {
                (page.members, page.response_metadata.next_cursor)
            })
            .await?;

        let conversations = self
            .paginate(
                "conversations.list",
                &[("types", CONVERSATION_TYPES), ("exclude_archived", "true")],
                |page: ConversationsPage| (page.channels, page.response_metadata.next_cursor),
            )
            .await?;

        Ok(ConnectInfo {
            bot: BotIdentity {
                id: auth.user_id,
                name: auth.user,
            },
            snapshot: build_snapshot(members, conversations),
        })
    }

    async fn open_connection(&self) -> Result<String, SlackApiError> {
        let open: ConnectionsOpen = self
            .call("apps.connections.open", &self.app_token, &[])
            .await?;
        Ok(open.url)
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), SlackApiError> {
        let _: Value = self
            .call(
                "chat.postMessage",
                &self.bot_token,
                &[("channel", channel), ("text", text)],
            )
            .await?;
        Ok(())
    }
}

/// Check the `ok` flag of a Web API response and decode the body.
fn decode_response<T: DeserializeOwned>(
    method: &'static str,
    body: Value,
) -> Result<T, SlackApiError> {
    if body["ok"].as_bool() != Some(true) {
        let error = body["error"].as_str().unwrap_or("unknown").to_string();
        return Err(SlackApiError::Api { method, error });
    }
    serde_json::from_value(body).map_err(|source| SlackApiError::Decode { method, source })
}

fn build_snapshot(members: Vec<Member>, conversations: Vec<Conversation>) -> Snapshot {
    let mut snapshot = Snapshot {
        users: members
            .into_iter()
            .filter(|m| !m.deleted)
            .map(|m| NamedEntry::new(m.id, m.name))
            .collect(),
        ..Snapshot::default()
    };

    for conversation in conversations {
        match conversation {
            Conversation {
                id,
                is_im: true,
                user: Some(user),
                ..
            } => snapshot.direct_sessions.push(SessionEntry::new(id, user)),
            Conversation { is_im: true, id, .. } => {
                debug!("Skipping IM {} without a counterpart", id);
            }
            Conversation { name: None, id, .. } => {
                debug!("Skipping unnamed conversation {}", id);
            }
            Conversation {
                id,
                name: Some(name),
                is_private,
                is_mpim,
                ..
            } => {
                let entry = NamedEntry::new(id, name);
                if is_private || is_mpim {
                    snapshot.groups.push(entry);
                } else {
                    snapshot.channels.push(entry);
                }
            }
        }
    }

    snapshot
}

// ---------------------------------------------------------------------------
// Socket Mode frames
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Default, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum FrameKind {
    Hello,
    Disconnect,
    Message(MessageEvent),
    Ignored,
}

#[derive(Debug, PartialEq, Eq)]
struct Frame {
    envelope_id: Option<String>,
    kind: FrameKind,
}

fn parse_frame(text: &str) -> Result<Frame, TransportError> {
    let envelope: Envelope =
        serde_json::from_str(text).map_err(|e| TransportError::Unmarshalling(e.to_string()))?;

    let kind = match envelope.kind.as_str() {
        "hello" => FrameKind::Hello,
        "disconnect" => FrameKind::Disconnect,
        "events_api" => {
            let event: SlackEvent = serde_json::from_value(envelope.payload["event"].clone())
                .map_err(|e| TransportError::Unmarshalling(e.to_string()))?;
            message_event(event).map_or(FrameKind::Ignored, FrameKind::Message)
        }
        _ => FrameKind::Ignored,
    };

    Ok(Frame {
        envelope_id: envelope.envelope_id,
        kind,
    })
}

/// Plain user messages only: edits, joins and other subtypes are skipped.
fn message_event(event: SlackEvent) -> Option<MessageEvent> {
    if event.kind != "message" || event.subtype.is_some() {
        return None;
    }
    Some(MessageEvent::new(event.user?, event.channel?, event.text?))
}

fn ack(envelope_id: &str) -> String {
    json!({ "envelope_id": envelope_id }).to_string()
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// How a socket session ended.
enum SocketEnd {
    Reconnect,
    /// The event consumer went away.
    Closed,
}

/// Connect to Slack.
///
/// Returns the event stream for the bot runtime and the outgoing sink.
/// Connecting happens in the background: the first event is either
/// `Connected` or a fatal error.
pub fn connect(config: &SlackConfig) -> (mpsc::Receiver<Event>, SlackOutgoing) {
    let api = WebApi::new(config);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_sender(api.clone(), queue_rx, events_tx.downgrade()));
    tokio::spawn(run_connection(api, events_tx));

    (events_rx, SlackOutgoing { queue: queue_tx })
}

async fn run_connection(api: WebApi, events: mpsc::Sender<Event>) {
    let mut failures = 0;

    loop {
        let error = match run_socket(&api, &events).await {
            Ok(SocketEnd::Closed) => {
                debug!("Event consumer closed, stopping Slack connection");
                return;
            }
            Ok(SocketEnd::Reconnect) => {
                failures = 0;
                info!("Reconnecting to Slack");
                continue;
            }
            Err(e) => e,
        };

        let fatal = if error.is_auth() {
            Some(TransportError::InvalidAuth(error.to_string()))
        } else {
            failures += 1;
            warn!(
                "Slack connection attempt {}/{} failed: {}",
                failures, MAX_RECONNECT_ATTEMPTS, error
            );
            (failures >= MAX_RECONNECT_ATTEMPTS)
                .then(|| TransportError::Connection(error.to_string()))
        };

        if let Some(fatal) = fatal {
            error!("Giving up on Slack connection: {}", fatal);
            let _ = events.send(Event::Error(fatal)).await;
            return;
        }

        tokio::time::sleep(RECONNECT_DELAY * failures).await;
    }
}

/// Run one Socket Mode session, from snapshot to disconnect.
async fn run_socket(
    api: &WebApi,
    events: &mpsc::Sender<Event>,
) -> Result<SocketEnd, SlackApiError> {
    let mut pending = Some(api.connect_info().await?);
    let url = api.open_connection().await?;

    info!("Connecting to Slack Socket Mode");
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (mut ws_write, mut ws_read) = stream.split();

    while let Some(frame) = ws_read.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => {
                info!("Slack closed the socket");
                return Ok(SocketEnd::Reconnect);
            }
            Ok(_) => continue,
            Err(e) => {
                let error = Event::Error(TransportError::Incoming(e.to_string()));
                if events.send(error).await.is_err() {
                    return Ok(SocketEnd::Closed);
                }
                return Ok(SocketEnd::Reconnect);
            }
        };

        let event = match parse_frame(text.as_str()) {
            Ok(frame) => {
                if let Some(id) = &frame.envelope_id {
                    if let Err(e) = ws_write.send(WsMessage::Text(ack(id).into())).await {
                        warn!("Failed to ack envelope {}: {}", id, e);
                        if events
                            .send(Event::Error(TransportError::Ack(id.clone())))
                            .await
                            .is_err()
                        {
                            return Ok(SocketEnd::Closed);
                        }
                    }
                }

                match frame.kind {
                    FrameKind::Hello => match pending.take() {
                        Some(info) => Event::Connected(info),
                        None => continue,
                    },
                    FrameKind::Disconnect => {
                        info!("Slack requested disconnect");
                        return Ok(SocketEnd::Reconnect);
                    }
                    FrameKind::Message(message) => Event::Message(message),
                    FrameKind::Ignored => continue,
                }
            }
            Err(e) => Event::Error(e),
        };

        if events.send(event).await.is_err() {
            return Ok(SocketEnd::Closed);
        }
    }

    Ok(SocketEnd::Reconnect)
}

// ---------------------------------------------------------------------------
// Outgoing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct QueuedMessage {
    channel: String,
    text: String,
}

/// Outgoing sink backed by a background sender task.
#[derive(Clone)]
pub struct SlackOutgoing {
    queue: mpsc::UnboundedSender<QueuedMessage>,
}

impl Outgoing for SlackOutgoing {
    fn send(&self, text: &str, channel: &str) {
        let message = QueuedMessage {
            channel: channel.to_string(),
            text: text.to_string(),
        };
        if self.queue.send(message).is_err() {
            warn!("Sender task gone, dropping message to {}", channel);
        }
    }
}

fn check_length(message: &QueuedMessage) -> Result<(), TransportError> {
    let len = message.text.chars().count();
    if len > MAX_MESSAGE_LEN {
        return Err(TransportError::MessageTooLong {
            channel: message.channel.clone(),
            len,
        });
    }
    Ok(())
}

async fn run_sender(
    api: WebApi,
    mut queue: mpsc::UnboundedReceiver<QueuedMessage>,
    events: mpsc::WeakSender<Event>,
) {
    while let Some(message) = queue.recv().await {
        let result = match check_length(&message) {
            Ok(()) => api
                .post_message(&message.channel, &message.text)
                .await
                .map_err(|e| TransportError::Outgoing {
                    channel: message.channel.clone(),
                    reason: e.to_string(),
                }),
            Err(e) => Err(e),
        };

        let Err(error) = result else {
            continue;
        };
        warn!("{}", error);

        let Some(events) = events.upgrade() else {
            break;
        };
        if events.send(Event::Error(error)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation(id: &str, name: Option<&str>) -> Conversation {
        Conversation {
            id: id.into(),
            name: name.map(String::from),
            is_im: false,
            is_private: false,
            is_mpim: false,
            user: None,
        }
    }

    #[test]
    fn test_parse_hello() {
        let frame = parse_frame(r#"{"type":"hello","num_connections":1}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::Hello);
        assert_eq!(frame.envelope_id, None);
    }

    #[test]
    fn test_parse_message_event() {
        let text = r#"{
            "type": "events_api",
            "envelope_id": "E1",
            "payload": {"event": {"type": "message", "user": "U1", "channel": "C1", "text": "<@UBOT> ham"}}
        }"#;

        let frame = parse_frame(text).unwrap();
        assert_eq!(frame.envelope_id.as_deref(), Some("E1"));
        assert_eq!(frame.kind, FrameKind::Message(MessageEvent::new("U1", "C1", "<@UBOT> ham")));
    }

    #[test]
    fn test_subtypes_are_ignored_but_acked() {
        let text = r#"{
            "type": "events_api",
            "envelope_id": "E2",
            "payload": {"event": {"type": "message", "subtype": "message_changed", "channel": "C1"}}
        }"#;

        let frame = parse_frame(text).unwrap();
        assert_eq!(frame.envelope_id.as_deref(), Some("E2"));
        assert_eq!(frame.kind, FrameKind::Ignored);
    }

    #[test]
    fn test_parse_disconnect_and_unknown() {
        let disconnect = parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#);
        assert_eq!(disconnect.unwrap().kind, FrameKind::Disconnect);

        let other = parse_frame(r#"{"type":"slash_commands","envelope_id":"E3","payload":{}}"#);
        assert_eq!(other.unwrap().kind, FrameKind::Ignored);
    }

    #[test]
    fn test_garbage_frame_is_unmarshalling_error() {
        assert!(matches!(
            parse_frame("not json"),
            Err(TransportError::Unmarshalling(_))
        ));
    }

    #[test]
    fn test_ack_payload() {
        let value: Value = serde_json::from_str(&ack("E9")).unwrap();
        assert_eq!(value, json!({"envelope_id": "E9"}));
    }

    #[test]
    fn test_decode_response_errors() {
        let err = decode_response::<AuthTest>("auth.test", json!({"ok": false, "error": "invalid_auth"}))
            .unwrap_err();
        assert!(err.is_auth());

        let err = decode_response::<AuthTest>("auth.test", json!({"ok": false, "error": "ratelimited"}))
            .unwrap_err();
        assert!(!err.is_auth());

        let err = decode_response::<AuthTest>("auth.test", json!({"ok": true})).unwrap_err();
        assert!(matches!(err, SlackApiError::Decode { .. }));

        let auth: AuthTest =
            decode_response("auth.test", json!({"ok": true, "user_id": "UBOT", "user": "hambot"}))
                .unwrap();
        assert_eq!(auth.user_id, "UBOT");
    }

    #[test]
    fn test_build_snapshot_classifies_conversations() {
        let members = vec![
            Member { id: "U1".into(), name: "alice".into(), deleted: false },
            Member { id: "U9".into(), name: "gone".into(), deleted: true },
        ];
        let conversations = vec![
            conversation("C1", Some("general")),
            Conversation { is_private: true, ..conversation("G1", Some("secret")) },
            Conversation { is_mpim: true, ..conversation("G2", Some("mpdm-a--b")) },
            Conversation { is_im: true, user: Some("U1".into()), ..conversation("D1", None) },
            Conversation { is_im: true, ..conversation("D2", None) },
            conversation("C9", None),
        ];

        let snapshot = build_snapshot(members, conversations);

        assert_eq!(snapshot.users, vec![NamedEntry::new("U1", "alice")]);
        assert_eq!(snapshot.channels, vec![NamedEntry::new("C1", "general")]);
        assert_eq!(
            snapshot.groups,
            vec![NamedEntry::new("G1", "secret"), NamedEntry::new("G2", "mpdm-a--b")]
        );
        assert_eq!(snapshot.direct_sessions, vec![SessionEntry::new("D1", "U1")]);
    }

    #[test]
    fn test_message_length_limit() {
        let ok = QueuedMessage { channel: "C1".into(), text: "h".repeat(MAX_MESSAGE_LEN) };
        assert!(check_length(&ok).is_ok());

        let long = QueuedMessage { channel: "C1".into(), text: "h".repeat(MAX_MESSAGE_LEN + 1) };
        assert_eq!(
            check_length(&long),
            Err(TransportError::MessageTooLong { channel: "C1".into(), len: MAX_MESSAGE_LEN + 1 })
        );
    }

    #[tokio::test]
    async fn test_outgoing_enqueues_without_blocking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outgoing = SlackOutgoing { queue: tx };

        outgoing.send("ham :ham:", "C1");

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.channel, "C1");
        assert_eq!(queued.text, "ham :ham:");
    }
}
