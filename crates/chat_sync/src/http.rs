use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use shared::{
    domain::{
        ConnectionState, Message, Reaction, ReactionKind, RoomTopic, ServerMessageId, UserId,
    },
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        FetchReactionsRequest, ListMessagesQuery, MessagePayload, ReactionPayload,
        SendMessageRequest, ServerEvent, ToggleReactionRequest,
    },
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, warn};
use url::Url;

use crate::backend::{ChatBackend, PushEvent, PushSubscription};

const PUSH_BUFFER: usize = 256;

pub struct HttpChatBackend {
    http: Client,
    base_url: Url,
}

impl HttpChatBackend {
    pub fn new(server_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(server_url)
            .with_context(|| format!("invalid server url: {server_url}"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must start with http:// or https://"));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("failed to build endpoint url for {path}"))
    }

    fn push_url(&self, room: Option<&RoomTopic>) -> Result<Url> {
        let mut url = self.endpoint("ws")?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| anyhow!("cannot derive websocket url from {}", self.base_url))?;
        if let Some(topic) = room {
            url.query_pairs_mut().append_pair("topic", topic.as_str());
        }
        Ok(url)
    }
}

/// Turns a non-success response into an `ApiException`, using the JSON error
/// body when the backend sent one.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let api_error = serde_json::from_str::<ApiError>(&body).unwrap_or_else(|_| {
        ApiError::new(
            ErrorCode::from_http_status(status.as_u16()),
            format!("http status {status}"),
        )
    });
    Err(ApiException::from(api_error).into())
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn fetch_messages(&self, room: Option<&RoomTopic>, limit: u32) -> Result<Vec<Message>> {
        let response = self
            .http
            .get(self.endpoint("messages")?)
            .query(&ListMessagesQuery {
                topic: room.cloned(),
                limit,
            })
            .send()
            .await?;
        let payloads: Vec<MessagePayload> = ensure_success(response).await?.json().await?;
        Ok(payloads.into_iter().map(Message::from).collect())
    }

    async fn subscribe(&self, room: Option<&RoomTopic>) -> Result<PushSubscription> {
        let ws_url = self.push_url(room)?;
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (_, mut ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(PUSH_BUFFER);

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                let event = match frame {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(%err, "invalid push frame");
                            continue;
                        }
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(err) => {
                        warn!(%err, "websocket receive failed");
                        break;
                    }
                };
                let forwarded = match event {
                    ServerEvent::MessageCreated { message } => {
                        PushEvent::Message(Message::from(message))
                    }
                    ServerEvent::ChannelError(err) => {
                        warn!(code = ?err.code, message = %err.message, "push channel error");
                        PushEvent::Status(ConnectionState::ChannelError)
                    }
                    other => match other.status() {
                        Some(status) => PushEvent::Status(status),
                        None => continue,
                    },
                };
                if tx.send(forwarded).await.is_err() {
                    debug!("push subscriber went away");
                    break;
                }
            }
        });

        Ok(PushSubscription::with_reader(rx, reader))
    }

    async fn send_message(
        &self,
        sender_display_name: &str,
        body: &str,
        room: Option<&RoomTopic>,
    ) -> Result<Message> {
        let response = self
            .http
            .post(self.endpoint("messages")?)
            .json(&SendMessageRequest {
                sender_display_name: sender_display_name.to_string(),
                body: body.to_string(),
                room_topic: room.cloned(),
            })
            .send()
            .await?;
        let payload: MessagePayload = ensure_success(response).await?.json().await?;
        Ok(Message::from(payload))
    }

    async fn fetch_reactions(
        &self,
        message_ids: &[ServerMessageId],
    ) -> Result<HashMap<ServerMessageId, Vec<Reaction>>> {
        let response = self
            .http
            .post(self.endpoint("reactions/query")?)
            .json(&FetchReactionsRequest {
                message_ids: message_ids.to_vec(),
            })
            .send()
            .await?;
        let payloads: Vec<ReactionPayload> = ensure_success(response).await?.json().await?;

        let mut by_message: HashMap<ServerMessageId, Vec<Reaction>> = HashMap::new();
        for payload in payloads {
            by_message
                .entry(payload.message_id.clone())
                .or_default()
                .push(Reaction::from(payload));
        }
        Ok(by_message)
    }

    async fn toggle_reaction(
        &self,
        message_id: &ServerMessageId,
        user_id: &UserId,
        kind: ReactionKind,
    ) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("reactions/toggle")?)
            .json(&ToggleReactionRequest {
                message_id: message_id.clone(),
                user_id: user_id.clone(),
                kind,
            })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
