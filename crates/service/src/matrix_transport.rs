//! Concrete `ChatTransport`/`MxcDownloader` adapter for the Matrix
//! Client-Server API, reached over plain `reqwest` calls rather than a
//! full SDK — the engine only needs `sync`, `send`/`reply`, `redact`,
//! media download, and membership/join, a small enough surface that a
//! thin HTTP client is simpler to reason about than pulling in a stateful
//! client-side crypto/state-store stack built for interactive clients.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::ports::{ChatEvent, ChatTransport, MxcDownloader, SyncResult};

/// Talks to a single homeserver as a single bot user, via its access token.
pub struct MatrixChatTransport {
    http: reqwest::Client,
    homeserver_url: String,
    access_token: String,
    bot_user_id: String,
}

impl MatrixChatTransport {
    #[must_use]
    pub fn new(homeserver_url: String, access_token: String, bot_user_id: String) -> Self {
        Self { http: reqwest::Client::new(), homeserver_url, access_token, bot_user_id }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.homeserver_url.trim_end_matches('/'), path)
    }

    async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> Result<String, ServiceError> {
        let txn_id = Uuid::new_v4();
        let url = self.url(&format!(
            "/_matrix/client/v3/rooms/{}/send/{}/{}",
            urlencode(room_id),
            event_type,
            txn_id
        ));
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&content)
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_send", e))?;
        let body: SendEventResponse = check_status(resp).await?;
        Ok(body.event_id)
    }
}

#[derive(Deserialize)]
struct SendEventResponse {
    event_id: String,
}

#[derive(Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Deserialize, Default)]
struct SyncRooms {
    #[serde(default)]
    join: std::collections::HashMap<String, JoinedRoom>,
    #[serde(default)]
    invite: std::collections::HashMap<String, Value>,
}

#[derive(Deserialize, Default)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Deserialize, Default)]
struct Timeline {
    #[serde(default)]
    events: Vec<RawTimelineEvent>,
}

#[derive(Deserialize)]
struct RawTimelineEvent {
    #[serde(rename = "type")]
    event_type: String,
    event_id: String,
    sender: String,
    #[serde(default)]
    content: Value,
}

async fn check_status<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, ServiceError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ServiceError::retriable("matrix_http", format!("status {status}: {body}")));
    }
    resp.json::<T>().await.map_err(|e| ServiceError::retriable("matrix_decode", e))
}

fn urlencode(s: &str) -> String {
    percent_encode(s)
}

/// Minimal percent-encoding for Matrix room/user IDs embedded in URL path
/// segments (they always contain `!`, `:`, `@`).
fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            },
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[async_trait]
impl ChatTransport for MatrixChatTransport {
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> Result<SyncResult, ServiceError> {
        let mut url = self.url(&format!("/_matrix/client/v3/sync?timeout={timeout_ms}"));
        if let Some(since) = since {
            url.push_str(&format!("&since={}", percent_encode(since)));
        }
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_sync", e))?;
        let body: SyncResponse = check_status(resp).await?;

        let mut events = Vec::new();
        for (room_id, room) in body.rooms.join {
            for raw in room.timeline.events {
                if raw.sender == self.bot_user_id {
                    continue;
                }
                events.push(parse_timeline_event(&room_id, raw));
            }
        }
        let invited_rooms = body.rooms.invite.into_keys().collect();

        Ok(SyncResult { next_batch: body.next_batch, events, invited_rooms })
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<String, ServiceError> {
        self.send_event(
            room_id,
            "m.room.message",
            json!({ "msgtype": "m.text", "body": body }),
        )
        .await
    }

    async fn reply_text(&self, room_id: &str, event_id: &str, body: &str) -> Result<String, ServiceError> {
        self.send_event(
            room_id,
            "m.room.message",
            json!({
                "msgtype": "m.text",
                "body": body,
                "m.relates_to": { "m.in_reply_to": { "event_id": event_id } },
            }),
        )
        .await
    }

    async fn reply_file_text(
        &self,
        room_id: &str,
        event_id: &str,
        filename: &str,
        text_content: &str,
    ) -> Result<String, ServiceError> {
        let upload_url = self.url(&format!(
            "/_matrix/media/v3/upload?filename={}",
            percent_encode(filename)
        ));
        let resp = self
            .http
            .post(&upload_url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "text/plain")
            .body(text_content.as_bytes().to_vec())
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_upload", e))?;
        let upload: UploadResponse = check_status(resp).await?;

        self.send_event(
            room_id,
            "m.room.message",
            json!({
                "msgtype": "m.file",
                "body": filename,
                "url": upload.content_uri,
                "info": { "mimetype": "text/plain" },
                "m.relates_to": { "m.in_reply_to": { "event_id": event_id } },
            }),
        )
        .await
    }

    async fn redact_event(&self, room_id: &str, event_id: &str) -> Result<(), ServiceError> {
        let txn_id = Uuid::new_v4();
        let url = self.url(&format!(
            "/_matrix/client/v3/rooms/{}/redact/{}/{}",
            urlencode(room_id),
            urlencode(event_id),
            txn_id
        ));
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_redact", e))?;
        let _: SendEventResponse = check_status(resp).await?;
        Ok(())
    }

    async fn download_mxc(&self, mxc_url: &str) -> Result<Vec<u8>, ServiceError> {
        MxcDownloader::download(self, mxc_url).await
    }

    async fn is_user_joined(&self, room_id: &str, user_id: &str) -> Result<bool, ServiceError> {
        let url = self.url(&format!(
            "/_matrix/client/v3/rooms/{}/joined_members",
            urlencode(room_id)
        ));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_joined_members", e))?;
        let body: JoinedMembersResponse = check_status(resp).await?;
        Ok(body.joined.contains_key(user_id))
    }

    async fn join_room(&self, room_id: &str) -> Result<(), ServiceError> {
        let url = self.url(&format!("/_matrix/client/v3/join/{}", urlencode(room_id)));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_join", e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ServiceError::retriable("matrix_join", format!("status {status}: {text}")));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    content_uri: String,
}

#[derive(Deserialize)]
struct JoinedMembersResponse {
    joined: std::collections::HashMap<String, Value>,
}

#[async_trait]
impl MxcDownloader for MatrixChatTransport {
    async fn download(&self, mxc_url: &str) -> Result<Vec<u8>, ServiceError> {
        let (server_name, media_id) = parse_mxc(mxc_url)
            .ok_or_else(|| ServiceError::InvalidInput(format!("not an mxc:// URL: {mxc_url}")))?;
        let url = self.url(&format!(
            "/_matrix/client/v1/media/download/{}/{}",
            urlencode(server_name),
            urlencode(media_id)
        ));
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::retriable("matrix_download", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::retriable("matrix_download", format!("status {status}")));
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ServiceError::retriable("matrix_download", e))
    }
}

fn parse_mxc(mxc_url: &str) -> Option<(&str, &str)> {
    let rest = mxc_url.strip_prefix("mxc://")?;
    rest.split_once('/')
}

fn parse_timeline_event(room_id: &str, raw: RawTimelineEvent) -> ChatEvent {
    let content = raw.content;
    if raw.event_type == "m.reaction" {
        let relates = content.get("m.relates_to");
        return ChatEvent {
            room_id: room_id.to_owned(),
            event_id: raw.event_id,
            sender: raw.sender,
            event_type: raw.event_type,
            body: None,
            mxc_url: None,
            mimetype: None,
            in_reply_to_event_id: None,
            reaction_related_event_id: relates
                .and_then(|r| r.get("event_id"))
                .and_then(Value::as_str)
                .map(str::to_owned),
            reaction_key: relates.and_then(|r| r.get("key")).and_then(Value::as_str).map(str::to_owned),
        };
    }

    let in_reply_to_event_id = content
        .get("m.relates_to")
        .and_then(|r| r.get("m.in_reply_to"))
        .and_then(|r| r.get("event_id"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    ChatEvent {
        room_id: room_id.to_owned(),
        event_id: raw.event_id,
        sender: raw.sender,
        event_type: raw.event_type,
        body: content.get("body").and_then(Value::as_str).map(str::to_owned),
        mxc_url: content.get("url").and_then(Value::as_str).map(str::to_owned),
        mimetype: content
            .get("info")
            .and_then(|info| info.get("mimetype"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        in_reply_to_event_id,
        reaction_related_event_id: None,
        reaction_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encodes_matrix_ids() {
        assert_eq!(percent_encode("!abc:example.org"), "%21abc%3Aexample.org");
    }

    #[test]
    fn parses_mxc_url() {
        assert_eq!(parse_mxc("mxc://example.org/abc123"), Some(("example.org", "abc123")));
        assert_eq!(parse_mxc("https://example.org/abc123"), None);
    }
}
