//! External-boundary traits the state-machine services depend on, plus one
//! minimal concrete adapter per port so the engine is runnable end to end
//! without a real chat fabric or secrets manager wired in.
//!
//! Everything in this crate that talks to the outside world does so through
//! one of these seven traits. No service ever matches on a concrete adapter
//! type; construction wires `Arc<dyn Trait>` once at the binary entrypoint.

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::ServiceError;

/// A single timeline event as the chat transport's `sync` call reports it.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub room_id: String,
    pub event_id: String,
    pub sender: String,
    pub event_type: String,
    pub body: Option<String>,
    pub mxc_url: Option<String>,
    pub mimetype: Option<String>,
    pub in_reply_to_event_id: Option<String>,
    pub reaction_related_event_id: Option<String>,
    pub reaction_key: Option<String>,
}

/// One `sync` response: new timeline events across joined rooms, plus any
/// rooms the bot has been invited to (auto-accepted by the poller).
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub next_batch: String,
    pub events: Vec<ChatEvent>,
    pub invited_rooms: Vec<String>,
}

/// The chat fabric boundary (§6 "Chat transport (port)").
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn sync(&self, since: Option<&str>, timeout_ms: u64) -> Result<SyncResult, ServiceError>;
    async fn send_text(&self, room_id: &str, body: &str) -> Result<String, ServiceError>;
    async fn reply_text(&self, room_id: &str, event_id: &str, body: &str) -> Result<String, ServiceError>;
    async fn reply_file_text(
        &self,
        room_id: &str,
        event_id: &str,
        filename: &str,
        text_content: &str,
    ) -> Result<String, ServiceError>;
    async fn redact_event(&self, room_id: &str, event_id: &str) -> Result<(), ServiceError>;
    async fn download_mxc(&self, mxc_url: &str) -> Result<Vec<u8>, ServiceError>;
    async fn is_user_joined(&self, room_id: &str, user_id: &str) -> Result<bool, ServiceError>;
    async fn join_room(&self, room_id: &str) -> Result<(), ServiceError>;
}

/// Extracts clean text from a downloaded PDF's bytes.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract_text(&self, pdf_bytes: &[u8]) -> Result<String, ServiceError>;
}

/// Resolves an `mxc://` URL to raw bytes. Distinct from `ChatTransport` so a
/// deployment can route media downloads through a dedicated media server.
#[async_trait]
pub trait MxcDownloader: Send + Sync {
    async fn download(&self, mxc_url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Hashes and verifies passwords for the widget/auth admin accounts.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, ServiceError>;
    fn verify(&self, password: &str, hash: &str) -> Result<bool, ServiceError>;
}

/// Issues and hashes opaque bearer tokens for the widget API.
pub trait TokenService: Send + Sync {
    /// Generates a new random opaque token and its stored hash.
    fn issue(&self) -> (String, String);
    /// Hashes a raw presented token the same way `issue` hashed it, so the
    /// caller can look it up by hash without ever storing the raw value.
    fn hash(&self, raw_token: &str) -> String;
}

/// Whether a user is a joined member of a room, used to authorize Room-2
/// chat-based doctor decision replies.
#[async_trait]
pub trait MembershipAuthorizer: Send + Sync {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, ServiceError>;
}

/// `MembershipAuthorizer` backed directly by the chat transport's own
/// membership query. This is the only adapter most deployments need; it
/// exists as a separate port because recovery/testing wants to fake
/// membership without faking the whole transport.
pub struct TransportMembershipAuthorizer {
    transport: Arc<dyn ChatTransport>,
}

impl TransportMembershipAuthorizer {
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl MembershipAuthorizer for TransportMembershipAuthorizer {
    async fn is_member(&self, room_id: &str, user_id: &str) -> Result<bool, ServiceError> {
        self.transport.is_user_joined(room_id, user_id).await
    }
}

/// Minimal SHA-256 based `PasswordHasher`. Intentionally unsophisticated: a
/// fixed-iteration salted hash, not a tuned KDF. Good enough to keep the
/// widget admin flow honest in this port; swap for `argon2` in a real
/// deployment.
#[derive(Debug, Clone, Default)]
pub struct Sha256PasswordHasher;

impl Sha256PasswordHasher {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, ServiceError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::digest(&salt, password);
        Ok(format!("{}${}", hex::encode(salt), hex::encode(digest)))
    }

    fn verify(&self, password: &str, stored: &str) -> Result<bool, ServiceError> {
        let (salt_hex, digest_hex) = stored
            .split_once('$')
            .ok_or_else(|| ServiceError::InvalidInput("malformed password hash".to_owned()))?;
        let salt = hex::decode(salt_hex)
            .map_err(|e| ServiceError::InvalidInput(format!("malformed password hash salt: {e}")))?;
        let expected = hex::decode(digest_hex)
            .map_err(|e| ServiceError::InvalidInput(format!("malformed password hash digest: {e}")))?;
        let actual = Self::digest(&salt, password);
        Ok(actual.ct_eq(&expected).into())
    }
}

impl Sha256PasswordHasher {
    fn digest(salt: &[u8], password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }
}

/// Opaque bearer-token service: a random 32-byte token, hashed with SHA-256
/// for storage. The raw token is returned to the caller exactly once, at
/// issuance time, and never persisted.
#[derive(Debug, Clone, Default)]
pub struct Sha256TokenService;

impl Sha256TokenService {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TokenService for Sha256TokenService {
    fn issue(&self) -> (String, String) {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let raw_hex = hex::encode(raw);
        let hash = self.hash(&raw_hex);
        (raw_hex, hash)
    }

    fn hash(&self, raw_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw_token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Verifies the webhook's `X-Signature` header: HMAC-SHA256 over the raw
/// request body, hex-encoded, compared in constant time.
#[must_use]
pub fn verify_webhook_signature(secret: &str, raw_body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();
    computed.as_slice().ct_eq(&expected_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trips() {
        let hasher = Sha256PasswordHasher::new();
        let hash = hasher.hash("correct horse battery staple").unwrap();
        assert!(hasher.verify("correct horse battery staple", &hash).unwrap());
        assert!(!hasher.verify("wrong password", &hash).unwrap());
    }

    #[test]
    fn token_hash_is_deterministic_for_lookup() {
        let service = Sha256TokenService::new();
        let (raw, hash) = service.issue();
        assert_eq!(service.hash(&raw), hash);
    }

    #[test]
    fn webhook_signature_round_trips() {
        let secret = "shared-secret";
        let body = b"{\"case_id\":\"abc\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(verify_webhook_signature(secret, body, &sig));
        assert!(!verify_webhook_signature(secret, body, "deadbeef"));
    }
}
