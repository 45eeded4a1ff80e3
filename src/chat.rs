//! Chat assistant sessions
//!
//! Each session keeps its own transcript and answers one question at a time.

use crate::error::TrackwiseError;
use crate::flows::{ChatTurn, FinanceChatbot, PromptAdapter};
use crate::store::FinanceSnapshot;
use crate::views::chatbot_input;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CHAT_FAILURE: &str = "Sorry, I encountered an error. Please try again.";

/// Earlier messages sent along with each question.
pub const HISTORY_WINDOW: usize = 10;

/// Messages kept per transcript; the oldest are dropped first.
pub const MAX_TRANSCRIPT_MESSAGES: usize = 200;

/// Live sessions kept before the least recently active idle one is evicted.
pub const MAX_SESSIONS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Transcript as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub in_flight: bool,
    pub messages: Vec<ChatMessage>,
}

/// Trimmed question, or a validation error when nothing is left.
pub fn validate_question(question: &str) -> Result<&str> {
    let question = question.trim();
    if question.is_empty() {
        return Err(TrackwiseError::Validation(
            "Message must not be empty.".to_string(),
        ));
    }
    Ok(question)
}

/// Clears the in-flight flag even if the caller's future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatSession {
    session_id: Uuid,
    created_at: DateTime<Utc>,
    messages: Mutex<Vec<ChatMessage>>,
    in_flight: AtomicBool,
}

impl ChatSession {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            messages: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Ask a question. A failed model call is answered with an apology
    /// rather than an error; the returned message is always the bot's.
    pub async fn send(
        &self,
        adapter: &PromptAdapter,
        snapshot: &FinanceSnapshot,
        question: &str,
    ) -> Result<ChatMessage> {
        let question = validate_question(question)?;

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TrackwiseError::ChatBusy);
        }
        let _guard = InFlight(&self.in_flight);

        let history = self.recent_turns(HISTORY_WINDOW);
        self.push(ChatMessage::new(MessageRole::User, question));

        let input = chatbot_input(snapshot, question, history);
        let reply = match adapter.run::<FinanceChatbot>(&input).await {
            Ok(output) => output.response,
            Err(e) => {
                warn!(session_id = %self.session_id, "Chat reply failed: {}", e);
                CHAT_FAILURE.to_string()
            }
        };

        let message = ChatMessage::new(MessageRole::Bot, reply);
        self.push(message.clone());
        info!(session_id = %self.session_id, "Chat question answered");

        Ok(message)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    pub fn transcript(&self) -> Transcript {
        Transcript {
            session_id: self.session_id,
            created_at: self.created_at,
            in_flight: self.is_busy(),
            messages: self.messages(),
        }
    }

    /// Time of the latest message, or creation time for an empty session.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.lock()
            .last()
            .map_or(self.created_at, |message| message.timestamp)
    }

    /// The last `count` messages, oldest first.
    fn recent_turns(&self, count: usize) -> Vec<ChatTurn> {
        let messages = self.lock();
        let start = messages.len().saturating_sub(count);
        messages[start..]
            .iter()
            .map(|m| ChatTurn {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn push(&self, message: ChatMessage) {
        let mut messages = self.lock();
        messages.push(message);

        let overflow = messages.len().saturating_sub(MAX_TRANSCRIPT_MESSAGES);
        if overflow > 0 {
            messages.drain(..overflow);
            debug!(session_id = %self.session_id, dropped = overflow, "Trimmed transcript");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All live chat sessions, keyed by id.
pub struct ChatSessions {
    sessions: RwLock<HashMap<Uuid, Arc<ChatSession>>>,
    max_sessions: usize,
}

impl Default for ChatSessions {
    fn default() -> Self {
        Self::with_limit(MAX_SESSIONS)
    }
}

impl ChatSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Existing session, or a fresh one registered under `id`.
    ///
    /// At the limit, the least recently active idle session is evicted
    /// first. Sessions with a question in flight are never evicted.
    pub async fn session(&self, id: Uuid) -> Arc<ChatSession> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Arc::clone(session);
        }

        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(&id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .values()
                .filter(|s| !s.is_busy())
                .min_by_key(|s| s.last_active())
                .map(|s| s.session_id());
            match oldest {
                Some(evicted) => {
                    sessions.remove(&evicted);
                    debug!(session_id = %evicted, "Evicted idle chat session");
                }
                None => warn!(
                    sessions = sessions.len(),
                    "Chat session limit reached with every session busy"
                ),
            }
        }

        Arc::clone(
            sessions
                .entry(id)
                .or_insert_with(|| Arc::new(ChatSession::new(id))),
        )
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<ChatSession>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn stable_uuid_from_string(input: &str) -> Uuid {
    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Session id from client text: a UUID as-is, anything else hashed to a
/// stable UUID, nothing at all gets a new one.
pub fn resolve_session_id(value: Option<&str>) -> Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v)),
        _ => Uuid::new_v4(),
    }
}
