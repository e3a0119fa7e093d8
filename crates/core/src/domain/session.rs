use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductName;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "Usuário",
            Self::Assistant => "Assistente",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

/// Conversation state for one session id. History is append-only and oldest-first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub history: Vec<Turn>,
    pub last_product: Option<ProductName>,
    /// Size of the last code list shown, used as an advisory signal only.
    pub last_code_count: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: Vec::new(),
            last_product: None,
            last_code_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    /// Number of completed user/assistant exchanges.
    pub fn exchange_count(&self) -> usize {
        self.history.iter().filter(|turn| turn.speaker == Speaker::User).count()
    }

    pub fn record_exchange(&mut self, utterance: impl Into<String>, reply: impl Into<String>) {
        self.history.push(Turn { speaker: Speaker::User, text: utterance.into() });
        self.history.push(Turn { speaker: Speaker::Assistant, text: reply.into() });
        self.updated_at = Utc::now();
    }

    /// Renders history as `Usuário: ...` / `Assistente: ...` lines for prompt context.
    pub fn transcript(&self, max_turns: usize) -> String {
        let skip = self.history.len().saturating_sub(max_turns);
        self.history
            .iter()
            .skip(skip)
            .map(|turn| format!("{}: {}", turn.speaker.label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionId, Speaker};

    #[test]
    fn exchanges_append_in_order() {
        let mut session = Session::new(SessionId("s-1".to_string()));
        session.record_exchange("oi", "olá");
        session.record_exchange("quantos parafusos tenho", "Você tem 3 unidades");

        assert_eq!(session.history.len(), 4);
        assert_eq!(session.history[0].speaker, Speaker::User);
        assert_eq!(session.history[3].speaker, Speaker::Assistant);
        assert_eq!(session.exchange_count(), 2);
    }

    #[test]
    fn transcript_keeps_most_recent_turns() {
        let mut session = Session::new(SessionId("s-2".to_string()));
        session.record_exchange("primeira", "r1");
        session.record_exchange("segunda", "r2");

        let transcript = session.transcript(2);
        assert_eq!(transcript, "Usuário: segunda\nAssistente: r2");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
