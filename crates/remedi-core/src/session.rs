//! Per-session conversation state: bounded transcripts behind a keyed store
//! with one lock per session.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

/// Ordered conversation turns with a sliding-window bound: past `max_turns`,
/// the oldest turns are evicted from the front. Within the window, turns keep
/// their emission order and are never reordered.
#[derive(Debug)]
pub struct Transcript {
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl Transcript {
    #[must_use]
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            max_turns: max_turns.max(2),
        }
    }

    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) {
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(Turn {
            speaker,
            text: text.into(),
        });
    }

    /// Record a completed exchange. The user turn and the assistant turn are
    /// committed together so a failed request leaves the transcript unchanged.
    pub fn commit_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.append(Speaker::User, user);
        self.append(Speaker::Assistant, assistant);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Newline-joined turns terminated by the `Assistant:` marker. Read-only;
    /// calling it twice without an intervening append yields identical output.
    #[must_use]
    pub fn render(&self) -> String {
        self.render_inner(None)
    }

    /// Render as if `pending_user` had already been appended, without
    /// mutating the transcript. Used to build the generation prompt before
    /// the exchange is committed.
    #[must_use]
    pub fn render_with_pending(&self, pending_user: &str) -> String {
        self.render_inner(Some(pending_user))
    }

    fn render_inner(&self, pending_user: Option<&str>) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str(turn.speaker.label());
            out.push_str(": ");
            out.push_str(&turn.text);
            out.push('\n');
        }
        if let Some(pending) = pending_user {
            out.push_str(Speaker::User.label());
            out.push_str(": ");
            out.push_str(pending);
            out.push('\n');
        }
        out.push_str("Assistant:");
        out
    }
}

struct SessionEntry {
    transcript: Arc<Mutex<Transcript>>,
    last_used: Instant,
}

/// Keyed session store. Each session owns its transcript behind its own
/// mutex, so concurrent requests for different sessions never contend and
/// requests for the same session serialize.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    max_turns: usize,
    max_sessions: usize,
    idle_ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(max_turns: usize, max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns,
            max_sessions: max_sessions.max(1),
            idle_ttl,
        }
    }

    /// Resolve a session token to its transcript, issuing a fresh session
    /// (and token) when the token is absent or unknown.
    pub async fn resolve(&self, token: Option<&str>) -> (String, Arc<Mutex<Transcript>>) {
        let mut sessions = self.sessions.lock().await;

        if let Some(token) = token
            && let Some(entry) = sessions.get_mut(token)
        {
            entry.last_used = Instant::now();
            return (token.to_owned(), Arc::clone(&entry.transcript));
        }

        if sessions.len() >= self.max_sessions {
            Self::evict(&mut sessions, self.idle_ttl);
        }

        let token = uuid::Uuid::new_v4().to_string();
        let transcript = Arc::new(Mutex::new(Transcript::new(self.max_turns)));
        sessions.insert(
            token.clone(),
            SessionEntry {
                transcript: Arc::clone(&transcript),
                last_used: Instant::now(),
            },
        );
        (token, transcript)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drop idle sessions; if none are idle, drop the least recently used
    /// entry so the store never grows past its bound.
    fn evict(sessions: &mut HashMap<String, SessionEntry>, idle_ttl: Duration) {
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_used) < idle_ttl);

        if sessions.len() == before
            && let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(token, _)| token.clone())
        {
            sessions.remove(&oldest);
            tracing::debug!("session store full, evicted least recently used session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_empty_transcript_is_bare_marker() {
        let transcript = Transcript::new(8);
        assert_eq!(transcript.render(), "Assistant:");
    }

    #[test]
    fn render_lists_turns_in_order_with_marker() {
        let mut transcript = Transcript::new(8);
        transcript.append(Speaker::User, "Hello");
        transcript.append(Speaker::Assistant, "Hi there");
        assert_eq!(transcript.render(), "User: Hello\nAssistant: Hi there\nAssistant:");
    }

    #[test]
    fn render_is_idempotent() {
        let mut transcript = Transcript::new(8);
        transcript.append(Speaker::User, "Hello");
        assert_eq!(transcript.render(), transcript.render());
    }

    #[test]
    fn render_with_pending_does_not_mutate() {
        let mut transcript = Transcript::new(8);
        transcript.append(Speaker::User, "Hello");
        transcript.append(Speaker::Assistant, "Hi");

        let rendered = transcript.render_with_pending("And for kids?");
        assert_eq!(
            rendered,
            "User: Hello\nAssistant: Hi\nUser: And for kids?\nAssistant:"
        );
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.render(), "User: Hello\nAssistant: Hi\nAssistant:");
    }

    #[test]
    fn commit_exchange_appends_both_turns() {
        let mut transcript = Transcript::new(8);
        transcript.commit_exchange("Hello", "Hi there");
        assert_eq!(transcript.len(), 2);
        let turns: Vec<_> = transcript.turns().collect();
        assert_eq!(turns[0].speaker, Speaker::User);
        assert_eq!(turns[1].speaker, Speaker::Assistant);
    }

    #[test]
    fn window_evicts_oldest_turns() {
        let mut transcript = Transcript::new(4);
        for i in 0..4 {
            transcript.commit_exchange(format!("q{i}"), format!("a{i}"));
        }
        assert_eq!(transcript.len(), 4);
        let rendered = transcript.render();
        assert!(!rendered.contains("q0"));
        assert!(!rendered.contains("q1"));
        assert!(rendered.contains("q2"));
        assert!(rendered.contains("a3"));
    }

    #[test]
    fn window_floor_is_one_exchange() {
        let mut transcript = Transcript::new(0);
        transcript.commit_exchange("q", "a");
        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn resolve_without_token_issues_new_session() {
        let store = SessionStore::new(8, 16, Duration::from_secs(60));
        let (token, _) = store.resolve(None).await;
        assert!(!token.is_empty());
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn resolve_known_token_returns_same_transcript() {
        let store = SessionStore::new(8, 16, Duration::from_secs(60));
        let (token, transcript) = store.resolve(None).await;
        transcript.lock().await.append(Speaker::User, "Hello");

        let (token2, transcript2) = store.resolve(Some(&token)).await;
        assert_eq!(token, token2);
        assert_eq!(transcript2.lock().await.len(), 1);
        assert_eq!(store.session_count().await, 1);
    }

    #[tokio::test]
    async fn resolve_unknown_token_issues_fresh_session() {
        let store = SessionStore::new(8, 16, Duration::from_secs(60));
        let (token, _) = store.resolve(Some("no-such-token")).await;
        assert_ne!(token, "no-such-token");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = SessionStore::new(8, 16, Duration::from_secs(60));
        let (_, a) = store.resolve(None).await;
        let (_, b) = store.resolve(None).await;

        a.lock().await.append(Speaker::User, "only in a");
        assert!(b.lock().await.is_empty());
    }

    #[tokio::test]
    async fn store_stays_within_session_bound() {
        let store = SessionStore::new(8, 2, Duration::from_secs(3600));
        for _ in 0..5 {
            store.resolve(None).await;
        }
        assert!(store.session_count().await <= 2);
    }

    #[tokio::test]
    async fn eviction_prefers_idle_sessions() {
        let store = SessionStore::new(8, 2, Duration::from_millis(10));
        let (old_token, _) = store.resolve(None).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (fresh_token, _) = store.resolve(None).await;
        // Store is at capacity; the idle session is dropped for the next one
        let (_, _) = store.resolve(None).await;

        let (token_again, _) = store.resolve(Some(&fresh_token)).await;
        assert_eq!(token_again, fresh_token);
        let (token_new, _) = store.resolve(Some(&old_token)).await;
        assert_ne!(token_new, old_token);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn render_contains_every_windowed_turn_in_order(
            texts in proptest::collection::vec("[a-z]{1,8}", 1..12)
        ) {
            let mut transcript = Transcript::new(32);
            for (i, text) in texts.iter().enumerate() {
                let speaker = if i % 2 == 0 { Speaker::User } else { Speaker::Assistant };
                transcript.append(speaker, text.clone());
            }

            let rendered = transcript.render();
            prop_assert!(rendered.ends_with("Assistant:"));

            let mut pos = 0;
            for (i, text) in texts.iter().enumerate() {
                let speaker = if i % 2 == 0 { Speaker::User } else { Speaker::Assistant };
                let line = format!("{}: {}", speaker.label(), text);
                let found = rendered[pos..].find(&line);
                prop_assert!(found.is_some(), "missing line {line:?}");
                pos += found.unwrap() + line.len();
            }
        }
    }
}
