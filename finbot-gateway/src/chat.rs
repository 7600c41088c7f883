//! Chat turn orchestration.
//!
//! A turn resolves (or creates) the session, ranks the glossary against the
//! message, records the user turn, asks the provider for a reply, attaches
//! it and finally prunes the store if it has grown past its ceiling.

use crate::glossary::Glossary;
use crate::prompt::build_prompt;
use crate::provider::{ChatRequest, Provider};
use crate::ranking::top_entries;
use crate::session::{FeedbackKind, SessionHandle, SessionStore};
use finbot_common::config::{Config, SessionConfig};
use finbot_common::error::{Error, Result};
use finbot_common::util::sanitize_for_log;
use std::sync::Arc;
use std::time::Instant;

/// Knobs the chat flow reads on every turn.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub history_window: usize,
    pub max_sessions: usize,
    pub evict_batch: usize,
}

impl ChatSettings {
    pub fn new(model: impl Into<String>, session: &SessionConfig) -> Self {
        Self {
            model: model.into(),
            history_window: session.history_window,
            max_sessions: session.max_sessions,
            evict_batch: session.evict_batch,
        }
    }
}

impl From<&Config> for ChatSettings {
    fn from(config: &Config) -> Self {
        Self::new(config.llm.model.clone(), &config.session)
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub session_id: String,
    pub response: String,
    pub relevant_terms: Vec<String>,
}

/// A failed turn. Carries the session id once one has been resolved so the
/// client can keep using it.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct ChatError {
    pub session_id: Option<String>,
    #[source]
    pub source: Error,
}

impl ChatError {
    fn new(source: Error, session_id: Option<String>) -> Self {
        Self { session_id, source }
    }
}

/// Runs chat turns and records feedback against a shared store.
pub struct ChatService {
    store: Arc<SessionStore>,
    glossary: Arc<Glossary>,
    provider: Arc<dyn Provider>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<SessionStore>,
        glossary: Arc<Glossary>,
        provider: Arc<dyn Provider>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            glossary,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn glossary(&self) -> &Glossary {
        &self.glossary
    }

    /// Run one chat turn.
    ///
    /// The session's lock is held from appending the user turn until the
    /// reply is attached, so turns on one session never interleave. A failed
    /// completion leaves the user turn in place without a reply. The store is
    /// pruned once a session was resolved, whether or not the turn succeeded.
    pub async fn chat(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> std::result::Result<ChatOutcome, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::new(
                Error::InvalidInput("Message is required".into()),
                None,
            ));
        }

        let (handle, session_id) = self
            .store
            .get_or_create(session_id)
            .await
            .map_err(|e| ChatError::new(e, None))?;

        let turn = self.run_turn(&handle, &session_id, message).await;

        self.store
            .prune_if_oversized(self.settings.max_sessions, self.settings.evict_batch)
            .await;

        match turn {
            Ok((response, relevant_terms)) => Ok(ChatOutcome {
                session_id,
                response,
                relevant_terms,
            }),
            Err(e) => Err(ChatError::new(e, Some(session_id))),
        }
    }

    /// Append, complete and attach under the session lock. Returns the reply
    /// and the glossary terms used in the prompt.
    async fn run_turn(
        &self,
        handle: &SessionHandle,
        session_id: &str,
        message: &str,
    ) -> Result<(String, Vec<String>)> {
        let entries = top_entries(message, &self.glossary);
        let relevant_terms: Vec<String> = entries.iter().map(|e| e.term.clone()).collect();

        let mut session = handle.lock().await;
        let turn_index = session.append_user_turn(message);
        let prompt = build_prompt(
            session.recent_history(self.settings.history_window),
            message,
            &entries,
        );

        tracing::debug!(
            session_id = %session_id,
            turn_index,
            relevant_terms = ?relevant_terms,
            prompt_chars = prompt.chars().count(),
            "Prompt assembled"
        );

        let start = Instant::now();
        let request = ChatRequest::single(self.settings.model.clone(), prompt);
        let response = self.provider.chat(request).await.map_err(|e| {
            let message = sanitize_for_log(&e.to_string());
            tracing::error!(
                session_id = %session_id,
                turn_index,
                status = ?e.status_code,
                timed_out = e.timeout.is_some(),
                error = %message,
                "Completion failed"
            );
            match e.timeout {
                Some(after) => Error::Timeout(after.as_secs_f64().ceil() as u64),
                None => Error::Upstream(message),
            }
        })?;

        if let Err(e) = session.attach_reply(turn_index, response.content.as_str()) {
            tracing::error!(session_id = %session_id, turn_index, error = %e, "Reply not attached");
            return Err(e);
        }
        drop(session);

        tracing::info!(
            session_id = %session_id,
            turn_index,
            provider = %response.provider,
            latency_ms = start.elapsed().as_millis() as u64,
            output_tokens = response.usage.output_tokens,
            "Chat turn completed"
        );

        Ok((response.content, relevant_terms))
    }

    /// Record a feedback vote. Fails with `NotFound` for unknown sessions.
    pub async fn feedback(
        &self,
        session_id: &str,
        kind: FeedbackKind,
        message_index: usize,
        text: &str,
    ) -> Result<()> {
        self.store
            .add_feedback(session_id, message_index, kind, text)
            .await?;

        tracing::info!(
            session_id = %session_id,
            kind = kind.as_str(),
            message_index,
            "Feedback recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Echoes a canned reply and remembers every prompt it was sent.
    struct RecordingProvider {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
        delay: Duration,
        timed_out: bool,
    }

    impl RecordingProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                timed_out: false,
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
                delay: Duration::ZERO,
                timed_out: false,
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        async fn chat(
            &self,
            request: ChatRequest,
        ) -> std::result::Result<ChatResponse, ProviderError> {
            let prompt = request.messages[0].content.clone();
            self.prompts.lock().unwrap().push(prompt);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if self.timed_out {
                return Err(ProviderError::timed_out(
                    "recording",
                    request.model,
                    Duration::from_secs(30),
                ));
            }

            match &self.reply {
                Some(reply) => Ok(ChatResponse {
                    provider: "recording".into(),
                    model: request.model,
                    content: reply.clone(),
                    usage: Default::default(),
                    finish_reason: Some("STOP".into()),
                    latency_ms: 1,
                }),
                None => Err(ProviderError::new(
                    "recording",
                    request.model,
                    "upstream unavailable",
                    Some(503),
                )),
            }
        }
    }

    fn settings(max_sessions: usize, evict_batch: usize) -> ChatSettings {
        ChatSettings {
            model: "gemini-2.0-flash".into(),
            history_window: 5,
            max_sessions,
            evict_batch,
        }
    }

    fn service(provider: Arc<RecordingProvider>, settings: ChatSettings) -> ChatService {
        ChatService::new(
            Arc::new(SessionStore::new()),
            Arc::new(Glossary::builtin()),
            provider,
            settings,
        )
    }

    #[tokio::test]
    async fn first_turn_creates_session_and_attaches_reply() {
        let provider = Arc::new(RecordingProvider::replying("A budget is a plan."));
        let svc = service(Arc::clone(&provider), settings(1000, 100));

        let outcome = svc.chat("What is a budget?", None).await.unwrap();
        assert_eq!(outcome.response, "A budget is a plan.");
        assert_eq!(outcome.relevant_terms.first().map(String::as_str), Some("budget"));

        let session = svc.store().snapshot(&outcome.session_id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].bot.as_deref(), Some("A budget is a plan."));

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("User: What is a budget?"));
        assert!(prompt.contains("Query: What is a budget?"));
        assert!(prompt.contains("- budget: A plan for your money"));
    }

    #[tokio::test]
    async fn follow_up_turn_sees_history() {
        let provider = Arc::new(RecordingProvider::replying("Sure."));
        let svc = service(Arc::clone(&provider), settings(1000, 100));

        let first = svc.chat("Tell me about stocks", None).await.unwrap();
        let second = svc
            .chat("And bonds?", Some(&first.session_id))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);

        let prompt = &provider.prompts()[1];
        assert!(prompt.contains(
            "User: Tell me about stocks\nFinBot: Sure.\nUser: And bonds?"
        ));
    }

    #[tokio::test]
    async fn history_is_limited_to_window() {
        let provider = Arc::new(RecordingProvider::replying("ok"));
        let svc = service(Arc::clone(&provider), settings(1000, 100));

        let id = svc.chat("turn 0", None).await.unwrap().session_id;
        for i in 1..7 {
            svc.chat(&format!("turn {i}"), Some(&id)).await.unwrap();
        }

        let last = provider.prompts().pop().unwrap();
        assert!(!last.contains("User: turn 1\n"));
        assert!(last.contains("User: turn 2\n"));
        assert!(last.contains("User: turn 6"));
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_side_effects() {
        let provider = Arc::new(RecordingProvider::replying("unused"));
        let svc = service(Arc::clone(&provider), settings(1000, 100));

        for message in ["", "   ", "\n\t"] {
            let err = svc.chat(message, None).await.unwrap_err();
            assert!(matches!(err.source, Error::InvalidInput(_)));
            assert!(err.session_id.is_none());
        }
        assert!(svc.store().is_empty().await);
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_keeps_unanswered_turn() {
        let provider = Arc::new(RecordingProvider::failing());
        let svc = service(provider, settings(1000, 100));

        let err = svc.chat("What is debt?", None).await.unwrap_err();
        assert!(err.source.is_upstream());
        let id = err.session_id.expect("session id is reported");

        let session = svc.store().snapshot(&id).await.unwrap();
        assert_eq!(session.turns.len(), 1);
        assert!(session.turns[0].bot.is_none());
    }

    #[tokio::test]
    async fn timed_out_completion_reports_timeout() {
        let provider = Arc::new(RecordingProvider {
            timed_out: true,
            ..RecordingProvider::failing()
        });
        let svc = service(provider, settings(1000, 100));

        let err = svc.chat("What is credit?", None).await.unwrap_err();
        assert!(matches!(err.source, Error::Timeout(30)));
        assert!(err.session_id.is_some());
    }

    #[tokio::test]
    async fn failed_turns_still_bound_store() {
        let provider = Arc::new(RecordingProvider::failing());
        let svc = service(provider, settings(4, 2));

        let mut last = None;
        for i in 0..20 {
            let err = svc.chat(&format!("question {i}"), None).await.unwrap_err();
            assert!(svc.store().len().await <= 4);
            last = err.session_id;
        }

        let last = last.expect("session id is reported");
        assert!(svc.store().contains(&last).await);
        assert!(svc.store().len().await <= 4);
    }

    #[tokio::test]
    async fn unknown_session_id_starts_fresh() {
        let provider = Arc::new(RecordingProvider::replying("hi"));
        let svc = service(provider, settings(1000, 100));

        let outcome = svc.chat("hello there", Some("stale-id")).await.unwrap();
        assert_ne!(outcome.session_id, "stale-id");
    }

    #[tokio::test]
    async fn store_is_pruned_after_reply() {
        let provider = Arc::new(RecordingProvider::replying("ok"));
        let svc = service(provider, settings(4, 2));

        let mut ids = Vec::new();
        for i in 0..5 {
            let outcome = svc.chat(&format!("question {i}"), None).await.unwrap();
            ids.push(outcome.session_id);
        }

        assert_eq!(svc.store().len().await, 2);
        assert!(svc.store().contains(&ids[4]).await);
        assert!(!svc.store().contains(&ids[0]).await);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_session_do_not_interleave() {
        let provider = Arc::new(RecordingProvider {
            delay: Duration::from_millis(20),
            ..RecordingProvider::replying("done")
        });
        let svc = Arc::new(service(Arc::clone(&provider), settings(1000, 100)));
        let id = svc.chat("first", None).await.unwrap().session_id;

        let mut tasks = Vec::new();
        for i in 0..4 {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                svc.chat(&format!("parallel {i}"), Some(&id)).await.unwrap()
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let session = svc.store().snapshot(&id).await.unwrap();
        assert_eq!(session.turns.len(), 5);
        assert!(session.turns.iter().all(|t| t.bot.as_deref() == Some("done")));

        // Every prompt saw all earlier turns answered.
        for prompt in provider.prompts() {
            let user_lines = prompt.matches("\nUser: ").count();
            let bot_lines = prompt.matches("\nFinBot: ").count();
            assert_eq!(user_lines, bot_lines + 1, "prompt: {prompt}");
        }
    }

    #[tokio::test]
    async fn feedback_records_and_rejects_unknown() {
        let provider = Arc::new(RecordingProvider::replying("ok"));
        let svc = service(provider, settings(1000, 100));
        let id = svc.chat("hello friend", None).await.unwrap().session_id;

        svc.feedback(&id, FeedbackKind::Positive, 1, "").await.unwrap();
        let err = svc
            .feedback("nope", FeedbackKind::Negative, 0, "")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let session = svc.store().snapshot(&id).await.unwrap();
        assert_eq!(session.feedback.len(), 1);
        assert_eq!(session.feedback[0].message_index, 1);
    }
}
