use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation::Conversation;
use super::events::{SessionEvent, SessionOutcome};
use super::state::SessionState;
use super::transcript::{Annotation, Transcript};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::protocol::{
    ChatRequest, FrameDecoder, Message, Role, StreamFrame, ToolCallRequest,
};
use crate::registry::ToolRegistry;
use crate::transport::Transport;

const EVENT_CAPACITY: usize = 256;

/// Drives one conversation against a backend.
///
/// Cloning yields another handle to the same session. At most one submission is in
/// flight; it runs on its own task and can be cancelled from any handle.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Arc<ToolRegistry>,
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: SessionState,
    conversation: Conversation,
    transcript: Transcript,
    /// Bumped on every submit and cancel; a task only writes while its generation is current
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Awaitable result of one `submit`
pub struct SubmissionHandle {
    join: JoinHandle<SessionOutcome>,
}

impl SubmissionHandle {
    pub async fn wait(self) -> Result<SessionOutcome, SessionError> {
        self.join
            .await
            .map_err(|e| SessionError::Join(e.to_string()))
    }
}

/// Whether the read loop keeps going after a frame
enum Flow {
    Continue,
    Stop(SessionOutcome),
}

impl Session {
    pub fn new(
        registry: Arc<ToolRegistry>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        Self::resume(registry, transport, config, Conversation::new())
    }

    /// Continue an existing conversation. Its history is only ever appended to.
    pub fn resume(
        registry: Arc<ToolRegistry>,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        conversation: Conversation,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                registry,
                transport,
                config,
                events,
                inner: Mutex::new(Inner {
                    state: SessionState::Idle,
                    conversation,
                    transcript: Transcript::default(),
                    generation: 0,
                    cancel: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> String {
        self.shared.lock().conversation.id.clone()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn conversation(&self) -> Conversation {
        self.shared.lock().conversation.clone()
    }

    pub fn transcript(&self) -> Transcript {
        self.shared.lock().transcript.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn submit_text(&self, text: &str) -> Result<SubmissionHandle, SessionError> {
        self.submit(Message::user(text))
    }

    /// Start a submission with `message` as the new user turn.
    ///
    /// Rejected with `Busy` unless the session is idle or finished. The message is
    /// staged, not appended: it reaches the conversation only when the submission
    /// completes or fails.
    pub fn submit(&self, message: Message) -> Result<SubmissionHandle, SessionError> {
        if message.role != Role::User {
            return Err(SessionError::NotAUserMessage(message.role));
        }

        let (generation, token, history) = {
            let mut inner = self.shared.lock();
            if !inner.state.accepts_submission() {
                return Err(SessionError::Busy(inner.state));
            }
            inner.generation += 1;
            let token = CancellationToken::new();
            inner.cancel = Some(token.clone());
            inner.transcript = Transcript::default();
            self.shared.transition(&mut inner, SessionState::AwaitingFirstByte);

            let mut history = inner.conversation.messages().to_vec();
            history.push(message.clone());
            (inner.generation, token, history)
        };

        info!(
            session = %self.id(),
            generation,
            history = history.len(),
            "Submitting user message"
        );

        let shared = Arc::clone(&self.shared);
        let join = tokio::spawn(async move {
            Submission {
                shared,
                generation,
                token,
                staged: message,
            }
            .run(history)
            .await
        });
        Ok(SubmissionHandle { join })
    }

    /// Abort the in-flight submission, if any.
    ///
    /// Returns to `Idle` immediately with the conversation exactly as it was before
    /// the submission; partial assistant text is discarded.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.state.accepts_submission() {
            return false;
        }
        if let Some(token) = inner.cancel.take() {
            token.cancel();
        }
        inner.generation += 1;
        inner.transcript = Transcript::default();
        self.shared.transition(&mut inner, SessionState::Idle);
        info!(generation = inner.generation, "Submission cancelled");
        true
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) {
        let from = inner.state;
        if from == to {
            return;
        }
        debug!(%from, %to, "Session state change");
        inner.state = to;
        self.emit(SessionEvent::StateChanged { from, to });
    }
}

/// One submission's task: opens rounds, applies frames, dispatches tools
struct Submission {
    shared: Arc<Shared>,
    generation: u64,
    token: CancellationToken,
    staged: Message,
}

impl Submission {
    /// Run `f` against session state only if this submission is still current
    fn with_current<R>(&self, f: impl FnOnce(&Shared, &mut Inner) -> R) -> Option<R> {
        let mut inner = self.shared.lock();
        if inner.generation != self.generation {
            return None;
        }
        Some(f(&self.shared, &mut inner))
    }

    fn set_state(&self, to: SessionState) -> bool {
        self.with_current(|shared, inner| shared.transition(inner, to)).is_some()
    }

    async fn run(self, history: Vec<Message>) -> SessionOutcome {
        let model = self.shared.config.model.clone();
        let max_rounds = self.shared.config.max_rounds;
        let tools = self.shared.registry.schemas();
        let mut request = ChatRequest::initial(model.clone(), history, tools);
        let mut round = 1;

        loop {
            info!(
                round,
                transport = self.shared.transport.name(),
                tools = request.advertises_tools(),
                "Opening round"
            );

            let tool_results = match self.run_round(&request).await {
                Ok(results) => results,
                Err(outcome) => return outcome,
            };

            if tool_results.is_empty() {
                return self.complete();
            }
            if round >= max_rounds {
                return self.fail(format!("tool loop exceeded {max_rounds} request rounds"));
            }

            round += 1;
            request = ChatRequest::follow_up(model.clone(), tool_results);
            if !self.set_state(SessionState::AwaitingFirstByte) {
                return SessionOutcome::Cancelled;
            }
        }
    }

    /// Stream one response to its end. Returns the queued tool results.
    async fn run_round(&self, request: &ChatRequest) -> Result<Vec<Message>, SessionOutcome> {
        let opened = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(SessionOutcome::Cancelled),
            opened = self.shared.transport.open(request) => opened,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(e) => return Err(self.fail(format!("transport failure: {e}"))),
        };

        let mut decoder = FrameDecoder::new(self.shared.config.mode);
        let mut tool_results = Vec::new();
        let mut first_chunk = true;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(SessionOutcome::Cancelled),
                next = body.next() => next,
            };
            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return Err(self.fail(format!("transport failure: {e}"))),
                None => break,
            };
            if first_chunk {
                first_chunk = false;
                if !self.set_state(SessionState::Streaming) {
                    return Err(SessionOutcome::Cancelled);
                }
            }
            for frame in decoder.feed(&bytes) {
                if let Flow::Stop(outcome) = self.apply(frame, &mut tool_results).await {
                    return Err(outcome);
                }
            }
        }
        drop(body);

        for frame in decoder.finish() {
            if let Flow::Stop(outcome) = self.apply(frame, &mut tool_results).await {
                return Err(outcome);
            }
        }
        Ok(tool_results)
    }

    async fn apply(&self, frame: StreamFrame, tool_results: &mut Vec<Message>) -> Flow {
        match frame {
            StreamFrame::Message { content, .. } => {
                let applied = self.with_current(|shared, inner| {
                    inner.transcript.push_text(&content);
                    shared.emit(SessionEvent::TextDelta { text: content });
                });
                match applied {
                    Some(()) => Flow::Continue,
                    None => Flow::Stop(SessionOutcome::Cancelled),
                }
            }
            StreamFrame::Error { error, .. } if !error.is_terminal() => {
                warn!(%error, "Skipping undecodable frame");
                if self.annotate(Annotation::warning(error.to_string())) {
                    Flow::Continue
                } else {
                    Flow::Stop(SessionOutcome::Cancelled)
                }
            }
            StreamFrame::Error { error, .. } => {
                Flow::Stop(self.fail(format!("backend error: {error}")))
            }
            StreamFrame::ToolCalls { calls, .. } => self.dispatch(calls, tool_results).await,
        }
    }

    async fn dispatch(
        &self,
        calls: Vec<ToolCallRequest>,
        tool_results: &mut Vec<Message>,
    ) -> Flow {
        if !self.set_state(SessionState::DispatchingTool) {
            return Flow::Stop(SessionOutcome::Cancelled);
        }

        for call in &calls {
            let announced = self.with_current(|shared, _| {
                shared.emit(SessionEvent::ToolInvoked {
                    name: call.name.clone(),
                })
            });
            if announced.is_none() {
                return Flow::Stop(SessionOutcome::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Flow::Stop(SessionOutcome::Cancelled),
                result = self.shared.registry.invoke(call) => result,
            };

            match result {
                Ok(output) => {
                    debug!(tool = %call.name, bytes = output.len(), "Tool result queued");
                    tool_results.push(Message::tool_result(&output));
                }
                // Unknown tools and executor failures both end the submission
                Err(err) => return Flow::Stop(self.fail(err.to_string())),
            }
        }

        if self.set_state(SessionState::AwaitingFollowup) {
            Flow::Continue
        } else {
            Flow::Stop(SessionOutcome::Cancelled)
        }
    }

    fn annotate(&self, annotation: Annotation) -> bool {
        self.with_current(|shared, inner| {
            inner.transcript.annotate(annotation.clone());
            shared.emit(SessionEvent::Annotated { annotation });
        })
        .is_some()
    }

    /// Terminal failure: mark the transcript and keep the user's message in history
    fn fail(&self, reason: String) -> SessionOutcome {
        warn!(generation = self.generation, %reason, "Submission failed");
        let failed = self.with_current(|shared, inner| {
            let annotation = Annotation::error(reason.clone());
            inner.transcript.annotate(annotation.clone());
            shared.emit(SessionEvent::Annotated { annotation });
            inner.conversation.append(self.staged.clone());
            inner.cancel = None;
            shared.transition(inner, SessionState::Failed);
        });
        match failed {
            Some(()) => SessionOutcome::Failed { reason },
            None => SessionOutcome::Cancelled,
        }
    }

    fn complete(&self) -> SessionOutcome {
        let completed = self.with_current(|shared, inner| {
            let text = inner.transcript.text().to_string();
            inner.conversation.append(self.staged.clone());
            inner.conversation.append(Message::assistant(&text));
            inner.cancel = None;
            shared.transition(inner, SessionState::Completed);
            text
        });
        match completed {
            Some(text) => {
                info!(generation = self.generation, chars = text.len(), "Submission completed");
                SessionOutcome::Completed { text }
            }
            None => SessionOutcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Fixture, ReplayTransport, RoundRecord};

    fn lines(chunks: &[&str]) -> RoundRecord {
        RoundRecord::chunks(chunks.iter().copied())
    }

    fn session(fixture: Fixture) -> (Session, Arc<ReplayTransport>) {
        let transport = Arc::new(ReplayTransport::new(fixture));
        let config = SessionConfig::default().with_mode(crate::protocol::WireMode::Lines);
        let session = Session::new(Arc::new(ToolRegistry::new()), transport.clone(), config);
        (session, transport)
    }

    #[tokio::test]
    async fn test_rejects_non_user_message() {
        let (session, _) = session(Fixture::new());
        let err = session.submit(Message::assistant("hi")).err().unwrap();
        assert!(matches!(err, SessionError::NotAUserMessage(Role::Assistant)));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_events_follow_state_machine() {
        let (session, _) = session(Fixture::new().with_round(lines(&[
            "{\"response\":\"Hi\"}\n",
            "{\"response\":\" there\"}\n",
        ])));
        let mut events = session.subscribe();

        let outcome = session.submit_text("hello").unwrap().wait().await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed { text: "Hi there".into() });

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                SessionEvent::StateChanged {
                    from: SessionState::Idle,
                    to: SessionState::AwaitingFirstByte
                },
                SessionEvent::StateChanged {
                    from: SessionState::AwaitingFirstByte,
                    to: SessionState::Streaming
                },
                SessionEvent::TextDelta { text: "Hi".into() },
                SessionEvent::TextDelta { text: " there".into() },
                SessionEvent::StateChanged {
                    from: SessionState::Streaming,
                    to: SessionState::Completed
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_error_fails_and_keeps_user_message() {
        let (session, _) = session(Fixture::new().with_round(lines(&[
            "{\"response\":\"partial\"}\n",
            "{\"error\":\"model not found\"}\n",
        ])));

        let outcome = session.submit_text("hello").unwrap().wait().await.unwrap();
        let SessionOutcome::Failed { reason } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(reason.contains("model not found"));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.transcript().has_error());

        let conversation = session.conversation();
        assert_eq!(conversation.messages(), &[Message::user("hello")]);
    }

    #[tokio::test]
    async fn test_can_submit_again_after_completion() {
        let (session, transport) = session(
            Fixture::new()
                .with_round(lines(&["{\"response\":\"one\"}\n"]))
                .with_round(lines(&["{\"response\":\"two\"}\n"])),
        );

        session.submit_text("a").unwrap().wait().await.unwrap();
        let outcome = session.submit_text("b").unwrap().wait().await.unwrap();
        assert_eq!(outcome, SessionOutcome::Completed { text: "two".into() });

        // second request carries the whole history
        let second = &transport.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(session.conversation().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let (session, _) = session(Fixture::new());
        assert!(!session.cancel());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
