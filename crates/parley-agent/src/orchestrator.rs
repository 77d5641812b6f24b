//! Agent orchestrator: the single controller behind the UI.
//!
//! Owns the conversation, admits one query at a time, runs the retrieval
//! pipeline, hands answers to the voice arbiter, and drives the activity
//! state the avatar renders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use parley_core::{ActivityState, AvatarView, Message, ParleyConfig};
use parley_rag::{PipelineError, RagPipeline};
use parley_voice::{VoiceArbiter, VoiceError};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::error::AgentError;
use crate::events::AgentEvent;
use crate::state::ActivityMachine;
use crate::ticket::{QueryGate, QueryTicket};

const EVENT_CAPACITY: usize = 256;

/// Orchestrator tunables, usually taken from `[agent]` and `[generation]`.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_input_chars: usize,
    pub happy_hold: Duration,
    pub confused_hold: Duration,
    pub capture_error_hold: Duration,
    pub loading_text: String,
    pub apology_text: String,
    /// Use streamed generation and publish [`AgentEvent::Chunk`]s.
    pub stream: bool,
}

impl AgentSettings {
    pub fn from_config(config: &ParleyConfig) -> Self {
        let agent = &config.agent;
        Self {
            max_input_chars: agent.max_input_chars,
            happy_hold: Duration::from_millis(agent.happy_hold_ms),
            confused_hold: Duration::from_millis(agent.confused_hold_ms),
            capture_error_hold: Duration::from_millis(agent.capture_error_hold_ms),
            loading_text: agent.loading_text.clone(),
            apology_text: agent.apology_text.clone(),
            stream: config.generation.stream,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&ParleyConfig::default())
    }
}

/// How an accepted turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered { text: String, spoken: bool },
    /// The apology was shown instead of an answer.
    Failed { reason: String },
}

/// How a voice capture ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// The transcript was submitted as a query.
    Turn {
        transcript: String,
        outcome: TurnOutcome,
    },
    /// Nothing was heard, or the capture was stopped early.
    Cancelled,
}

/// Top-level controller wiring user input to the pipeline and the voice
/// arbiter.
pub struct AgentOrchestrator {
    pipeline: Arc<RagPipeline>,
    voice: Option<Arc<VoiceArbiter>>,
    settings: AgentSettings,
    voice_enabled: AtomicBool,
    conversation: Mutex<Conversation>,
    gate: Arc<QueryGate>,
    machine: ActivityMachine,
    events: broadcast::Sender<AgentEvent>,
    shut_down: AtomicBool,
}

impl AgentOrchestrator {
    pub fn new(
        pipeline: Arc<RagPipeline>,
        voice: Option<Arc<VoiceArbiter>>,
        settings: AgentSettings,
        voice_enabled: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            voice_enabled: AtomicBool::new(voice_enabled && voice.is_some()),
            pipeline,
            voice,
            settings,
            conversation: Mutex::new(Conversation::new()),
            gate: QueryGate::new(),
            machine: ActivityMachine::new(events.clone()),
            events,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        pipeline: Arc<RagPipeline>,
        voice: Option<Arc<VoiceArbiter>>,
        config: &ParleyConfig,
    ) -> Self {
        Self::new(
            pipeline,
            voice,
            AgentSettings::from_config(config),
            config.voice.enabled,
        )
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Run one typed query to completion.
    ///
    /// Rejections (`EmptyQuery`, `QueryTooLong`, `Busy`) leave the
    /// conversation untouched. A failed pipeline is not an error here: the
    /// turn ends with the apology and [`TurnOutcome::Failed`].
    pub async fn submit_query(&self, text: &str) -> Result<TurnOutcome, AgentError> {
        let query = self.validate(text)?;

        let listening = self.voice.as_ref().is_some_and(|v| v.is_listening());
        let ticket = match self.gate.try_acquire() {
            Some(ticket) if !listening => ticket,
            _ => return Err(self.busy()),
        };

        Ok(self.run_turn(&query, ticket).await)
    }

    fn validate(&self, text: &str) -> Result<String, AgentError> {
        let query = text.trim();
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }
        if query.chars().count() > self.settings.max_input_chars {
            return Err(AgentError::QueryTooLong(self.settings.max_input_chars));
        }
        Ok(query.to_string())
    }

    fn busy(&self) -> AgentError {
        let err = AgentError::Busy;
        self.notice(err.to_string());
        err
    }

    /// Everything after admission. The ticket is released when this returns.
    async fn run_turn(&self, query: &str, _ticket: QueryTicket) -> TurnOutcome {
        info!(query_len = query.len(), "Turn started");
        self.append(Message::user(query));
        let placeholder = self.append(Message::loading(&self.settings.loading_text));
        self.enter(ActivityState::Thinking);

        let result = self.run_pipeline(query).await;
        self.remove_loading(placeholder.id);

        match result {
            Ok(text) => {
                self.append(Message::agent(text.clone()));
                let spoken = self.narrate(&text).await;
                self.enter(ActivityState::Happy);
                self.machine.hold_then_idle(self.settings.happy_hold);
                info!(answer_len = text.len(), spoken, "Turn answered");
                TurnOutcome::Answered { text, spoken }
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                self.append(Message::agent(self.settings.apology_text.clone()));
                self.enter(ActivityState::Confused);
                self.machine.hold_then_idle(self.settings.confused_hold);
                TurnOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_pipeline(&self, query: &str) -> Result<String, PipelineError> {
        if !self.settings.stream {
            return self.pipeline.answer(query).await;
        }

        let events = &self.events;
        let mut partial = String::new();
        let result = self
            .pipeline
            .answer_streaming(query, &mut |chunk: &str| {
                partial.push_str(chunk);
                let _ = events.send(AgentEvent::Chunk(chunk.to_string()));
            })
            .await;

        match result {
            Err(e) if !partial.trim().is_empty() => {
                warn!(error = %e, partial_len = partial.len(), "Stream failed, keeping partial answer");
                Ok(partial)
            }
            other => other,
        }
    }

    /// Speak the answer if voice is on. Returns whether it was spoken.
    async fn narrate(&self, text: &str) -> bool {
        let Some(voice) = self.voice.as_ref().filter(|_| self.voice_enabled()) else {
            return false;
        };

        self.enter(ActivityState::Speaking);
        match voice.speak(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Speech failed, answer stays in the transcript");
                false
            }
        }
    }

    // =========================================================================
    // Voice
    // =========================================================================

    /// Capture one utterance and, if anything was heard, answer it.
    pub async fn start_listening(&self) -> Result<ListenOutcome, AgentError> {
        let voice = self.voice.clone().ok_or(AgentError::VoiceUnavailable)?;
        if voice.is_listening() {
            let err = VoiceError::Busy;
            self.notice(err.to_string());
            return Err(err.into());
        }
        let Some(ticket) = self.gate.try_acquire() else {
            return Err(self.busy());
        };

        self.enter(ActivityState::Listening);
        info!("Listening for voice input");

        match voice.start_listening().await {
            Ok(transcript) => {
                let transcript = transcript.trim().to_string();
                if transcript.is_empty() {
                    info!("Capture ended without a transcript");
                    self.enter(ActivityState::Idle);
                    return Ok(ListenOutcome::Cancelled);
                }
                let query = self.clamp_transcript(&transcript);
                let outcome = self.run_turn(&query, ticket).await;
                Ok(ListenOutcome::Turn {
                    transcript,
                    outcome,
                })
            }
            Err(e) => {
                warn!(error = %e, "Voice capture failed");
                self.enter(ActivityState::Confused);
                self.machine.hold_then_idle(self.settings.capture_error_hold);
                self.notice(format!("Voice input failed: {e}"));
                Err(e.into())
            }
        }
    }

    fn clamp_transcript(&self, transcript: &str) -> String {
        let max = self.settings.max_input_chars;
        if transcript.chars().count() <= max {
            return transcript.to_string();
        }
        warn!(max, "Transcript exceeds input limit, truncating");
        transcript.chars().take(max).collect()
    }

    /// End the current capture early and return what was heard.
    pub async fn stop_listening(&self) -> String {
        match &self.voice {
            Some(voice) => voice.stop_listening().await,
            None => String::new(),
        }
    }

    pub async fn stop_speaking(&self) {
        if let Some(voice) = &self.voice {
            voice.stop_speaking().await;
        }
    }

    /// Voices the synthesizer offers; empty without a voice arbiter.
    pub async fn available_voices(&self) -> Vec<String> {
        match &self.voice {
            Some(voice) => voice.available_voices().await,
            None => Vec::new(),
        }
    }

    /// Turn narration on or off. Has no effect without a voice arbiter.
    pub fn set_voice_enabled(&self, enabled: bool) {
        let enabled = enabled && self.voice.is_some();
        self.voice_enabled.store(enabled, Ordering::Release);
        info!(enabled, "Voice narration toggled");
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::Acquire)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn activity_state(&self) -> ActivityState {
        self.machine.current()
    }

    pub fn avatar(&self) -> AvatarView {
        self.machine.avatar()
    }

    /// Snapshot of the conversation.
    pub fn messages(&self) -> Vec<Message> {
        self.conversation().messages().to_vec()
    }

    pub fn subscribe_avatar(&self) -> watch::Receiver<AvatarView> {
        self.machine.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Cancel the pending hold and release the voice devices. Only the first
    /// call does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.machine.reset();
        if let Some(voice) = &self.voice {
            voice.cleanup().await;
        }
        info!("Orchestrator shut down");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn conversation(&self) -> MutexGuard<'_, Conversation> {
        self.conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, message: Message) -> Message {
        let message = self.conversation().append(message);
        let _ = self.events.send(AgentEvent::MessageAppended(message.clone()));
        message
    }

    fn remove_loading(&self, id: Uuid) {
        if self.conversation().remove_loading(id) {
            let _ = self.events.send(AgentEvent::MessageRemoved(id));
        }
    }

    fn enter(&self, target: ActivityState) {
        if let Err(e) = self.machine.transition(target) {
            warn!(error = %e, "Activity transition rejected");
        }
    }

    fn notice(&self, text: String) {
        info!(notice = %text, "Notice");
        let _ = self.events.send(AgentEvent::Notice(text));
    }
}

// =============================================================================
// Tests
// =============================================================================
