//! Activity-state machine with timed returns to `Idle`.
//!
//! Valid transitions:
//! - Idle -> Thinking (query submitted)
//! - Idle -> Listening (capture requested)
//! - Listening -> Thinking (transcript received)
//! - Listening -> Idle (capture cancelled or empty)
//! - Listening -> Confused (capture error)
//! - Thinking -> Speaking | Happy (answer ready, voice on | off)
//! - Thinking -> Confused (pipeline failed)
//! - Speaking -> Happy (playback finished)
//! - Happy | Confused -> Idle (hold elapsed)
//! - Happy | Confused -> Thinking | Listening (new input preempts the hold)

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use parley_core::{ActivityState, AvatarView};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::AgentError;
use crate::events::AgentEvent;

/// Returns whether the machine may move from `from` to `to`.
pub fn can_transition(from: ActivityState, to: ActivityState) -> bool {
    use parley_core::ActivityState::*;
    matches!(
        (from, to),
        (Idle, Thinking)
            | (Idle, Listening)
            | (Listening, Thinking)
            | (Listening, Idle)
            | (Listening, Confused)
            | (Thinking, Speaking)
            | (Thinking, Happy)
            | (Thinking, Confused)
            | (Speaking, Happy)
            | (Happy, Idle)
            | (Confused, Idle)
            // Preemption of a pending hold
            | (Happy, Thinking)
            | (Happy, Listening)
            | (Confused, Thinking)
            | (Confused, Listening)
    )
}

struct Slot {
    state: ActivityState,
    /// Bumped whenever a hold is scheduled or cancelled; a timer only fires
    /// if the generation it was scheduled under is still current.
    hold_generation: u64,
    hold: Option<JoinHandle<()>>,
}

impl Slot {
    fn cancel_hold(&mut self) {
        self.hold_generation += 1;
        if let Some(handle) = self.hold.take() {
            handle.abort();
        }
    }
}

struct Inner {
    slot: Mutex<Slot>,
    avatar: watch::Sender<AvatarView>,
    events: broadcast::Sender<AgentEvent>,
}

/// Shared handle to the activity state.
///
/// Clones refer to the same machine. Every change is published to the
/// avatar watch channel and as [`AgentEvent::StateChanged`].
#[derive(Clone)]
pub struct ActivityMachine {
    inner: Arc<Inner>,
}

impl ActivityMachine {
    /// Create a machine in `Idle` that publishes on `events`.
    pub fn new(events: broadcast::Sender<AgentEvent>) -> Self {
        let (avatar, _) = watch::channel(AvatarView::default());
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state: ActivityState::Idle,
                    hold_generation: 0,
                    hold: None,
                }),
                avatar,
                events,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> ActivityState {
        self.slot().state
    }

    pub fn avatar(&self) -> AvatarView {
        AvatarView::from_state(self.current())
    }

    pub fn subscribe(&self) -> watch::Receiver<AvatarView> {
        self.inner.avatar.subscribe()
    }

    /// Move to `target`, cancelling any pending hold.
    pub fn transition(&self, target: ActivityState) -> Result<(), AgentError> {
        let mut slot = self.slot();
        let from = slot.state;
        if !can_transition(from, target) {
            return Err(AgentError::InvalidTransition { from, to: target });
        }
        slot.cancel_hold();
        self.apply(&mut slot, target);
        Ok(())
    }

    /// Return to `Idle` after `hold`, unless something else happens first.
    ///
    /// Requires a Tokio runtime.
    pub fn hold_then_idle(&self, hold: Duration) {
        let mut slot = self.slot();
        slot.cancel_hold();
        let generation = slot.hold_generation;
        let machine = self.clone();
        slot.hold = Some(tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            machine.expire_hold(generation);
        }));
        tracing::debug!(state = %slot.state, ?hold, "Hold scheduled");
    }

    /// Whether a hold timer is pending.
    pub fn hold_pending(&self) -> bool {
        self.slot().hold.is_some()
    }

    /// Cancel any hold and force the machine back to `Idle`.
    pub fn reset(&self) {
        let mut slot = self.slot();
        slot.cancel_hold();
        if slot.state != ActivityState::Idle {
            tracing::warn!("Activity state reset to Idle from {}", slot.state);
            self.apply(&mut slot, ActivityState::Idle);
        }
    }

    fn expire_hold(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.hold_generation != generation {
            return;
        }
        slot.hold = None;
        if matches!(slot.state, ActivityState::Happy | ActivityState::Confused) {
            self.apply(&mut slot, ActivityState::Idle);
        }
    }

    fn apply(&self, slot: &mut Slot, target: ActivityState) {
        let from = slot.state;
        slot.state = target;
        tracing::debug!("Activity state: {} -> {}", from, target);
        self.inner.avatar.send_replace(AvatarView::from_state(target));
        // No subscribers is fine.
        let _ = self
            .inner
            .events
            .send(AgentEvent::StateChanged { from, to: target });
    }
}

// =============================================================================
// Tests
// =============================================================================
