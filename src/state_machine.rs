//! C5 — the five recording states and their validated transitions
//! (`spec.md` §4.5).

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Pause,
    Resume,
    Stop,
    Finalized,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Paused => "Paused",
            SessionState::Stopping => "Stopping",
        };
        f.write_str(s)
    }
}

/// Maps `(from, event)` to the table in `spec.md` §4.5. `None` means the
/// event is rejected and the state is unchanged.
fn next_state(from: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent::*;
    use SessionState::*;
    match (from, event) {
        (Idle, Start) => Some(Recording),
        (Recording, Pause) => Some(Paused),
        (Recording, Stop) => Some(Stopping),
        (Paused, Resume) => Some(Recording),
        (Paused, Stop) => Some(Stopping),
        (Stopping, Finalized) => Some(Idle),
        _ => None,
    }
}

type ChangeCallback = Box<dyn FnMut(SessionState, SessionState) + Send>;

/// A tagged-sum state machine with a single registered change callback
/// (`spec.md` §9's "no inheritance" note).
pub struct SessionMachine {
    state: SessionState,
    on_change: Option<ChangeCallback>,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            on_change: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_on_change<F>(&mut self, callback: F)
    where
        F: FnMut(SessionState, SessionState) + Send + 'static,
    {
        self.on_change = Some(Box::new(callback));
    }

    /// Returns `true` iff the `(state, event)` cell in the transition table
    /// is a hit. On rejection, the state is left unchanged and no callback
    /// fires.
    pub fn transition(&mut self, event: SessionEvent) -> bool {
        match next_state(self.state, event) {
            Some(new_state) => {
                let old_state = self.state;
                self.state = new_state;
                info!(from = %old_state, to = %new_state, ?event, "session state transition");
                if let Some(cb) = self.on_change.as_mut() {
                    cb(old_state, new_state);
                }
                true
            }
            None => false,
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const ALL_STATES: [SessionState; 4] = [
        SessionState::Idle,
        SessionState::Recording,
        SessionState::Paused,
        SessionState::Stopping,
    ];
    const ALL_EVENTS: [SessionEvent; 5] = [
        SessionEvent::Start,
        SessionEvent::Pause,
        SessionEvent::Resume,
        SessionEvent::Stop,
        SessionEvent::Finalized,
    ];

    #[test]
    fn s1_exhaustive_transition_table() {
        for &state in &ALL_STATES {
            for &event in &ALL_EVENTS {
                let mut machine = SessionMachine::new();
                machine.state = state;
                let expected = next_state(state, event);
                let accepted = machine.transition(event);
                assert_eq!(accepted, expected.is_some());
                if let Some(expected_state) = expected {
                    assert_eq!(machine.state(), expected_state);
                } else {
                    assert_eq!(machine.state(), state);
                }
            }
        }
    }

    #[test]
    fn full_lifecycle_round_trip() {
        let mut machine = SessionMachine::new();
        assert!(machine.transition(SessionEvent::Start));
        assert_eq!(machine.state(), SessionState::Recording);
        assert!(machine.transition(SessionEvent::Pause));
        assert_eq!(machine.state(), SessionState::Paused);
        assert!(machine.transition(SessionEvent::Resume));
        assert_eq!(machine.state(), SessionState::Recording);
        assert!(machine.transition(SessionEvent::Stop));
        assert_eq!(machine.state(), SessionState::Stopping);
        assert!(machine.transition(SessionEvent::Finalized));
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn rejected_transition_fires_no_callback() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls2 = calls.clone();
        let mut machine = SessionMachine::new();
        machine.set_on_change(move |_old, _new| {
            *calls2.lock().unwrap() += 1;
        });
        assert!(!machine.transition(SessionEvent::Stop));
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(machine.transition(SessionEvent::Start));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn accepted_transition_fires_callback_exactly_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let calls2 = calls.clone();
        let mut machine = SessionMachine::new();
        machine.set_on_change(move |_old, _new| {
            *calls2.lock().unwrap() += 1;
        });
        machine.transition(SessionEvent::Start);
        machine.transition(SessionEvent::Pause);
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
