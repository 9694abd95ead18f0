//! Input fan-out and decision bindings.
//!
//! Every phase that accepts input registers its own [`Listener`] and drops it
//! when the phase ends, so inputs that arrive with no phase listening are
//! discarded rather than queued for a later trial.

use lexmask_core::{Decision, Display, Screen};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const HUB_CAPACITY: usize = 64;

/// One raw input: a key name or an on-screen control identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct InputHub {
    tx: broadcast::Sender<InputEvent>,
}

impl InputHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Delivers an input to every registered listener. Returns how many
    /// listeners received it.
    pub fn publish(&self, id: impl Into<String>) -> usize {
        self.tx.send(InputEvent { id: id.into() }).unwrap_or(0)
    }

    /// Registers a listener that sees inputs published from now on.
    pub fn listen(&self) -> Listener {
        Listener {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InputHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration on the hub; deregisters when dropped.
#[derive(Debug)]
pub struct Listener {
    rx: broadcast::Receiver<InputEvent>,
}

impl Listener {
    /// Next input, or `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<InputEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "input listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Decision-to-input binding, fixed for the whole session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyBindings {
    pub word: String,
    pub nonword: String,
    pub quit: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            word: "f".into(),
            nonword: "j".into(),
            quit: "escape".into(),
        }
    }
}

impl KeyBindings {
    pub fn swapped(&self) -> Self {
        Self {
            word: self.nonword.clone(),
            nonword: self.word.clone(),
            quit: self.quit.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let keys = [&self.word, &self.nonword, &self.quit];
        if keys.iter().any(|k| k.trim().is_empty()) {
            return Err("key bindings must not be empty".into());
        }
        for (i, a) in keys.iter().enumerate() {
            if keys[i + 1..].iter().any(|b| a.eq_ignore_ascii_case(b)) {
                return Err(format!("key {a:?} is bound twice"));
            }
        }
        Ok(())
    }

    pub fn decision_for(&self, id: &str) -> Option<Decision> {
        let id = id.trim();
        if id.eq_ignore_ascii_case(&self.word) {
            Some(Decision::Word)
        } else if id.eq_ignore_ascii_case(&self.nonword) {
            Some(Decision::Nonword)
        } else {
            None
        }
    }

    pub fn is_quit(&self, id: &str) -> bool {
        id.trim().eq_ignore_ascii_case(&self.quit)
    }

    /// Either decision key continues past a gate.
    pub fn is_continue(&self, id: &str) -> bool {
        self.decision_for(id).is_some()
    }

    pub fn prompt(&self) -> Screen {
        Screen::Prompt {
            word_key: self.word.clone(),
            nonword_key: self.nonword.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Continue,
    Cancelled,
}

impl GateOutcome {
    pub fn is_cancelled(self) -> bool {
        self == GateOutcome::Cancelled
    }
}

/// Shows `screen` and waits for a continue input or session cancellation.
pub async fn wait_for_continue<D: Display + ?Sized>(
    display: &mut D,
    screen: &Screen,
    hub: &InputHub,
    bindings: &KeyBindings,
    cancel: &CancellationToken,
) -> GateOutcome {
    let mut listener = hub.listen();
    display.present(screen);
    loop {
        tokio::select! {
            () = cancel.cancelled() => return GateOutcome::Cancelled,
            event = listener.recv() => match event {
                Some(event) if bindings.is_continue(&event.id) => return GateOutcome::Continue,
                Some(_) => {}
                None => return GateOutcome::Cancelled,
            },
        }
    }
}
