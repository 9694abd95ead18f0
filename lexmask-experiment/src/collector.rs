use crate::input::{InputHub, KeyBindings, Listener};
use lexmask_core::{Response, Screen};
use lexmask_timing::Timer;
use std::time::Duration;
use tokio::time::Instant;

/// Collects at most one decision per response window.
#[derive(Debug, Clone)]
pub struct ResponseCollector<T: Timer> {
    timer: T,
    bindings: KeyBindings,
    hub: InputHub,
}

impl<T: Timer> ResponseCollector<T> {
    pub fn new(timer: T, bindings: KeyBindings, hub: InputHub) -> Self {
        Self {
            timer,
            bindings,
            hub,
        }
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn prompt(&self) -> Screen {
        self.bindings.prompt()
    }

    /// Registers the window's listener. Inputs published before this call are
    /// never seen by the window.
    pub fn open(&self) -> ResponseWindow<'_, T> {
        ResponseWindow {
            collector: self,
            listener: self.hub.listen(),
        }
    }
}

/// One armed response window. Consumed by [`ResponseWindow::race`]; its
/// listener is deregistered whichever way the race ends.
pub struct ResponseWindow<'a, T: Timer> {
    collector: &'a ResponseCollector<T>,
    listener: Listener,
}

impl<T: Timer> ResponseWindow<'_, T> {
    /// Races the first bound input against `timeout` measured from now.
    /// An input arriving at the deadline loses.
    pub async fn race(mut self, timeout: Duration) -> Response {
        let timer = &self.collector.timer;
        let bindings = &self.collector.bindings;
        let onset = timer.now();
        let deadline = tokio::time::sleep_until(Instant::now() + timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                () = &mut deadline => return Response::timed_out(),
                event = self.listener.recv() => match event {
                    Some(event) => {
                        if let Some(decision) = bindings.decision_for(&event.id) {
                            return Response::decided(decision, timer.elapsed(onset));
                        }
                    }
                    None => {
                        deadline.as_mut().await;
                        return Response::timed_out();
                    }
                },
            }
        }
    }
}
