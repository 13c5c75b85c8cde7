//! Admission gate serializing request traffic against database swaps.
//!
//! The gate is a single state machine (`Open -> Draining -> Swapping -> Open`)
//! whose phase and in-flight count change together under one lock. A request is
//! admitted only in the same critical section that observed `Open`, so the
//! updater can never see an empty in-flight count while a request is between
//! "checked the gate" and "registered itself".

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    /// Requests are admitted.
    Open,
    /// An update announced itself; new requests park, admitted ones finish.
    Draining,
    /// No request is running; the updater owns the database.
    Swapping,
}

#[derive(Debug, Clone, Copy)]
struct GateState {
    phase: GatePhase,
    in_flight: usize,
}

/// Writer-preference quiesce barrier over the live database.
///
/// Cloning is cheap and every clone refers to the same gate.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    state: Arc<watch::Sender<GateState>>,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState {
            phase: GatePhase::Open,
            in_flight: 0,
        });
        Self {
            state: Arc::new(state),
        }
    }

    /// Waits until `ready` holds, then applies `apply` in the same critical
    /// section that re-checked `ready`.
    async fn transition<R, A>(&self, ready: R, apply: A)
    where
        R: Fn(&GateState) -> bool,
        A: Fn(&mut GateState),
    {
        let mut rx = self.state.subscribe();
        loop {
            // The sender outlives `rx` because `self` owns it.
            let _ = rx.wait_for(|state| ready(state)).await;

            let mut applied = false;
            self.state.send_if_modified(|state| {
                if ready(&*state) {
                    apply(state);
                    applied = true;
                }
                applied
            });
            if applied {
                return;
            }
        }
    }

    /// Registers a request, parking while an update holds the gate.
    ///
    /// The returned permit deregisters the request when dropped, including
    /// during unwinding.
    pub async fn enter_request(&self) -> RequestPermit {
        self.transition(
            |state| state.phase == GatePhase::Open,
            |state| state.in_flight += 1,
        )
        .await;
        RequestPermit {
            state: Arc::clone(&self.state),
        }
    }

    /// Announces an update. Requests arriving after this returns park until
    /// the guard is released.
    pub async fn begin_update(&self) -> UpdateGuard {
        self.transition(
            |state| state.phase == GatePhase::Open,
            |state| state.phase = GatePhase::Draining,
        )
        .await;
        debug!(in_flight = self.in_flight(), "Admission gate closed for update");
        UpdateGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight
    }

    pub fn phase(&self) -> GatePhase {
        self.state.borrow().phase
    }

    /// True when the gate is open and no request is running.
    pub fn is_idle(&self) -> bool {
        let state = self.state.borrow();
        state.phase == GatePhase::Open && state.in_flight == 0
    }
}

/// Proof that a request passed the gate.
#[derive(Debug)]
#[must_use = "dropping the permit immediately leaves the gate"]
pub struct RequestPermit {
    state: Arc<watch::Sender<GateState>>,
}

impl RequestPermit {
    pub fn leave(self) {
        drop(self);
    }
}

impl Drop for RequestPermit {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            state.in_flight = state.in_flight.saturating_sub(1);
        });
    }
}

/// Held by the update worker between `begin_update` and `end_update`.
///
/// Dropping the guard reopens the gate, so a failed swap never leaves requests
/// parked.
#[derive(Debug)]
#[must_use = "dropping the guard immediately reopens the gate"]
pub struct UpdateGuard {
    state: Arc<watch::Sender<GateState>>,
}

impl UpdateGuard {
    /// Waits until every request admitted before `begin_update` has finished.
    pub async fn wait_for_drain(&mut self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.in_flight == 0).await;
        self.state.send_modify(|state| state.phase = GatePhase::Swapping);
    }

    pub fn end_update(self) {
        drop(self);
    }
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.phase = GatePhase::Open);
        debug!("Admission gate reopened");
    }
}
