//! Diagnostics sinks injected into the orchestrator and coordinator.
//!
//! Components never reach for a global logger or metrics registry. They
//! receive an `Arc<dyn Diagnostics>` at construction and report
//! [`GuardEvent`]s to it; the host decides whether those become tracing
//! events, rollout metrics, an in-memory buffer, or all of them.

use std::sync::{Arc, Mutex};

use guard_core::{
    AgentId, BehaviorState, CandidateKind, RecoveryStrategy, StateMachineError, StuckFlags,
    TacticalRole, Timestamp, TransitionReason, Vec2,
};

use crate::metrics::MetricsLogger;

/// Observable behavior event.
#[derive(Clone, Debug, PartialEq)]
pub enum GuardEvent {
    Transition {
        agent: AgentId,
        from: BehaviorState,
        to: BehaviorState,
        reason: TransitionReason,
        at: Timestamp,
    },
    StuckEpisode {
        agent: AgentId,
        position: Vec2,
        flags: StuckFlags,
        at: Timestamp,
    },
    RecoveryApplied {
        agent: AgentId,
        strategy: RecoveryKind,
        at: Timestamp,
    },
    InvalidInput {
        agent: AgentId,
        error: StateMachineError,
        at: Timestamp,
    },
    AlertRaised {
        origin: Vec2,
        at: Timestamp,
    },
    AlertCleared {
        at: Timestamp,
    },
    RoleChanged {
        agent: AgentId,
        role: TacticalRole,
        at: Timestamp,
    },
    DoorwayConflict {
        doorway: Vec2,
        winner: AgentId,
        yielding: AgentId,
        at: Timestamp,
    },
    /// A guard was handed to the legacy controller after an orchestrator
    /// failure.
    Fallback {
        agent: AgentId,
        level: u32,
        at: Timestamp,
    },
}

/// Recovery steering applied by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryKind {
    Suggested(RecoveryStrategy),
    Alternative(CandidateKind),
    Backup,
}

pub trait Diagnostics: Send + Sync {
    fn record(&self, event: &GuardEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn record(&self, _event: &GuardEvent) {}
}

/// Emits structured `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: &GuardEvent) {
        match event {
            GuardEvent::Transition {
                agent,
                from,
                to,
                reason,
                at,
            } => tracing::info!(%agent, %from, %to, ?reason, %at, "state transition"),
            GuardEvent::StuckEpisode {
                agent,
                position,
                flags,
                at,
            } => tracing::info!(%agent, %position, ?flags, %at, "stuck episode"),
            GuardEvent::RecoveryApplied {
                agent,
                strategy,
                at,
            } => tracing::debug!(%agent, ?strategy, %at, "recovery steering"),
            GuardEvent::InvalidInput { agent, error, at } => {
                tracing::warn!(%agent, %error, %at, "skipping frame")
            }
            GuardEvent::AlertRaised { origin, at } => {
                tracing::info!(%origin, %at, "alert raised")
            }
            GuardEvent::AlertCleared { at } => tracing::info!(%at, "alert cleared"),
            GuardEvent::RoleChanged { agent, role, at } => {
                tracing::debug!(%agent, %role, %at, "role changed")
            }
            GuardEvent::DoorwayConflict {
                doorway,
                winner,
                yielding,
                at,
            } => tracing::debug!(%doorway, %winner, %yielding, %at, "doorway conflict"),
            GuardEvent::Fallback { agent, level, at } => {
                tracing::warn!(%agent, level, %at, "falling back to legacy controller")
            }
        }
    }
}

/// Buffers events in memory for tests and reports.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<GuardEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event recorded so far.
    pub fn events(&self) -> Vec<GuardEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Drains the buffer.
    pub fn take(&self) -> Vec<GuardEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&GuardEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| predicate(e)).count())
            .unwrap_or(0)
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, event: &GuardEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards stuck, transition and fallback events into a level's rollout
/// session.
pub struct MetricsDiagnostics {
    logger: Arc<Mutex<MetricsLogger>>,
    level: u32,
}

impl MetricsDiagnostics {
    pub fn new(logger: Arc<Mutex<MetricsLogger>>, level: u32) -> Self {
        Self { logger, level }
    }
}

impl Diagnostics for MetricsDiagnostics {
    fn record(&self, event: &GuardEvent) {
        let Ok(mut logger) = self.logger.lock() else {
            tracing::warn!(level = self.level, "metrics logger lock poisoned; dropping event");
            return;
        };
        match event {
            GuardEvent::Transition { from, to, at, .. } => {
                logger.record_state_transition(self.level, *from, *to, *at)
            }
            GuardEvent::StuckEpisode { at, .. } => logger.record_stuck_event(self.level, *at),
            GuardEvent::Fallback { at, .. } => logger.record_fallback_trigger(self.level, *at),
            _ => {}
        }
    }
}

/// Sends every event to each inner sink in order.
#[derive(Default)]
pub struct FanoutDiagnostics {
    sinks: Vec<Arc<dyn Diagnostics>>,
}

impl FanoutDiagnostics {
    pub fn new(sinks: Vec<Arc<dyn Diagnostics>>) -> Self {
        Self { sinks }
    }

    pub fn with(mut self, sink: Arc<dyn Diagnostics>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl Diagnostics for FanoutDiagnostics {
    fn record(&self, event: &GuardEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(RecordingDiagnostics::new());
        let b = Arc::new(RecordingDiagnostics::new());
        let fanout = FanoutDiagnostics::new(vec![a.clone()]).with(b.clone());
        fanout.record(&GuardEvent::AlertCleared { at: Timestamp(5) });
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.take().len(), 1);
        assert!(b.events().is_empty());
    }

    #[test]
    fn metrics_sink_counts_stuck_and_transitions() {
        let logger = Arc::new(Mutex::new(MetricsLogger::default()));
        logger.lock().unwrap().start_session(3, Timestamp(0));
        let sink = MetricsDiagnostics::new(logger.clone(), 3);

        sink.record(&GuardEvent::StuckEpisode {
            agent: AgentId(1),
            position: Vec2::ZERO,
            flags: StuckFlags::STUCK,
            at: Timestamp(10),
        });
        sink.record(&GuardEvent::Transition {
            agent: AgentId(1),
            from: BehaviorState::Patrol,
            to: BehaviorState::Investigate,
            reason: TransitionReason::Suspicion,
            at: Timestamp(20),
        });

        let logger = logger.lock().unwrap();
        let session = logger.session(3).unwrap();
        assert_eq!(session.counters.stuck_events, 1);
        assert_eq!(session.counters.state_transitions, 1);
    }
}
