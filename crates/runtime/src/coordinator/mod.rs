//! Shared tactical coordination across all guards of a level.
//!
//! The [`Coordinator`] owns the guard registry, the current alert and the
//! doorway conflict table. Orchestrators write their own guard record through
//! [`Coordinator::update_guard`]; everything cross-guard (roles, conflicts,
//! alert expiry) is written only by [`Coordinator::update`] and the alert
//! entry points.

mod doorway;
mod registry;
mod tactics;

use std::collections::BTreeMap;
use std::sync::Arc;

use guard_core::{AgentId, BehaviorState, GeometryOracle, TacticalRole, Timestamp, Vec2};

pub use doorway::{
    ContentionOutcome, Contender, DoorwayConflict, DoorwayKey, contention_priority,
    resolve_contention, yield_direction,
};
pub use registry::{GuardHandle, GuardRecord, GuardRegistry};
pub use tactics::{flank_target, room_check_points};

use crate::diagnostics::{Diagnostics, GuardEvent};
use crate::error::{Result, RuntimeError};

/// Tuning for role assignment, flanking and doorway contention.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinatorConfig {
    /// Minimum time between two role changes of one guard.
    pub role_cooldown_ms: u64,
    /// Flankers assigned before the room checker.
    pub max_flankers: usize,
    /// Alert lapses after this long without any guard in Chase.
    pub alert_timeout_ms: u64,
    /// Player speed below which flankers circle instead of intercepting.
    pub motion_threshold: f32,
    pub circle_radius: f32,
    /// Angular offset of interception points, in radians.
    pub flank_spread: f32,
    pub min_flank_distance: f32,
    pub max_flank_distance: f32,
    pub room_check_inset: f32,
    /// Guards within this distance of a doorway contend for it.
    pub doorway_radius: f32,
    /// Conflicts clear once contenders are 1.5× this far apart.
    pub min_separation: f32,
    pub conflict_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            role_cooldown_ms: 1_500,
            max_flankers: 1,
            alert_timeout_ms: 12_000,
            motion_threshold: 10.0,
            circle_radius: 96.0,
            flank_spread: core::f32::consts::FRAC_PI_6,
            min_flank_distance: 64.0,
            max_flank_distance: 192.0,
            room_check_inset: 24.0,
            doorway_radius: 40.0,
            min_separation: 64.0,
            conflict_timeout_ms: 3_000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlertState {
    pub origin: Vec2,
    pub raised_at: Timestamp,
    /// Last time the alert was refreshed or a guard was seen chasing.
    pub last_activity: Timestamp,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoleAssignment {
    pub handle: GuardHandle,
    pub agent: AgentId,
    pub role: TacticalRole,
    pub state: BehaviorState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConflictSummary {
    pub key: DoorwayKey,
    pub doorway: Vec2,
    pub winner: GuardHandle,
    pub yielding: Vec<GuardHandle>,
}

/// Owned copy of coordination state after one [`Coordinator::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinationSnapshot {
    pub at: Timestamp,
    pub alert: Option<AlertState>,
    pub roles: Vec<RoleAssignment>,
    /// Conflicts resolved this update.
    pub resolved: Vec<ConflictSummary>,
    /// Conflicts cleared this update.
    pub cleared: Vec<DoorwayKey>,
}

impl CoordinationSnapshot {
    pub fn count_role(&self, role: TacticalRole) -> usize {
        self.roles.iter().filter(|r| r.role == role).count()
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    geometry: Arc<dyn GeometryOracle>,
    diagnostics: Arc<dyn Diagnostics>,
    guards: GuardRegistry,
    alert: Option<AlertState>,
    conflicts: BTreeMap<DoorwayKey, DoorwayConflict>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        geometry: Arc<dyn GeometryOracle>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            config,
            geometry,
            diagnostics,
            guards: GuardRegistry::new(),
            alert: None,
            conflicts: BTreeMap::new(),
        }
    }

    pub fn register_guard(&mut self, agent: AgentId, position: Vec2, now: Timestamp) -> GuardHandle {
        let handle = self.guards.insert(GuardRecord::new(agent, position, now));
        tracing::debug!(%agent, %handle, "guard registered");
        handle
    }

    /// Removes a guard and any conflict it was part of.
    pub fn unregister_guard(&mut self, handle: GuardHandle) -> Option<GuardRecord> {
        let record = self.guards.remove(handle)?;
        self.conflicts.retain(|_, conflict| {
            conflict.yielding.retain(|(h, _)| *h != handle);
            conflict.winner != handle && !conflict.yielding.is_empty()
        });
        tracing::debug!(agent = %record.agent, %handle, "guard unregistered");
        Some(record)
    }

    /// Writes a guard's own position, state and velocity.
    pub fn update_guard(
        &mut self,
        handle: GuardHandle,
        position: Vec2,
        state: BehaviorState,
        velocity: Vec2,
    ) -> Result<()> {
        let record = self
            .guards
            .get_mut(handle)
            .ok_or(RuntimeError::UnknownGuard(handle))?;
        record.position = position;
        record.state = state;
        record.velocity = velocity;
        Ok(())
    }

    /// Raises or refreshes the alert and assigns roles immediately.
    pub fn trigger_alert(&mut self, origin: Vec2, now: Timestamp) {
        match &mut self.alert {
            Some(alert) => {
                alert.origin = origin;
                alert.last_activity = now;
            }
            None => {
                self.alert = Some(AlertState {
                    origin,
                    raised_at: now,
                    last_activity: now,
                });
                self.diagnostics
                    .record(&GuardEvent::AlertRaised { origin, at: now });
            }
        }
        self.assign_roles(now);
    }

    /// Ends the alert; every role returns to unassigned.
    pub fn clear_alert(&mut self, now: Timestamp) {
        if self.alert.take().is_none() {
            return;
        }
        for (_, record) in self.guards.iter_mut() {
            if record.role.is_assigned() {
                record.role = TacticalRole::Unassigned;
                self.diagnostics.record(&GuardEvent::RoleChanged {
                    agent: record.agent,
                    role: TacticalRole::Unassigned,
                    at: now,
                });
            }
        }
        self.diagnostics.record(&GuardEvent::AlertCleared { at: now });
    }

    /// Per-frame pass: alert expiry, role assignment, conflict bookkeeping.
    pub fn update(&mut self, now: Timestamp) -> CoordinationSnapshot {
        self.refresh_alert(now);
        self.assign_roles(now);
        let cleared = self.clear_conflicts(now);
        let resolved = self.detect_conflicts(now);

        CoordinationSnapshot {
            at: now,
            alert: self.alert,
            roles: self
                .guards
                .iter()
                .map(|(handle, record)| RoleAssignment {
                    handle,
                    agent: record.agent,
                    role: record.role,
                    state: record.state,
                })
                .collect(),
            resolved,
            cleared,
        }
    }

    fn refresh_alert(&mut self, now: Timestamp) {
        let Some(alert) = self.alert.as_mut() else {
            return;
        };
        if self
            .guards
            .iter()
            .any(|(_, record)| record.state == BehaviorState::Chase)
        {
            alert.last_activity = now;
        } else if now.since(alert.last_activity) >= self.config.alert_timeout_ms {
            self.clear_alert(now);
        }
    }

    /// Fills roles for available guards, nearest to the alert first.
    fn assign_roles(&mut self, now: Timestamp) {
        let Some(alert) = self.alert else {
            return;
        };
        let cooldown = self.config.role_cooldown_ms;

        let mut has_pursuer = self.guards.iter().any(|(_, r)| {
            r.role == TacticalRole::Pursuer || r.state == BehaviorState::Chase
        });
        let mut flankers = self
            .guards
            .iter()
            .filter(|(_, r)| r.role == TacticalRole::Flanker)
            .count();
        let mut has_room_checker = self
            .guards
            .iter()
            .any(|(_, r)| r.role == TacticalRole::RoomChecker);

        let mut available: Vec<(GuardHandle, f32)> = self
            .guards
            .iter()
            .filter(|(_, r)| {
                r.state != BehaviorState::Chase
                    && !r.role.is_assigned()
                    && r.last_role_change
                        .is_none_or(|changed| now.since(changed) >= cooldown)
            })
            .map(|(handle, r)| (handle, r.position.distance_squared(alert.origin)))
            .collect();
        available.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        for (handle, _) in available {
            let role = if !has_pursuer {
                has_pursuer = true;
                TacticalRole::Pursuer
            } else if flankers < self.config.max_flankers {
                flankers += 1;
                TacticalRole::Flanker
            } else if !has_room_checker {
                has_room_checker = true;
                TacticalRole::RoomChecker
            } else {
                flankers += 1;
                TacticalRole::Flanker
            };

            if let Some(record) = self.guards.get_mut(handle) {
                record.role = role;
                record.last_role_change = Some(now);
                self.diagnostics.record(&GuardEvent::RoleChanged {
                    agent: record.agent,
                    role,
                    at: now,
                });
            }
        }
    }

    fn clear_conflicts(&mut self, now: Timestamp) -> Vec<DoorwayKey> {
        let threshold = self.config.min_separation * 1.5;
        let timeout = self.config.conflict_timeout_ms;
        let guards = &self.guards;
        let mut cleared = Vec::new();

        self.conflicts.retain(|key, conflict| {
            let timed_out = now.since(conflict.since) >= timeout;
            let separated = match guards.get(conflict.winner) {
                Some(winner) => conflict.yielding.iter().all(|(h, _)| {
                    guards
                        .get(*h)
                        .is_none_or(|y| y.position.distance(winner.position) > threshold)
                }),
                None => true,
            };
            if timed_out || separated {
                cleared.push(*key);
                false
            } else {
                true
            }
        });
        cleared
    }

    fn detect_conflicts(&mut self, now: Timestamp) -> Vec<ConflictSummary> {
        let tile = self.geometry.tile_size();
        let mut groups: BTreeMap<DoorwayKey, (Vec2, Vec<Contender>)> = BTreeMap::new();
        for (handle, record) in self.guards.iter() {
            let Some(doorway) = self
                .geometry
                .doorway_near(record.position, self.config.doorway_radius)
            else {
                continue;
            };
            let key = DoorwayKey::from_point(doorway, tile);
            groups.entry(key).or_insert((doorway, Vec::new())).1.push(Contender {
                handle,
                priority: contention_priority(record.state, record.role),
                distance: record.position.distance(doorway),
            });
        }

        let mut resolved = Vec::new();
        for (key, (doorway, contenders)) in groups {
            if self.conflicts.contains_key(&key) {
                continue;
            }
            let Some(outcome) = resolve_contention(&contenders) else {
                continue;
            };
            let Some(winner) = self.guards.get(outcome.winner).map(|r| r.agent) else {
                continue;
            };

            let mut yielding = Vec::with_capacity(outcome.yielding.len());
            for handle in &outcome.yielding {
                if let Some(record) = self.guards.get(*handle) {
                    yielding.push((
                        *handle,
                        yield_direction(record.position, doorway, record.velocity),
                    ));
                    self.diagnostics.record(&GuardEvent::DoorwayConflict {
                        doorway,
                        winner,
                        yielding: record.agent,
                        at: now,
                    });
                }
            }

            self.conflicts.insert(
                key,
                DoorwayConflict {
                    doorway,
                    winner: outcome.winner,
                    yielding,
                    since: now,
                },
            );
            resolved.push(ConflictSummary {
                key,
                doorway,
                winner: outcome.winner,
                yielding: outcome.yielding,
            });
        }
        resolved
    }

    pub fn role(&self, handle: GuardHandle) -> Option<TacticalRole> {
        self.guards.get(handle).map(|r| r.role)
    }

    /// Flank position for a guard, alternating sides by slot.
    pub fn flank_target(
        &self,
        handle: GuardHandle,
        player_position: Vec2,
        player_velocity: Vec2,
    ) -> Option<Vec2> {
        let record = self.guards.get(handle)?;
        let side = if handle.index() % 2 == 0 { 1.0 } else { -1.0 };
        Some(flank_target(
            record.position,
            player_position,
            player_velocity,
            side,
            &self.config,
        ))
    }

    pub fn room_check_targets(&self, handle: GuardHandle, count: usize) -> Vec<Vec2> {
        let Some(record) = self.guards.get(handle) else {
            return Vec::new();
        };
        let origin = self.alert.map(|a| a.origin).unwrap_or(record.position);
        room_check_points(
            &self.geometry.rooms(),
            origin,
            count,
            self.config.room_check_inset,
        )
    }

    /// Sidestep direction while the guard is yielding a doorway.
    pub fn yield_direction(&self, handle: GuardHandle) -> Option<Vec2> {
        self.conflicts.values().find_map(|conflict| {
            conflict
                .yielding
                .iter()
                .find(|(h, _)| *h == handle)
                .map(|(_, direction)| *direction)
        })
    }

    pub fn alert(&self) -> Option<AlertState> {
        self.alert
    }

    pub fn alert_origin(&self) -> Option<Vec2> {
        self.alert.map(|a| a.origin)
    }

    pub fn guard(&self, handle: GuardHandle) -> Option<&GuardRecord> {
        self.guards.get(handle)
    }

    pub fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (&DoorwayKey, &DoorwayConflict)> {
        self.conflicts.iter()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use guard_core::RoomBounds;

    struct OpenFloor;

    impl GeometryOracle for OpenFloor {
        fn is_wall_at(&self, _point: Vec2) -> bool {
            false
        }

        fn generate_search_pattern(&self, origin: Vec2) -> Vec<Vec2> {
            vec![origin]
        }

        fn rooms(&self) -> Vec<RoomBounds> {
            vec![RoomBounds::new(Vec2::new(200.0, 0.0), Vec2::new(300.0, 100.0))]
        }
    }

    fn coordinator() -> (Coordinator, Arc<RecordingDiagnostics>) {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            Arc::new(OpenFloor),
            diagnostics.clone(),
        );
        (coordinator, diagnostics)
    }

    #[test]
    fn roles_follow_distance_and_priority_order() {
        let (mut coord, _) = coordinator();
        let far = coord.register_guard(AgentId(1), Vec2::new(400.0, 0.0), Timestamp(0));
        let near = coord.register_guard(AgentId(2), Vec2::new(10.0, 0.0), Timestamp(0));
        let mid = coord.register_guard(AgentId(3), Vec2::new(100.0, 0.0), Timestamp(0));
        let farthest = coord.register_guard(AgentId(4), Vec2::new(900.0, 0.0), Timestamp(0));

        coord.trigger_alert(Vec2::ZERO, Timestamp(100));
        assert_eq!(coord.role(near), Some(TacticalRole::Pursuer));
        assert_eq!(coord.role(mid), Some(TacticalRole::Flanker));
        assert_eq!(coord.role(far), Some(TacticalRole::RoomChecker));
        assert_eq!(coord.role(farthest), Some(TacticalRole::Flanker));
    }

    #[test]
    fn chasing_guards_are_not_reassigned() {
        let (mut coord, _) = coordinator();
        let chaser = coord.register_guard(AgentId(1), Vec2::new(5.0, 0.0), Timestamp(0));
        let other = coord.register_guard(AgentId(2), Vec2::new(50.0, 0.0), Timestamp(0));
        coord
            .update_guard(chaser, Vec2::new(5.0, 0.0), BehaviorState::Chase, Vec2::ZERO)
            .unwrap();

        coord.trigger_alert(Vec2::ZERO, Timestamp(0));
        assert_eq!(coord.role(chaser), Some(TacticalRole::Unassigned));
        assert_eq!(coord.role(other), Some(TacticalRole::Flanker));
    }

    #[test]
    fn role_cooldown_blocks_fast_reassignment() {
        let (mut coord, _) = coordinator();
        let guard = coord.register_guard(AgentId(1), Vec2::ZERO, Timestamp(0));
        coord.trigger_alert(Vec2::ZERO, Timestamp(0));
        assert_eq!(coord.role(guard), Some(TacticalRole::Pursuer));

        coord.clear_alert(Timestamp(100));
        coord.trigger_alert(Vec2::ZERO, Timestamp(200));
        assert_eq!(coord.role(guard), Some(TacticalRole::Unassigned));

        coord.update(Timestamp(1_600));
        assert_eq!(coord.role(guard), Some(TacticalRole::Pursuer));
    }

    #[test]
    fn alert_lapses_without_chase() {
        let (mut coord, diagnostics) = coordinator();
        let guard = coord.register_guard(AgentId(1), Vec2::ZERO, Timestamp(0));
        coord.trigger_alert(Vec2::ZERO, Timestamp(0));
        coord
            .update_guard(guard, Vec2::ZERO, BehaviorState::Chase, Vec2::ZERO)
            .unwrap();
        coord.update(Timestamp(10_000));
        coord
            .update_guard(guard, Vec2::ZERO, BehaviorState::SearchPaths, Vec2::ZERO)
            .unwrap();

        assert!(coord.update(Timestamp(21_000)).alert.is_some());
        let snapshot = coord.update(Timestamp(22_000));
        assert!(snapshot.alert.is_none());
        assert_eq!(snapshot.count_role(TacticalRole::Pursuer), 0);
        assert_eq!(
            diagnostics.count(|e| matches!(e, GuardEvent::AlertCleared { .. })),
            1
        );
    }

    #[test]
    fn stale_handle_is_rejected() {
        let (mut coord, _) = coordinator();
        let guard = coord.register_guard(AgentId(1), Vec2::ZERO, Timestamp(0));
        coord.unregister_guard(guard);
        let err = coord
            .update_guard(guard, Vec2::ZERO, BehaviorState::Patrol, Vec2::ZERO)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownGuard(h) if h == guard));
    }

    #[test]
    fn room_checks_start_from_alert_origin() {
        let (mut coord, _) = coordinator();
        let guard = coord.register_guard(AgentId(1), Vec2::new(-500.0, 0.0), Timestamp(0));
        coord.trigger_alert(Vec2::new(250.0, 50.0), Timestamp(0));
        let targets = coord.room_check_targets(guard, 1);
        assert_eq!(targets.first(), Some(&Vec2::new(250.0, 50.0)));
    }
}
