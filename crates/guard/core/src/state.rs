//! Behavioral states, tactical roles and the legacy state mapping.

use core::fmt;

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Opaque identifier of a guard entity, assigned by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guard#{}", self.0)
    }
}

/// Behavioral state of a guard.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BehaviorState {
    #[default]
    Patrol,
    Investigate,
    SweepRoom,
    SearchPaths,
    ReturnToPatrol,
    Chase,
}

impl BehaviorState {
    /// Alert priority: Chase > SearchPaths > SweepRoom > Investigate >
    /// ReturnToPatrol > Patrol.
    pub const fn alert_priority(self) -> u8 {
        match self {
            BehaviorState::Patrol => 0,
            BehaviorState::ReturnToPatrol => 1,
            BehaviorState::Investigate => 2,
            BehaviorState::SweepRoom => 3,
            BehaviorState::SearchPaths => 4,
            BehaviorState::Chase => 5,
        }
    }

    /// True when moving from `self` to `next` lowers the alert priority.
    pub const fn is_downgrade_to(self, next: BehaviorState) -> bool {
        next.alert_priority() < self.alert_priority()
    }

    /// States that track the player or a search around them.
    pub const fn is_alerted(self) -> bool {
        !matches!(self, BehaviorState::Patrol | BehaviorState::ReturnToPatrol)
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Tactical role assigned by the coordinator while an alert is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TacticalRole {
    #[default]
    Unassigned,
    Pursuer,
    Flanker,
    RoomChecker,
}

impl TacticalRole {
    pub const fn priority(self) -> u8 {
        match self {
            TacticalRole::Pursuer => 3,
            TacticalRole::Flanker => 2,
            TacticalRole::RoomChecker => 1,
            TacticalRole::Unassigned => 0,
        }
    }

    pub const fn is_assigned(self) -> bool {
        !matches!(self, TacticalRole::Unassigned)
    }
}

/// State set reported by the legacy guard controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumCount, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LegacyState {
    #[default]
    Patrolling,
    Suspicious,
    Searching,
    Alerted,
    Returning,
}

// Adding a state to either enum must be reflected in the conversions below.
const _: () = assert!(BehaviorState::COUNT == 6);
const _: () = assert!(LegacyState::COUNT == 5);

impl From<BehaviorState> for LegacyState {
    fn from(state: BehaviorState) -> Self {
        match state {
            BehaviorState::Patrol => LegacyState::Patrolling,
            BehaviorState::Investigate => LegacyState::Suspicious,
            BehaviorState::SweepRoom | BehaviorState::SearchPaths => LegacyState::Searching,
            BehaviorState::ReturnToPatrol => LegacyState::Returning,
            BehaviorState::Chase => LegacyState::Alerted,
        }
    }
}

impl From<LegacyState> for BehaviorState {
    fn from(state: LegacyState) -> Self {
        match state {
            LegacyState::Patrolling => BehaviorState::Patrol,
            LegacyState::Suspicious => BehaviorState::Investigate,
            LegacyState::Searching => BehaviorState::SearchPaths,
            LegacyState::Alerted => BehaviorState::Chase,
            LegacyState::Returning => BehaviorState::ReturnToPatrol,
        }
    }
}
