//! Generational arena of guard records.
//!
//! Handles are plain `Copy` values. Removing a guard bumps its slot's
//! generation, so a handle kept past unregistration can never alias the
//! guard that later reuses the slot.

use std::fmt;

use guard_core::{AgentId, BehaviorState, TacticalRole, Timestamp, Vec2};

/// Stable reference to a registered guard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuardHandle {
    index: u32,
    generation: u32,
}

impl GuardHandle {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for GuardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Coordinator-side view of one guard.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardRecord {
    pub agent: AgentId,
    pub position: Vec2,
    pub velocity: Vec2,
    pub state: BehaviorState,
    pub role: TacticalRole,
    pub last_role_change: Option<Timestamp>,
    pub registered_at: Timestamp,
}

impl GuardRecord {
    pub fn new(agent: AgentId, position: Vec2, now: Timestamp) -> Self {
        Self {
            agent,
            position,
            velocity: Vec2::ZERO,
            state: BehaviorState::Patrol,
            role: TacticalRole::Unassigned,
            last_role_change: None,
            registered_at: now,
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    record: Option<GuardRecord>,
}

#[derive(Clone, Debug, Default)]
pub struct GuardRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl GuardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: GuardRecord) -> GuardHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return GuardHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        GuardHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: GuardHandle) -> Option<GuardRecord> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(record)
    }

    pub fn get(&self, handle: GuardHandle) -> Option<&GuardRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, handle: GuardHandle) -> Option<&mut GuardRecord> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_mut())
    }

    pub fn contains(&self, handle: GuardHandle) -> bool {
        self.get(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (GuardHandle, &GuardRecord)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.record.as_ref().map(|record| {
                (
                    GuardHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    record,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (GuardHandle, &mut GuardRecord)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.record.as_mut().map(|record| {
                (
                    GuardHandle {
                        index: index as u32,
                        generation,
                    },
                    record,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> GuardRecord {
        GuardRecord::new(AgentId(id), Vec2::ZERO, Timestamp::ZERO)
    }

    #[test]
    fn stale_handle_does_not_alias_reused_slot() {
        let mut registry = GuardRegistry::new();
        let first = registry.insert(record(1));
        assert_eq!(registry.remove(first).map(|r| r.agent), Some(AgentId(1)));

        let second = registry.insert(record(2));
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());
        assert!(registry.get(first).is_none());
        assert_eq!(registry.get(second).map(|r| r.agent), Some(AgentId(2)));
        assert!(registry.remove(first).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn iter_skips_free_slots() {
        let mut registry = GuardRegistry::new();
        let a = registry.insert(record(1));
        let _b = registry.insert(record(2));
        registry.remove(a);
        let agents: Vec<_> = registry.iter().map(|(_, r)| r.agent).collect();
        assert_eq!(agents, vec![AgentId(2)]);
    }
}
