//! Agents and their per-species collections.
//!
//! Every simulated entity implements [`Agent`]: an optional position and a
//! species identifier. Agents of one Rust type live together in a
//! [`Species`] collection, an indexed slot arena that keeps insertion order.
//! The [`Population`] owns one collection per agent type, in the order the
//! types were registered, and produces the [`AgentData`] snapshot the
//! simulator publishes.
//!
//! # Example
//!
//! ```ignore
//! use uglylab::prelude::*;
//!
//! #[derive(Agent)]
//! #[agent(species = 7)]
//! struct Ant {
//!     position: Vec3,
//!     carrying: bool,
//! }
//!
//! let mut population = Population::new();
//! population.spawn(Ant { position: Vec3::ZERO, carrying: false });
//! assert_eq!(population.snapshot().len(), 1);
//! ```

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use slotmap::{new_key_type, SlotMap};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::debug;

new_key_type! {
    /// Stable handle for an agent inside its species collection.
    pub struct AgentKey;
}

/// One agent record in a published snapshot.
///
/// Matches the viewer's 16-byte `AgentData` layout.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AgentData {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub species_id: i32,
}

impl AgentData {
    pub fn new(position: Vec3, species_id: i32) -> Self {
        Self {
            x: position.x,
            y: position.y,
            z: position.z,
            species_id,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

/// Capability every simulated entity exposes to the snapshot collector.
///
/// Usually derived with `#[derive(Agent)]`:
///
/// ```ignore
/// #[derive(Agent)]
/// #[agent(species = 3)]
/// struct Fish {
///     position: Vec3,
/// }
/// ```
pub trait Agent: Send + 'static {
    /// Identifier shared by every agent of this type.
    const SPECIES_ID: i32;

    /// Current position. Agents without one are left out of snapshots.
    fn position(&self) -> Option<Vec3>;

    /// Species identifier reported for this agent.
    fn species_id(&self) -> i32 {
        Self::SPECIES_ID
    }

    /// Snapshot record, if the agent has a position.
    fn agent_data(&self) -> Option<AgentData> {
        self.position()
            .map(|position| AgentData::new(position, self.species_id()))
    }
}

/// All agents of one type, in insertion order.
pub struct Species<A: Agent> {
    slots: SlotMap<AgentKey, A>,
    order: Vec<AgentKey>,
}

impl<A: Agent> Species<A> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    /// Add an agent at the end of the collection.
    pub fn insert(&mut self, agent: A) -> AgentKey {
        let key = self.slots.insert(agent);
        self.order.push(key);
        key
    }

    /// Remove one agent, keeping the order of the others.
    pub fn remove(&mut self, key: AgentKey) -> Option<A> {
        let agent = self.slots.remove(key)?;
        self.order.retain(|k| *k != key);
        Some(agent)
    }

    pub fn get(&self, key: AgentKey) -> Option<&A> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: AgentKey) -> Option<&mut A> {
        self.slots.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Agents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &A> + '_ {
        self.order.iter().map(move |key| &self.slots[*key])
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = AgentKey> + '_ {
        self.order.iter().copied()
    }

    /// Mutable access to every agent. Order is unspecified.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut A> + '_ {
        self.slots.values_mut()
    }

    /// Drop every agent, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.order.len();
        self.order.clear();
        self.slots.clear();
        dropped
    }
}

impl<A: Agent> Default for Species<A> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased species collection held by the [`Population`].
pub(crate) trait SpeciesStore: Send {
    fn type_name(&self) -> &'static str;
    fn len(&self) -> usize;
    fn collect_into(&self, out: &mut Vec<AgentData>);
    fn clear(&mut self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<A: Agent> SpeciesStore for Species<A> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<A>()
    }

    fn len(&self) -> usize {
        Species::len(self)
    }

    fn collect_into(&self, out: &mut Vec<AgentData>) {
        out.extend(self.iter().filter_map(|agent| agent.agent_data()));
    }

    fn clear(&mut self) -> usize {
        Species::clear(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Every species collection of a world, in registration order.
#[derive(Default)]
pub struct Population {
    species: Vec<Box<dyn SpeciesStore>>,
    index: HashMap<TypeId, usize>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the collection for `A`. Registering twice is a no-op.
    pub fn register<A: Agent>(&mut self) -> &mut Species<A> {
        let slot = match self.index.get(&TypeId::of::<A>()) {
            Some(slot) => *slot,
            None => {
                let slot = self.species.len();
                self.species.push(Box::new(Species::<A>::new()));
                self.index.insert(TypeId::of::<A>(), slot);
                debug!(species = std::any::type_name::<A>(), slot, "registered species");
                slot
            }
        };
        self.species[slot]
            .as_any_mut()
            .downcast_mut::<Species<A>>()
            .expect("species slot holds the registered type")
    }

    /// Add one agent, registering its species on first use.
    pub fn spawn<A: Agent>(&mut self, agent: A) -> AgentKey {
        self.register::<A>().insert(agent)
    }

    /// Add `count` agents built from their index.
    pub fn spawn_batch<A, F>(&mut self, count: usize, mut make: F) -> Vec<AgentKey>
    where
        A: Agent,
        F: FnMut(usize) -> A,
    {
        let species = self.register::<A>();
        (0..count).map(|i| species.insert(make(i))).collect()
    }

    /// Add `count` agents at positions drawn from one sampler per axis.
    ///
    /// ```ignore
    /// let mut rng = rand::thread_rng();
    /// population.spawn_distributed(
    ///     500,
    ///     (|| rng.gen_range(0.0..10.0), || 5.0, || 0.0),
    ///     |position| Ant { position, carrying: false },
    /// );
    /// ```
    pub fn spawn_distributed<A, X, Y, Z, F>(
        &mut self,
        count: usize,
        axes: (X, Y, Z),
        make: F,
    ) -> Vec<AgentKey>
    where
        A: Agent,
        X: FnMut() -> f32,
        Y: FnMut() -> f32,
        Z: FnMut() -> f32,
        F: Fn(Vec3) -> A,
    {
        let (mut sample_x, mut sample_y, mut sample_z) = axes;
        self.spawn_batch(count, |_| {
            let x = sample_x();
            let y = sample_y();
            let z = sample_z();
            make(Vec3::new(x, y, z))
        })
    }

    /// Remove one agent of type `A`.
    pub fn despawn<A: Agent>(&mut self, key: AgentKey) -> Option<A> {
        self.species_mut::<A>()?.remove(key)
    }

    /// Collection for `A`, if registered.
    pub fn species<A: Agent>(&self) -> Option<&Species<A>> {
        let slot = *self.index.get(&TypeId::of::<A>())?;
        self.species[slot].as_any().downcast_ref::<Species<A>>()
    }

    /// Mutable collection for `A`, if registered.
    pub fn species_mut<A: Agent>(&mut self) -> Option<&mut Species<A>> {
        let slot = *self.index.get(&TypeId::of::<A>())?;
        self.species[slot].as_any_mut().downcast_mut::<Species<A>>()
    }

    /// Number of registered species.
    pub fn species_count(&self) -> usize {
        self.species.len()
    }

    /// Number of agents of type `A`.
    pub fn len_of<A: Agent>(&self) -> usize {
        self.species::<A>().map_or(0, Species::len)
    }

    /// Number of agents across every species.
    pub fn len(&self) -> usize {
        self.species.iter().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-species agent counts, in registration order.
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        self.species.iter().map(|s| (s.type_name(), s.len())).collect()
    }

    /// Snapshot of every positioned agent: species in registration order,
    /// agents in insertion order.
    pub fn snapshot(&self) -> Vec<AgentData> {
        let mut out = Vec::with_capacity(self.len());
        for species in &self.species {
            species.collect_into(&mut out);
        }
        out
    }

    /// Drop every agent and forget every species. Returns the number of
    /// agents dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.species.iter_mut().map(|s| s.clear()).sum();
        self.species.clear();
        self.index.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Walker {
        position: Option<Vec3>,
    }

    impl Agent for Walker {
        const SPECIES_ID: i32 = 7;

        fn position(&self) -> Option<Vec3> {
            self.position
        }
    }

    struct Plant {
        position: Vec3,
    }

    impl Agent for Plant {
        const SPECIES_ID: i32 = 2;

        fn position(&self) -> Option<Vec3> {
            Some(self.position)
        }
    }

    fn walker(x: f32) -> Walker {
        Walker {
            position: Some(Vec3::splat(x)),
        }
    }

    #[test]
    fn test_agent_data_layout() {
        assert_eq!(std::mem::size_of::<AgentData>(), 16);
        let data = AgentData::new(Vec3::new(1.0, 2.0, 3.0), 9);
        assert_eq!(data.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(data.species_id, 9);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut population = Population::new();
        population.register::<Walker>();
        population.register::<Walker>();
        population.spawn(walker(1.0));
        assert_eq!(population.species_count(), 1);
        assert_eq!(population.len_of::<Walker>(), 1);
    }

    #[test]
    fn test_snapshot_order_and_filter() {
        let mut population = Population::new();
        population.spawn(walker(0.0));
        population.spawn(Plant { position: Vec3::X });
        population.spawn(Walker { position: None });
        population.spawn(walker(2.0));

        let snapshot = population.snapshot();
        assert_eq!(snapshot.len(), 3);
        // Walkers were registered first, so they come first
        assert_eq!(snapshot[0], AgentData::new(Vec3::ZERO, 7));
        assert_eq!(snapshot[1], AgentData::new(Vec3::splat(2.0), 7));
        assert_eq!(snapshot[2], AgentData::new(Vec3::X, 2));
    }

    #[test]
    fn test_despawn_keeps_order() {
        let mut population = Population::new();
        let keys = population.spawn_batch(4, |i| walker(i as f32));
        assert!(population.despawn::<Walker>(keys[1]).is_some());
        assert!(population.despawn::<Walker>(keys[1]).is_none());

        let xs: Vec<f32> = population.snapshot().iter().map(|a| a.x).collect();
        assert_eq!(xs, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn test_spawn_distributed_samples_each_axis() {
        let mut population = Population::new();
        let mut next = 0.0;
        population.spawn_distributed(
            2,
            (
                move || {
                    next += 1.0;
                    next
                },
                || 5.0,
                || -1.0,
            ),
            |position| Plant { position },
        );
        let snapshot = population.snapshot();
        assert_eq!(snapshot[0].position(), Vec3::new(1.0, 5.0, -1.0));
        assert_eq!(snapshot[1].position(), Vec3::new(2.0, 5.0, -1.0));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut population = Population::new();
        population.spawn_batch(3, |i| walker(i as f32));
        population.spawn(Plant { position: Vec3::ZERO });
        assert_eq!(population.clear(), 4);
        assert_eq!(population.species_count(), 0);
        assert!(population.is_empty());
        assert!(population.species::<Walker>().is_none());
    }

    #[test]
    fn test_species_access_and_mutation() {
        let mut population = Population::new();
        let key = population.spawn(walker(1.0));
        population.species_mut::<Walker>().unwrap().get_mut(key).unwrap().position = None;
        assert!(population.snapshot().is_empty());
        assert_eq!(population.counts().len(), 1);
    }
}
