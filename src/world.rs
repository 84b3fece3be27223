//! The world: rules, agents and the optional field.
//!
//! A [`World`] owns everything one simulation needs between steps. Its
//! contents come from a [`Scenario`], whose `initialize` hook registers rules,
//! spawns agents and installs the field. Resetting a world drops all of that
//! and runs the hook again, so a reset world cannot be told apart from a
//! freshly built one.
//!
//! # Example
//!
//! ```ignore
//! use uglylab::prelude::*;
//!
//! let world = World::new(|world: &mut World| {
//!     world.set_field(Grid3D::<f32>::cubic(32, 1.0));
//!     world.spawn(Ant { position: Vec3::ZERO, carrying: false });
//!     world.add_rule(|env: &mut Environment| {
//!         // ...
//!     });
//! });
//!
//! assert_eq!(world.rule_count(), 1);
//! ```

use crate::agent::{Agent, AgentData, AgentKey, Population, Species};
use crate::field::{Field, FieldElement, Grid3D};
use crate::rules::Rule;
use tracing::{debug, warn};

/// Populates a world with rules, agents and field.
///
/// Called once when the world is built and again on every reset.
pub trait Scenario: Send {
    fn initialize(&mut self, world: &mut World);
}

impl<F> Scenario for F
where
    F: FnMut(&mut World) + Send,
{
    fn initialize(&mut self, world: &mut World) {
        self(world)
    }
}

/// Agents and field, as seen by rules.
#[derive(Default)]
pub struct Environment {
    /// Every agent, grouped by species.
    pub agents: Population,
    field: Option<Box<dyn Field>>,
}

impl Environment {
    pub fn has_field(&self) -> bool {
        self.field.is_some()
    }

    pub fn field(&self) -> Option<&dyn Field> {
        self.field.as_deref()
    }

    pub fn field_mut(&mut self) -> Option<&mut (dyn Field + 'static)> {
        self.field.as_deref_mut()
    }

    /// The field as a typed grid, if present and holding `T` cells.
    pub fn field_as<T: FieldElement>(&self) -> Option<&Grid3D<T>> {
        self.field()?.as_any().downcast_ref::<Grid3D<T>>()
    }

    /// Mutable typed grid, if present and holding `T` cells.
    pub fn field_as_mut<T: FieldElement>(&mut self) -> Option<&mut Grid3D<T>> {
        self.field_mut()?.as_any_mut().downcast_mut::<Grid3D<T>>()
    }

    /// Agents and typed grid borrowed together, for rules that read one
    /// while writing the other.
    pub fn split_mut<T: FieldElement>(&mut self) -> (&mut Population, Option<&mut Grid3D<T>>) {
        let field = self
            .field
            .as_deref_mut()
            .and_then(|field| field.as_any_mut().downcast_mut::<Grid3D<T>>());
        (&mut self.agents, field)
    }
}

/// Owner of a simulation's rules, agents and field.
pub struct World {
    rules: Vec<Box<dyn Rule>>,
    env: Environment,
    scenario: Option<Box<dyn Scenario>>,
    cleared: bool,
}

impl World {
    /// Build a world and run the scenario's `initialize` hook on it.
    pub fn new<S: Scenario + 'static>(scenario: S) -> Self {
        let mut world = Self::empty();
        world.scenario = Some(Box::new(scenario));
        world.initialize();
        world
    }

    /// A world without a scenario. Resetting it only clears it.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            env: Environment::default(),
            scenario: None,
            cleared: false,
        }
    }

    fn initialize(&mut self) {
        if let Some(mut scenario) = self.scenario.take() {
            scenario.initialize(self);
            self.scenario = Some(scenario);
        }
        debug!(
            rules = self.rules.len(),
            species = self.env.agents.species_count(),
            agents = self.env.agents.len(),
            field = self.env.has_field(),
            "world initialized"
        );
    }

    /// Append a rule. Rules run in the order they were added.
    pub fn add_rule<R: Rule + 'static>(&mut self, rule: R) {
        self.cleared = false;
        self.rules.push(Box::new(rule));
    }

    /// Register the collection for agent type `A`. Idempotent per type.
    pub fn register_species<A: Agent>(&mut self) -> &mut Species<A> {
        self.cleared = false;
        self.env.agents.register::<A>()
    }

    /// Add one agent, registering its species on first use.
    pub fn spawn<A: Agent>(&mut self, agent: A) -> AgentKey {
        self.cleared = false;
        self.env.agents.spawn(agent)
    }

    /// Install the world's field. A world holds at most one; installing a
    /// second replaces the first.
    pub fn set_field<T: FieldElement>(&mut self, grid: Grid3D<T>) {
        if self.env.field.is_some() {
            warn!("replacing existing field");
        }
        self.cleared = false;
        self.env.field = Some(Box::new(grid));
    }

    pub fn agents(&self) -> &Population {
        &self.env.agents
    }

    pub fn agents_mut(&mut self) -> &mut Population {
        self.cleared = false;
        &mut self.env.agents
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        self.cleared = false;
        &mut self.env
    }

    /// Run every rule once, in registration order.
    pub fn execute_rules(&mut self) {
        for rule in &mut self.rules {
            rule.execute(&mut self.env);
        }
    }

    /// One record per positioned agent: species in registration order,
    /// agents in insertion order.
    pub fn collect_agent_snapshot(&self) -> Vec<AgentData> {
        self.env.agents.snapshot()
    }

    /// Drop every rule, agent and the field.
    ///
    /// A second call before anything new is added does nothing.
    pub fn clear(&mut self) {
        if self.cleared {
            return;
        }
        self.cleared = true;

        let rules = self.rules.len();
        self.rules.clear();
        let agents = self.env.agents.clear();
        let field = self.env.field.take().is_some();
        debug!(rules, agents, field, "world cleared");
    }

    /// Clear, then run the scenario's `initialize` hook again.
    pub fn reset(&mut self) {
        self.cleared = false;
        self.clear();
        self.initialize();
    }

    pub fn has_field(&self) -> bool {
        self.env.has_field()
    }

    pub fn field(&self) -> Option<&dyn Field> {
        self.env.field()
    }

    /// The field.
    ///
    /// # Panics
    ///
    /// Panics if the world has no field.
    pub fn expect_field(&self) -> &dyn Field {
        match self.env.field() {
            Some(field) => field,
            None => panic!("world has no field"),
        }
    }

    pub fn field_as<T: FieldElement>(&self) -> Option<&Grid3D<T>> {
        self.env.field_as::<T>()
    }

    pub fn field_as_mut<T: FieldElement>(&mut self) -> Option<&mut Grid3D<T>> {
        self.env.field_as_mut::<T>()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn species_count(&self) -> usize {
        self.env.agents.species_count()
    }

    pub fn agent_count(&self) -> usize {
        self.env.agents.len()
    }

    /// Number of agents of type `A`.
    pub fn species_len<A: Agent>(&self) -> usize {
        self.env.agents.len_of::<A>()
    }

    /// Log every positioned agent at debug level.
    pub fn log_agents(&self) {
        for (n, agent) in self.collect_agent_snapshot().iter().enumerate() {
            debug!(
                n = n + 1,
                species = agent.species_id,
                x = agent.x,
                y = agent.y,
                z = agent.z,
                "agent"
            );
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;
    use glam::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Dot {
        position: Vec3,
        drops: Arc<AtomicUsize>,
    }

    impl Agent for Dot {
        const SPECIES_ID: i32 = 1;

        fn position(&self) -> Option<Vec3> {
            Some(self.position)
        }
    }

    impl Drop for Dot {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Tracked {
        drops: Arc<AtomicUsize>,
    }

    impl Rule for Tracked {
        fn execute(&mut self, _env: &mut Environment) {}
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn populated(drops: &Arc<AtomicUsize>) -> World {
        let drops = Arc::clone(drops);
        World::new(move |world: &mut World| {
            world.add_rule(Tracked { drops: Arc::clone(&drops) });
            for i in 0..3 {
                world.spawn(Dot {
                    position: Vec3::splat(i as f32),
                    drops: Arc::clone(&drops),
                });
            }
            world.set_field(Grid3D::<i32>::new(4, 3, 2, 0.5));
        })
    }

    #[test]
    fn test_new_runs_initialize() {
        let drops = Arc::new(AtomicUsize::new(0));
        let world = populated(&drops);
        assert_eq!(world.rule_count(), 1);
        assert_eq!(world.agent_count(), 3);
        assert_eq!(world.species_count(), 1);
        assert_eq!(world.expect_field().dimensions(), [4, 3, 2]);
        assert_eq!(world.expect_field().kind(), FieldKind::Int);
    }

    #[test]
    fn test_clear_twice_drops_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut world = populated(&drops);
        world.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 4);
        world.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 4);
        assert!(!world.has_field());
        assert_eq!(world.rule_count(), 0);
        drop(world);
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_clear_rearms_after_new_construction() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut world = World::empty();
        world.clear();
        world.spawn(Dot { position: Vec3::ZERO, drops: Arc::clone(&drops) });
        world.clear();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_matches_fresh_world() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut world = populated(&drops);
        world.spawn(Dot { position: Vec3::ONE, drops: Arc::clone(&drops) });
        world.reset();

        let fresh = populated(&drops);
        assert_eq!(world.rule_count(), fresh.rule_count());
        assert_eq!(world.agent_count(), fresh.agent_count());
        assert_eq!(world.species_count(), fresh.species_count());
        assert_eq!(
            world.expect_field().dimensions(),
            fresh.expect_field().dimensions()
        );
        assert_eq!(world.collect_agent_snapshot(), fresh.collect_agent_snapshot());
    }

    #[test]
    fn test_drop_clears() {
        let drops = Arc::new(AtomicUsize::new(0));
        drop(populated(&drops));
        assert_eq!(drops.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_rules_run_in_registration_order() {
        let mut world = World::empty();
        world.set_field(Grid3D::<i32>::cubic(1, 1.0));
        world.add_rule(|env: &mut Environment| {
            *env.field_as_mut::<i32>().unwrap().at_mut(0, 0, 0) += 1;
        });
        world.add_rule(|env: &mut Environment| {
            *env.field_as_mut::<i32>().unwrap().at_mut(0, 0, 0) *= 10;
        });
        world.execute_rules();
        world.execute_rules();
        assert_eq!(*world.field_as::<i32>().unwrap().at(0, 0, 0), 110);
    }

    #[test]
    fn test_typed_field_access_checks_type() {
        let mut world = World::empty();
        world.set_field(Grid3D::<f32>::cubic(2, 1.0));
        assert!(world.field_as::<i32>().is_none());
        assert!(world.field_as_mut::<f32>().is_some());
    }

    #[test]
    fn test_split_mut_borrows_agents_and_field() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut world = populated(&drops);
        let (agents, field) = world.environment_mut().split_mut::<i32>();
        let field = field.unwrap();
        for dot in agents.species::<Dot>().unwrap().iter() {
            if let Some((i, j, k)) = field.cell_at(dot.position) {
                *field.at_mut(i, j, k) += 1;
            }
        }
        // 4x3x2 cells of 0.5: only the dot at the origin lands inside
        assert_eq!(*field.at(0, 0, 0), 1);
        assert_eq!(*field.at(1, 1, 1), 0);
        assert_eq!(field.as_slice().iter().sum::<i32>(), 1);

        let (_, wrong) = world.environment_mut().split_mut::<f32>();
        assert!(wrong.is_none());
    }

    #[test]
    #[should_panic(expected = "world has no field")]
    fn test_expect_field_without_field_panics() {
        World::empty().expect_field();
    }
}
