//! # UglyLab
//!
//! Simulation-side runtime for agent-based models that are watched live by a
//! separate viewer process.
//!
//! A simulation is a [`World`] of rules, agents and an optional 3D field. The
//! [`Simulator`] drives it from commands the viewer writes into shared
//! memory, and publishes every step back: agent positions through a
//! double-buffered, paged region and the field through a region negotiated
//! at runtime.
//!
//! ## Quick Start
//!
//! ```ignore
//! use uglylab::prelude::*;
//!
//! #[derive(Agent)]
//! #[agent(species = 1)]
//! struct Ant {
//!     position: Vec3,
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let world = World::new(|world: &mut World| {
//!         world.set_field(Grid3D::<f32>::cubic(32, 1.0));
//!         world.spawn(Ant { position: Vec3::splat(16.0) });
//!         world.add_rule(|env: &mut Environment| {
//!             if let Some(ants) = env.agents.species_mut::<Ant>() {
//!                 for ant in ants.iter_mut() {
//!                     ant.position.x += 0.1;
//!                 }
//!             }
//!         });
//!     });
//!
//!     Simulator::attach(world, SimulatorConfig::default()).run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Core Concepts
//!
//! ### Agents
//!
//! Anything with an optional position and a species id. Derive [`Agent`]
//! for a struct with a `position: Vec3` field, or implement it by hand.
//! Agents of one type live in a [`Species`] collection; snapshots list
//! species in registration order and agents in insertion order.
//!
//! ### Rules
//!
//! A [`Rule`] runs once per step with mutable access to the agents and the
//! field. Any `FnMut(&mut Environment)` closure is a rule.
//!
//! ### Fields
//!
//! A [`Grid3D`] of `i32`, `f32` or `bool` cells. A world holds at most one.
//! Its kind and dimensions are sent to the viewer, which creates a region of
//! the right size; the simulator attaches to it and writes the grid after
//! every step.
//!
//! ## Shared Memory
//!
//! See [`shm`] for the three regions and their ordering rules.

pub mod agent;
pub mod config;
pub mod error;
pub mod field;
pub mod rules;
pub mod shm;
pub mod simulator;
pub mod time;
pub mod world;

pub use agent::{Agent, AgentData, AgentKey, Population, Species};
pub use config::SimulatorConfig;
pub use error::{ConfigError, FieldError, PublishError, ShmError, SimulatorError};
pub use field::{Field, FieldElement, FieldHeader, FieldKind, FieldLayout, Grid3D};
pub use glam::{IVec3, Vec3};
pub use rules::Rule;
pub use simulator::{LoopControl, Simulator};
pub use uglylab_derive::Agent;
pub use world::{Environment, Scenario, World};

/// Everything needed to write a simulation.
///
/// ```ignore
/// use uglylab::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::{Agent, AgentKey, Population, Species};
    pub use crate::config::SimulatorConfig;
    pub use crate::field::{Field, FieldKind, Grid3D};
    pub use crate::rules::Rule;
    pub use crate::simulator::Simulator;
    pub use crate::world::{Environment, Scenario, World};
    pub use crate::{IVec3, Vec3};
    pub use uglylab_derive::Agent;
}
