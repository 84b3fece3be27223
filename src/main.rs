//! Demo simulation: ants wandering over a pheromone field.
//!
//! Start the viewer first, then run `uglylab [config.json]`. Logging is
//! controlled with `RUST_LOG`, e.g. `RUST_LOG=uglylab=debug`.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use uglylab::prelude::*;

const WORLD_CELLS: usize = 32;
const CELL_SIZE: f32 = 1.0;
const ANT_SPEED: f32 = 0.4;
const DEPOSIT: f32 = 1.0;
const EVAPORATION: f32 = 0.02;
const BITE: f32 = 0.5;

#[derive(Agent)]
#[agent(species = 1)]
struct Ant {
    position: Vec3,
    heading: Vec3,
}

#[derive(Agent)]
#[agent(species = 2)]
struct Food {
    /// `None` once eaten.
    #[position]
    at: Option<Vec3>,
    amount: f32,
}

fn extent() -> f32 {
    WORLD_CELLS as f32 * CELL_SIZE
}

/// Random walk with a little inertia, reflected at the walls.
struct Wander {
    rng: StdRng,
}

impl Rule for Wander {
    fn execute(&mut self, env: &mut Environment) {
        let Some(ants) = env.agents.species_mut::<Ant>() else {
            return;
        };
        let max = extent() - f32::EPSILON;
        for ant in ants.iter_mut() {
            let jitter = Vec3::new(
                self.rng.gen_range(-0.5..0.5),
                self.rng.gen_range(-0.5..0.5),
                self.rng.gen_range(-0.5..0.5),
            );
            ant.heading = (ant.heading + jitter).normalize_or_zero();
            ant.position += ant.heading * ANT_SPEED;

            for axis in 0..3 {
                if ant.position[axis] < 0.0 || ant.position[axis] > max {
                    ant.heading[axis] = -ant.heading[axis];
                    ant.position[axis] = ant.position[axis].clamp(0.0, max);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "wander"
    }
}

fn deposit(env: &mut Environment) {
    let (agents, pheromone) = env.split_mut::<f32>();
    let (Some(ants), Some(pheromone)) = (agents.species::<Ant>(), pheromone) else {
        return;
    };
    for ant in ants.iter() {
        if let Some((i, j, k)) = pheromone.cell_at(ant.position) {
            *pheromone.at_mut(i, j, k) += DEPOSIT;
        }
    }
}

fn evaporate(env: &mut Environment) {
    if let Some(pheromone) = env.field_as_mut::<f32>() {
        for cell in pheromone.as_mut_slice() {
            *cell *= 1.0 - EVAPORATION;
        }
    }
}

fn graze(env: &mut Environment) {
    let ants: Vec<Vec3> = match env.agents.species::<Ant>() {
        Some(ants) => ants.iter().map(|ant| ant.position).collect(),
        None => return,
    };
    let Some(food) = env.agents.species_mut::<Food>() else {
        return;
    };
    for item in food.iter_mut() {
        let Some(at) = item.at else { continue };
        let bites = ants.iter().filter(|ant| ant.distance(at) < CELL_SIZE).count();
        item.amount -= bites as f32 * BITE;
        if item.amount <= 0.0 {
            item.at = None;
        }
    }
}

/// Ants released from the middle of the box, food scattered around them.
struct AntColony {
    ants: usize,
    food: usize,
    seed: u64,
}

impl Default for AntColony {
    fn default() -> Self {
        Self {
            ants: 2_000,
            food: 40,
            seed: 0x5EED_A27,
        }
    }
}

impl Scenario for AntColony {
    fn initialize(&mut self, world: &mut World) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let center = Vec3::splat(extent() / 2.0);

        world.set_field(Grid3D::<f32>::cubic(WORLD_CELLS, CELL_SIZE));
        world.agents_mut().spawn_batch(self.ants, |_| Ant {
            position: center,
            heading: Vec3::ZERO,
        });

        let mut depth_rng = StdRng::seed_from_u64(self.seed.rotate_left(17));
        world.agents_mut().spawn_distributed(
            self.food,
            (
                || rng.gen_range(0.0..extent()),
                || depth_rng.gen_range(0.0..extent()),
                || extent() / 2.0,
            ),
            |at| Food {
                at: Some(at),
                amount: 20.0,
            },
        );

        world.add_rule(Wander {
            rng: StdRng::seed_from_u64(self.seed.wrapping_add(1)),
        });
        world.add_rule(deposit);
        world.add_rule(evaporate);
        world.add_rule(graze);
        world.log_agents();
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn run() -> Result<()> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => SimulatorConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SimulatorConfig::default(),
    };
    info!(
        root = %config.shm_root.display(),
        tick_ms = config.tick_ms,
        "starting uglylab simulator"
    );

    let world = World::new(AntColony::default());
    let mut simulator = Simulator::attach(world, config);
    simulator.run()?;
    Ok(())
}
