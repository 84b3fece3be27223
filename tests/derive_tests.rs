//! Integration tests for the derive macro.
//!
//! These tests verify that `#[derive(Agent)]` generates the right species id
//! and position accessor by using the derived implementations.

use uglylab::{Agent, AgentData, Population, Vec3};

#[derive(Agent)]
#[agent(species = 7)]
struct Ant {
    position: Vec3,
    carrying: bool,
}

#[derive(Agent)]
#[agent(species = 3)]
struct Seed {
    #[position]
    at: Option<Vec3>,
    energy: f32,
}

const BASE: i32 = 10;

#[derive(Agent)]
#[agent(species = BASE + 2)]
struct Drone {
    #[position]
    hover: Vec3,
    position: Vec3,
}

#[derive(Agent)]
#[agent(species = -1)]
struct Tagged<T: Send + 'static> {
    position: Vec3,
    tag: T,
}

#[test]
fn test_species_id_constant() {
    assert_eq!(Ant::SPECIES_ID, 7);
    assert_eq!(Seed::SPECIES_ID, 3);
    assert_eq!(Drone::SPECIES_ID, 12);
    assert_eq!(Tagged::<u8>::SPECIES_ID, -1);
}

#[test]
fn test_vec3_position_is_always_present() {
    let ant = Ant {
        position: Vec3::new(1.0, 2.0, 3.0),
        carrying: true,
    };
    assert!(ant.carrying);
    assert_eq!(ant.position(), Some(Vec3::new(1.0, 2.0, 3.0)));
    assert_eq!(
        ant.agent_data(),
        Some(AgentData {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            species_id: 7
        })
    );
}

#[test]
fn test_optional_position() {
    let mut seed = Seed {
        at: Some(Vec3::ONE),
        energy: 1.0,
    };
    assert_eq!(seed.position(), Some(Vec3::ONE));
    seed.at = None;
    seed.energy -= 1.0;
    assert_eq!(seed.energy, 0.0);
    assert_eq!(seed.position(), None);
    assert_eq!(seed.agent_data(), None);
}

#[test]
fn test_marked_field_wins_over_name() {
    let drone = Drone {
        hover: Vec3::Y,
        position: Vec3::X,
    };
    assert_eq!(drone.position(), Some(Vec3::Y));
    assert_eq!(drone.position, Vec3::X);
}

#[test]
fn test_generic_agent() {
    let tagged = Tagged {
        position: Vec3::Z,
        tag: "queen",
    };
    assert_eq!(tagged.tag, "queen");
    assert_eq!(tagged.species_id(), -1);
    assert_eq!(tagged.position(), Some(Vec3::Z));
}

#[test]
fn test_derived_agents_in_population() {
    let mut population = Population::new();
    population.spawn(Ant {
        position: Vec3::ZERO,
        carrying: false,
    });
    population.spawn(Seed {
        at: None,
        energy: 1.0,
    });
    population.spawn(Seed {
        at: Some(Vec3::ONE),
        energy: 1.0,
    });

    let snapshot = population.snapshot();
    assert_eq!(population.len(), 3);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].species_id, 7);
    assert_eq!(snapshot[1].species_id, 3);
}
