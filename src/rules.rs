//! Per-step simulation rules.
//!
//! A rule is one unit of behavior that runs once per step. The world owns
//! its rules and runs them in registration order, handing each one mutable
//! access to the agents and the field through an [`Environment`].
//!
//! What a concrete rule computes is up to the simulation. Any
//! `FnMut(&mut Environment)` closure is a rule:
//!
//! ```ignore
//! world.add_rule(|env: &mut Environment| {
//!     if let Some(ants) = env.agents.species_mut::<Ant>() {
//!         for ant in ants.iter_mut() {
//!             ant.position.x += 0.1;
//!         }
//!     }
//! });
//! ```
//!
//! Rules are not isolated: a rule that panics takes the process down with
//! it, the same as any other broken invariant.

use crate::world::Environment;

/// Behavior executed once per simulation step.
pub trait Rule: Send {
    /// Advance the environment by one step.
    fn execute(&mut self, env: &mut Environment);

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Rule for F
where
    F: FnMut(&mut Environment) + Send,
{
    fn execute(&mut self, env: &mut Environment) {
        self(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        runs: u32,
    }

    impl Rule for Counter {
        fn execute(&mut self, _env: &mut Environment) {
            self.runs += 1;
        }

        fn name(&self) -> &str {
            "counter"
        }
    }

    #[test]
    fn test_struct_rule() {
        let mut rule = Counter { runs: 0 };
        let mut env = Environment::default();
        rule.execute(&mut env);
        rule.execute(&mut env);
        assert_eq!(rule.runs, 2);
        assert_eq!(rule.name(), "counter");
    }

    #[test]
    fn test_closure_rule() {
        let mut calls = 0;
        {
            let mut rule = |_env: &mut Environment| calls += 1;
            let mut env = Environment::default();
            Rule::execute(&mut rule, &mut env);
            Rule::execute(&mut rule, &mut env);
        }
        assert_eq!(calls, 2);
    }
}
