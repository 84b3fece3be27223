//! The simulator control loop.
//!
//! A [`Simulator`] owns a [`World`] and the simulation side of the three
//! shared-memory channels. Every tick it:
//!
//! 1. attaches the field channel, once the viewer has created it, and ends
//!    the iteration there if that succeeded;
//! 2. handles the single pending command;
//! 3. steps once more if it is running.
//!
//! A step increments the counter, runs every rule, publishes the agent
//! snapshot (frame index = new counter), serializes the field and publishes
//! the counter last, so a reader never sees a counter ahead of its data.
//!
//! Channel failures are logged and leave that channel detached; the loop keeps
//! going without it. Only a missing command or data channel stops
//! [`Simulator::run`] from starting at all.

use crate::config::SimulatorConfig;
use crate::error::{FieldError, SimulatorError};
use crate::field::FieldKind;
use crate::shm::{Command, CommandChannel, DataChannel, FieldChannel};
use crate::time::{Clock, Ticker};
use crate::world::World;
use tracing::{debug, error, info, trace, warn};

/// Whether the control loop should keep going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Terminate,
}

pub struct Simulator {
    world: World,
    config: SimulatorConfig,
    cmd: Option<CommandChannel>,
    data: Option<DataChannel>,
    field: Option<FieldChannel>,
    running: bool,
    step_count: i32,
    field_requested: bool,
    field_attach_attempts: u32,
}

impl Simulator {
    /// Attach to the viewer's command and data regions.
    ///
    /// A region that cannot be attached is logged and left out; see
    /// [`Simulator::run`].
    pub fn attach(world: World, config: SimulatorConfig) -> Self {
        if let Err(err) = config.validate() {
            error!(%err, "invalid simulator configuration, channels not attached");
            return Self::with_channels(world, config, None, None);
        }
        let cmd = match CommandChannel::attach(&config.shm_root, &config.command_region) {
            Ok(channel) => Some(channel),
            Err(err) => {
                error!(%err, "command channel unavailable");
                None
            }
        };
        let data = match DataChannel::attach(&config.shm_root, &config.data_region, config.data_layout()) {
            Ok(channel) => Some(channel),
            Err(err) => {
                error!(%err, "data channel unavailable");
                None
            }
        };
        Self::with_channels(world, config, cmd, data)
    }

    /// Build a simulator from already attached channels.
    pub fn with_channels(
        world: World,
        config: SimulatorConfig,
        cmd: Option<CommandChannel>,
        data: Option<DataChannel>,
    ) -> Self {
        Self {
            world,
            config,
            cmd,
            data,
            field: None,
            running: false,
            step_count: 0,
            field_requested: false,
            field_attach_attempts: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Whether uncommanded steps are taken every tick.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Steps taken since start or the last reset.
    pub fn step_count(&self) -> i32 {
        self.step_count
    }

    pub fn field_attached(&self) -> bool {
        self.field.is_some()
    }

    /// Times an attachment of the field region was tried.
    pub fn field_attach_attempts(&self) -> u32 {
        self.field_attach_attempts
    }

    /// Run the loop, paced by the configured tick, until TERMINATE.
    pub fn run(&mut self) -> Result<(), SimulatorError> {
        let mut ticker = Ticker::new(self.config.tick());
        self.run_with(&mut ticker)
    }

    /// Run the loop, paced by `clock`, until TERMINATE.
    pub fn run_with<C: Clock>(&mut self, clock: &mut C) -> Result<(), SimulatorError> {
        if self.cmd.is_none() {
            return Err(SimulatorError::ChannelUnavailable { channel: "command" });
        }
        if self.data.is_none() {
            return Err(SimulatorError::ChannelUnavailable { channel: "data" });
        }

        info!(
            rules = self.world.rule_count(),
            agents = self.world.agent_count(),
            field = self.world.has_field(),
            "simulator loop started"
        );
        loop {
            if self.poll_once() == LoopControl::Terminate {
                info!(steps = self.step_count, ticks = clock.ticks(), "simulator terminated");
                return Ok(());
            }
            clock.tick();
        }
    }

    /// One loop iteration, without waiting.
    pub fn poll_once(&mut self) -> LoopControl {
        self.negotiate_field();
        if self.try_attach_field() {
            return LoopControl::Continue;
        }
        if self.dispatch_command() == LoopControl::Terminate {
            return LoopControl::Terminate;
        }
        if self.running {
            self.step();
        }
        LoopControl::Continue
    }

    fn dispatch_command(&mut self) -> LoopControl {
        let Some(raw) = self.cmd.as_ref().map(CommandChannel::pending_raw) else {
            return LoopControl::Continue;
        };

        let mut control = LoopControl::Continue;
        match Command::from_raw(raw) {
            Some(Command::None) => return control,
            Some(Command::Step) => self.step(),
            Some(Command::Start) => self.start(),
            Some(Command::Stop) => self.stop(),
            Some(Command::Reset) => {
                info!("reset requested");
                self.reset();
            }
            Some(Command::Initialize) => self.perform_step_logic(),
            Some(Command::Terminate) => control = LoopControl::Terminate,
            None => warn!(raw, "ignoring unknown command"),
        }
        trace!(raw, step = self.step_count, "command handled");

        if let Some(cmd) = &self.cmd {
            if !cmd.acknowledge(raw) {
                debug!(raw, "command replaced while being handled");
            }
        }
        control
    }

    /// Publish the field request, once.
    fn negotiate_field(&mut self) {
        if self.field_requested {
            return;
        }
        let (Some(cmd), Some(field)) = (&self.cmd, self.world.field()) else {
            return;
        };
        if cmd.request_field(field) {
            let [x, y, z] = field.dimensions();
            info!(kind = ?field.kind(), x, y, z, cell_size = field.cell_size(), "field requested");
        }
        self.field_requested = true;
    }

    /// Attach the field region once the viewer reports it ready. Returns
    /// whether an attachment was made.
    fn try_attach_field(&mut self) -> bool {
        if self.field.is_some() {
            return false;
        }
        let (Some(cmd), Some(field)) = (&self.cmd, self.world.field()) else {
            return false;
        };
        if !cmd.field_ready() {
            return false;
        }

        self.field_attach_attempts += 1;
        let root = &self.config.shm_root;
        let name = &self.config.field_region;
        let attached = FieldKind::from_tag(cmd.field_type_tag())
            .and_then(|kind| FieldChannel::attach(root, name, kind))
            .and_then(|channel| {
                channel.check_compatible(field)?;
                Ok::<_, FieldError>(channel)
            });

        match attached {
            Ok(channel) => {
                info!(
                    kind = ?channel.kind(),
                    bytes = channel.layout().total_size(),
                    "attached field region"
                );
                self.field = Some(channel);
                true
            }
            Err(err) => {
                if self.field_attach_attempts == 1 {
                    warn!(%err, "failed to attach field region, will retry");
                } else {
                    trace!(%err, attempts = self.field_attach_attempts, "field attach retry failed");
                }
                false
            }
        }
    }

    /// Run `n` steps.
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// One counted step.
    pub fn step(&mut self) {
        self.step_count = self.step_count.wrapping_add(1);
        self.perform_step_logic();
        if let Some(data) = &self.data {
            data.publish_step(self.step_count);
        }
    }

    /// Zero the counter, rebuild the world and publish it as step 0.
    pub fn reset(&mut self) {
        self.step_count = 0;
        self.world.reset();
        if let Some(data) = &self.data {
            data.publish_step(0);
        }
        self.perform_step_logic();
    }

    /// Run the rules and publish agents and field, without counting a step.
    pub fn perform_step_logic(&mut self) {
        self.world.execute_rules();

        let Some(data) = &self.data else {
            return;
        };
        let snapshot = self.world.collect_agent_snapshot();
        if let Err(err) = data.publish(&snapshot, self.step_count) {
            warn!(%err, step = self.step_count, "dropping agent snapshot");
        }

        if let (Some(channel), Some(field)) = (&mut self.field, self.world.field()) {
            if let Err(err) = channel.publish(field) {
                warn!(%err, step = self.step_count, "failed to publish field");
            }
        }
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop();
        debug!(steps = self.step_count, "simulator dropped");
    }
}
