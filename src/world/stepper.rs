use std::marker::PhantomData;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::{PhysicsWorld, SteppingToken, WorldState};
use crate::{
    backend::{CollisionReport, PhysicsBackend, StepReport},
    config::{ConfigNode, PhysicsParams, WorldConfig},
    dynamics::Retention,
    error::{PhysicsError, Result},
    utils::logging::{warn_if_step_budget_exceeded, ScopedTimer},
};

impl<B: PhysicsBackend> PhysicsWorld<B> {
    /// Validates and stores the configuration used by the next `init`.
    pub fn load(&mut self, params: &PhysicsParams) -> Result<()> {
        if self.state.is_running() {
            return Err(PhysicsError::AlreadyInitialized);
        }
        let config = WorldConfig::from_params(params, self.range_policy)?;
        if self.config.is_some() {
            warn!("world {}: replacing previously loaded configuration", self.id);
        }
        info!(
            "world {}: loaded config (step {} s, gravity {}, cfm {}, erp {})",
            self.id, config.step_time, config.gravity, config.cfm, config.erp
        );
        self.adopt(config);
        Ok(())
    }

    /// [`load`](Self::load) from a textual node such as a `<physics>` block.
    pub fn load_node<N: ConfigNode + ?Sized>(&mut self, node: &N) -> Result<()> {
        self.load(&PhysicsParams::from_node(node)?)
    }

    /// Builds the backend world from the loaded configuration.
    pub fn init(&mut self) -> Result<()> {
        if self.state.is_running() {
            return Err(PhysicsError::AlreadyInitialized);
        }
        let config = self.config.clone().ok_or(PhysicsError::NotLoaded)?;
        self.backend.init(&config)?;

        self.generation += 1;
        self.state = WorldState::Initialized;
        self.sim_time = 0.0;
        self.last_tick = None;
        self.last_tick_wall_time = Duration::ZERO;
        self.last_report = None;
        self.above_tolerance = false;
        self.monitor.clear();
        info!(
            "world {}: initialized {} backend (generation {})",
            self.id,
            self.backend.name(),
            self.generation
        );
        Ok(())
    }

    /// Prepares the calling thread to step this world.
    pub fn init_for_thread(&self) -> Result<SteppingToken> {
        self.ensure_running()?;
        self.backend.init_for_thread()?;
        debug!(
            "world {}: thread {:?} ready to step",
            self.id,
            std::thread::current().id()
        );
        Ok(SteppingToken {
            world: self.id,
            generation: self.generation,
            _thread_bound: PhantomData,
        })
    }

    /// Releases every backend object and handle.
    pub fn fini(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.backend.fini();
        self.bodies.clear();
        self.geoms.clear();
        self.joints.clear();
        self.entities.clear();
        self.natives.clear();
        self.pending = None;
        self.state = WorldState::Finalized;
        info!(
            "world {}: finalized after {:.3} s of simulated time",
            self.id, self.sim_time
        );
        Ok(())
    }

    /// Validates new parameters now; they take effect at the start of the next collision phase.
    pub fn reconfigure(&mut self, params: &PhysicsParams) -> Result<()> {
        self.ensure_running()?;
        let config = WorldConfig::from_params(params, self.range_policy)?;
        debug!("world {}: reconfiguration pending", self.id);
        self.pending = Some(config);
        Ok(())
    }

    pub fn has_pending_config(&self) -> bool {
        self.pending.is_some()
    }

    /// Broad and narrow phase; does not move anything.
    pub fn update_collision(&mut self, token: &SteppingToken) -> Result<CollisionReport> {
        self.check_token(token)?;
        if let Some(config) = self.pending.take() {
            self.backend.apply_config(&config);
            info!("world {}: applied pending configuration", self.id);
            self.adopt(config);
        }

        let mut elapsed = Duration::ZERO;
        let result = {
            let _timer = ScopedTimer::recording("world::update_collision", &mut elapsed);
            self.backend.update_collision()
        };
        self.phase_times.collision = elapsed;

        match result {
            Ok(report) => {
                self.state = WorldState::Stepping;
                Ok(report)
            }
            Err(err) => {
                warn!("world {}: collision phase failed: {err}", self.id);
                self.backend.discard_contacts();
                self.state = WorldState::Initialized;
                Err(err)
            }
        }
    }

    /// Solves and integrates exactly one configured step.
    pub fn update_physics(&mut self, token: &SteppingToken) -> Result<StepReport> {
        self.check_token(token)?;
        let step_time = self.step_time();

        let mut elapsed = Duration::ZERO;
        let result = {
            let _timer = ScopedTimer::recording("world::update_physics", &mut elapsed);
            self.backend.update_physics(step_time)
        };
        self.phase_times.physics = elapsed;
        self.state = WorldState::Initialized;

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                warn!("world {}: step aborted, contacts discarded: {err}", self.id);
                self.backend.discard_contacts();
                return Err(err);
            }
        };

        self.sim_time += step_time;
        let now = Instant::now();
        if let Some(previous) = self.last_tick.replace(now) {
            self.last_tick_wall_time = now - previous;
        }
        warn_if_step_budget_exceeded(
            self.phase_times.collision + self.phase_times.physics,
            step_time,
        );
        self.record_residual(report.residual);
        self.last_report = Some(report);
        Ok(report)
    }

    /// Collision phase followed by physics phase.
    pub fn step(&mut self, token: &SteppingToken) -> Result<StepReport> {
        self.update_collision(token)?;
        self.update_physics(token)
    }

    fn record_residual(&mut self, residual: f64) {
        self.monitor.record_error(residual);
        let exceeded = self.monitor.exceeds_tolerance();
        if exceeded && !self.above_tolerance {
            warn!(
                "world {}: RMS solver error {:.3e} exceeds tolerance {:.3e}",
                self.id,
                self.monitor.rms_error(),
                self.monitor.rms_error_tolerance()
            );
        }
        self.above_tolerance = exceeded;
    }

    /// Retention follows the config only when its window changes, so a
    /// retention chosen through `set_rms_retention` survives other edits.
    fn adopt(&mut self, config: WorldConfig) {
        self.monitor
            .set_rms_error_tolerance(config.rms_error_tolerance);
        let window_changed = self
            .config
            .as_ref()
            .map_or(true, |current| current.rms_error_window != config.rms_error_window);
        if window_changed {
            self.monitor
                .set_retention(Retention::Window(config.rms_error_window));
        }
        self.config = Some(config);
    }

    fn step_time(&self) -> f64 {
        self.config
            .as_ref()
            .map(|config| config.step_time)
            .unwrap_or(crate::config::DEFAULT_STEP_TIME)
    }

    pub(super) fn ensure_running(&self) -> Result<()> {
        if self.state.is_running() {
            Ok(())
        } else {
            Err(PhysicsError::EngineNotRunning)
        }
    }

    fn check_token(&self, token: &SteppingToken) -> Result<()> {
        self.ensure_running()?;
        if token.world != self.id || token.generation != self.generation {
            return Err(PhysicsError::ThreadNotInitialized);
        }
        Ok(())
    }
}
