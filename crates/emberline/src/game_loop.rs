//! # EMBERLINE Game Loop
//!
//! THE SERVER TICK:
//! ```text
//! Tick N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. BEGIN TICK                                                       │
//! │    └─ TickClock records the start                                   │
//! │                                                                     │
//! │ 2. LOGIC PHASE (main thread)                                        │
//! │    └─ Every NPC processes the tick, writing its transient state     │
//! │                                                                     │
//! │ 3. RESET PHASE (worker pool)                                        │
//! │    ├─ One reset task per active NPC                                 │
//! │    ├─ Main thread blocks on the completion barrier                  │
//! │    └─ NPCs that fail to reset are unregistered                      │
//! │                                                                     │
//! │ 4. END TICK                                                         │
//! │    └─ Record stats, wait for the next tick boundary                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tick N+1 never starts before every reset of tick N has landed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use emberline_core::{
    build_executor, EntityId, Executor, ResetDispatcher, ResetObserver, TickReport,
    TracingObserver, World,
};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::gameplay::{Npc, NpcType};

/// How often `run_for` logs a heartbeat.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(10);

/// Tiles between neighbouring spawn points.
const SPAWN_SPACING: f32 = 16.0;

/// Spawn points per row.
const SPAWN_COLUMNS: usize = 64;

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

// ============================================================================
// TICK CLOCK
// ============================================================================

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(budget: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: micros(budget),
            late_ticks: 0,
            total_ticks: 0,
        }
    }
}

/// Shortest tick budget a clock will pace to.
pub const MIN_TICK_BUDGET: Duration = Duration::from_micros(1);

/// Deadline-based tick pacing.
///
/// Tick `n` is due `n` budgets after the first tick began, so short ticks
/// do not make the schedule drift. A tick that overruns its deadline moves
/// the schedule to "now" instead of bursting to catch up.
#[derive(Debug)]
pub struct TickClock {
    /// Time allotted to one tick.
    budget: Duration,
    /// When the next tick is due. `None` until the first tick begins.
    deadline: Option<Instant>,
    /// Total ticks begun.
    tick_count: u64,
    /// Timing statistics.
    stats: TickStats,
}

impl TickClock {
    /// Creates a clock running at `tick_rate` ticks per second.
    ///
    /// Rates too high to express get [`MIN_TICK_BUDGET`].
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate` is zero.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        assert!(tick_rate > 0, "Tick rate must be greater than zero");

        let budget = (Duration::from_secs(1) / tick_rate).max(MIN_TICK_BUDGET);
        Self {
            budget,
            deadline: None,
            tick_count: 0,
            stats: TickStats::fresh(budget),
        }
    }

    /// Marks the start of a tick, schedules the next one and returns the
    /// start time.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        let now = Instant::now();
        self.tick_count += 1;

        let due = match self.deadline {
            Some(deadline) if deadline >= now => deadline,
            Some(deadline) => {
                tracing::trace!(
                    tick = self.tick_count,
                    behind_us = micros(now - deadline),
                    "schedule slipped"
                );
                now
            }
            None => now,
        };
        self.deadline = Some(due + self.budget);
        now
    }

    /// Marks the end of a tick started at `start`.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let duration_us = micros(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(duration_us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(duration_us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + duration_us) / 16;

        if duration > self.budget {
            self.stats.late_ticks += 1;
            tracing::debug!(
                tick = self.tick_count,
                took_us = duration_us,
                budget_us = micros(self.budget),
                "late tick"
            );
        }
    }

    /// Blocks until the next tick is due.
    ///
    /// Sleeps for most of the wait and spins for the final stretch.
    pub fn wait_for_next_tick(&self) {
        let Some(deadline) = self.deadline else {
            return;
        };

        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;
        if remaining > Duration::from_micros(1000) {
            std::thread::sleep(remaining - Duration::from_micros(500));
        }
        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }

    /// Returns how many ticks fit in `period`, at least one.
    #[must_use]
    pub fn ticks_per(&self, period: Duration) -> u64 {
        let ticks = period.as_nanos() / self.budget.as_nanos();
        u64::try_from(ticks).unwrap_or(u64::MAX).max(1)
    }

    /// Returns the number of ticks begun.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Returns the time allotted to one tick.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }
}

// ============================================================================
// SERVER STATS
// ============================================================================

/// What one call to [`GameServer::tick`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick number.
    pub tick: u64,
    /// NPCs that ran the logic phase.
    pub npcs_processed: usize,
    /// Reset phase outcome.
    pub reset: TickReport,
    /// Time spent in the logic phase.
    pub logic_time: Duration,
    /// Time spent in the whole tick.
    pub elapsed: Duration,
}

/// Totals across every tick the server has run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Ticks completed.
    pub ticks: u64,
    /// Resets that completed.
    pub resets_completed: u64,
    /// Resets that failed.
    pub reset_failures: u64,
    /// Resets the executor refused.
    pub resets_rejected: u64,
    /// NPCs removed after a failed reset.
    pub npcs_removed: u64,
    /// Slowest reset phase.
    pub slowest_reset_phase: Duration,
    /// Time spent in reset phases.
    pub total_reset_time: Duration,
}

impl ServerStats {
    /// Folds one reset phase into the totals.
    pub fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.resets_completed += report.succeeded as u64;
        self.reset_failures += report.failed as u64;
        self.resets_rejected += report.rejected as u64;
        self.npcs_removed += report.unregistered.len() as u64;
        self.slowest_reset_phase = self.slowest_reset_phase.max(report.elapsed);
        self.total_reset_time += report.elapsed;
    }

    /// Returns the mean reset phase duration.
    #[must_use]
    pub fn avg_reset_phase(&self) -> Duration {
        match u32::try_from(self.ticks) {
            Ok(0) => Duration::ZERO,
            Ok(ticks) => self.total_reset_time / ticks,
            Err(_) => Duration::from_secs_f64(self.total_reset_time.as_secs_f64() / self.ticks as f64),
        }
    }

    /// Logs the totals at info level.
    pub fn log_summary(&self) {
        tracing::info!(
            ticks = self.ticks,
            resets = self.resets_completed,
            failures = self.reset_failures,
            rejected = self.resets_rejected,
            removed = self.npcs_removed,
            avg_reset_us = micros(self.avg_reset_phase()),
            max_reset_us = micros(self.slowest_reset_phase),
            "server statistics"
        );
    }
}

// ============================================================================
// GAME SERVER
// ============================================================================

/// The authoritative server: owns the NPC world and drives the tick.
pub struct GameServer<X: ?Sized = dyn Executor> {
    world: Arc<World<Npc>>,
    dispatcher: ResetDispatcher<Npc, X>,
    clock: TickClock,
    tick: u64,
    next_npc_id: u32,
    stats: ServerStats,
}

impl GameServer {
    /// Builds a server with the executor and logging described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`](crate::ServerError::Config) for an
    /// invalid config and [`ServerError::Pool`](crate::ServerError::Pool) if
    /// the worker pool cannot start.
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let executor = build_executor(&config.reset)?;

        tracing::info!(
            tick_rate = config.tick_rate,
            workers = config.reset.worker_threads,
            max_entities = config.reset.max_entities,
            "game server created"
        );
        Ok(Self::with_executor(config, executor, Arc::new(TracingObserver)))
    }
}

impl<X: Executor + ?Sized> GameServer<X> {
    /// Builds a server around a caller-supplied executor and observer.
    ///
    /// # Panics
    ///
    /// Panics if `config.tick_rate` or `config.reset.max_entities` is zero;
    /// call [`ServerConfig::validate`] first.
    #[must_use]
    pub fn with_executor(
        config: &ServerConfig,
        executor: Arc<X>,
        observer: Arc<dyn ResetObserver>,
    ) -> Self {
        let world = Arc::new(World::with_config(&config.reset));
        let dispatcher = ResetDispatcher::from_config(Arc::clone(&world), executor, observer, &config.reset);

        Self {
            world,
            dispatcher,
            clock: TickClock::new(config.tick_rate),
            tick: 0,
            next_npc_id: 0,
            stats: ServerStats::default(),
        }
    }

    /// Spawns an NPC and registers it with the world.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::World`](crate::ServerError::World) if the
    /// world is full.
    pub fn spawn_npc(&mut self, npc_type: NpcType, position: [f32; 3]) -> ServerResult<EntityId> {
        let npc = Npc::new(self.next_npc_id, npc_type, position);
        let id = self.world.register(npc)?;
        self.next_npc_id = self.next_npc_id.wrapping_add(1);

        tracing::trace!(entity = %id, kind = npc_type.name(), "spawned npc");
        Ok(id)
    }

    /// Spawns `count` NPCs on a grid, rotating through every type.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::World`](crate::ServerError::World) if the
    /// world fills up; NPCs spawned before that stay registered.
    #[allow(clippy::cast_precision_loss)]
    pub fn populate(&mut self, count: usize) -> ServerResult<Vec<EntityId>> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let x = (i % SPAWN_COLUMNS) as f32 * SPAWN_SPACING;
            let z = (i / SPAWN_COLUMNS) as f32 * SPAWN_SPACING;
            let npc_type = NpcType::ALL[i % NpcType::ALL.len()];
            ids.push(self.spawn_npc(npc_type, [x, 0.0, z])?);
        }

        tracing::info!(spawned = count, live = self.world.len(), "world populated");
        Ok(ids)
    }

    /// Corrupts a live NPC so its next reset fails.
    ///
    /// Returns false if `id` is not live.
    pub fn poison(&self, id: EntityId) -> bool {
        match self.world.get(id) {
            Some(cell) => {
                cell.lock().poison();
                tracing::debug!(entity = %id, "poisoned npc");
                true
            }
            None => false,
        }
    }

    /// Runs one tick: NPC logic, then the parallel reset phase.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tick`](crate::ServerError::Tick) if the reset
    /// phase stalls past the configured barrier timeout. Individual NPC
    /// reset failures are not errors.
    pub fn tick(&mut self) -> ServerResult<TickSummary> {
        let start = Instant::now();
        let tick = self.tick;

        let mut npcs_processed = 0;
        self.world.for_each_active(|_, npc| {
            npc.process(tick);
            npcs_processed += 1;
        });
        let logic_time = start.elapsed();

        let reset = self.dispatcher.run_reset_phase(tick)?;
        self.stats.record(&reset);
        self.tick += 1;

        Ok(TickSummary {
            tick,
            npcs_processed,
            reset,
            logic_time,
            elapsed: start.elapsed(),
        })
    }

    /// Runs `ticks` ticks at the configured tick rate.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first tick error.
    pub fn run_for(&mut self, ticks: u64) -> ServerResult<&ServerStats> {
        let heartbeat = self.clock.ticks_per(HEARTBEAT_PERIOD);

        for _ in 0..ticks {
            let start = self.clock.begin_tick();
            let summary = self.tick()?;
            self.clock.end_tick(start);

            if (summary.tick + 1) % heartbeat == 0 {
                tracing::info!(
                    tick = summary.tick,
                    npcs = self.world.len(),
                    removed = self.stats.npcs_removed,
                    avg_tick_us = self.clock.stats().avg_tick_us,
                    "heartbeat"
                );
            }

            self.clock.wait_for_next_tick();
        }

        Ok(&self.stats)
    }

    /// Returns the NPC world.
    #[must_use]
    pub fn world(&self) -> &Arc<World<Npc>> {
        &self.world
    }

    /// Returns the number of completed ticks.
    #[inline]
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Returns accumulated statistics.
    #[must_use]
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the tick clock.
    #[must_use]
    pub fn clock(&self) -> &TickClock {
        &self.clock
    }
}

impl<X: ?Sized> std::fmt::Debug for GameServer<X> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("tick", &self.tick)
            .field("npcs", &self.world.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberline_core::{InlineExecutor, RecordingObserver, ResetConfig, WorkerPool};

    fn test_config(workers: usize) -> ServerConfig {
        ServerConfig {
            tick_rate: 1000,
            npc_count: 0,
            reset: ResetConfig {
                worker_threads: workers,
                max_entities: 256,
                ..ResetConfig::default()
            },
        }
    }

    #[test]
    fn test_tick_clock_creation() {
        let clock = TickClock::new(60);
        assert_eq!(clock.tick_count(), 0);
        assert_eq!(clock.budget(), Duration::from_nanos(16_666_666));
        assert_eq!(clock.ticks_per(Duration::from_secs(10)), 600);
    }

    #[test]
    fn test_extreme_rate_gets_minimum_budget() {
        let clock = TickClock::new(u32::MAX);
        assert_eq!(clock.budget(), MIN_TICK_BUDGET);
        assert_eq!(clock.ticks_per(Duration::from_secs(1)), 1_000_000);
        assert_eq!(clock.ticks_per(Duration::ZERO), 1);
    }

    #[test]
    fn test_tick_clock_stats() {
        let mut clock = TickClock::new(1000);

        for _ in 0..5 {
            let start = clock.begin_tick();
            std::thread::sleep(Duration::from_micros(50));
            clock.end_tick(start);
            clock.wait_for_next_tick();
        }

        let stats = clock.stats();
        assert_eq!(clock.tick_count(), 5);
        assert_eq!(stats.total_ticks, 5);
        assert!(stats.min_tick_us > 0);
        assert!(stats.min_tick_us <= stats.max_tick_us);
    }

    #[test]
    fn test_wait_paces_ticks() {
        let mut clock = TickClock::new(100);
        let began = Instant::now();

        for _ in 0..3 {
            let start = clock.begin_tick();
            clock.end_tick(start);
            clock.wait_for_next_tick();
        }

        assert!(began.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_slow_tick_does_not_cause_burst() {
        let mut clock = TickClock::new(200);

        let start = clock.begin_tick();
        std::thread::sleep(Duration::from_millis(20));
        clock.end_tick(start);
        assert_eq!(clock.stats().late_ticks, 1);

        // The overrun tick's deadline has passed, so the next one is due
        // a full budget after it begins.
        let resumed = clock.begin_tick();
        clock.end_tick(resumed);
        clock.wait_for_next_tick();
        assert!(resumed.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn test_server_stats_record() {
        let mut stats = ServerStats::default();
        assert_eq!(stats.avg_reset_phase(), Duration::ZERO);

        stats.record(&TickReport {
            tick: 0,
            dispatched: 4,
            succeeded: 3,
            failed: 1,
            rejected: 0,
            unregistered: vec![EntityId::new(2, 0)],
            elapsed: Duration::from_micros(300),
        });
        stats.record(&TickReport {
            tick: 1,
            dispatched: 3,
            succeeded: 3,
            elapsed: Duration::from_micros(100),
            ..TickReport::default()
        });

        assert_eq!(stats.ticks, 2);
        assert_eq!(stats.resets_completed, 6);
        assert_eq!(stats.reset_failures, 1);
        assert_eq!(stats.npcs_removed, 1);
        assert_eq!(stats.slowest_reset_phase, Duration::from_micros(300));
        assert_eq!(stats.avg_reset_phase(), Duration::from_micros(200));
    }

    #[test]
    fn test_tick_resets_every_npc() {
        let config = test_config(2);
        let pool = Arc::new(WorkerPool::from_config(&config.reset).unwrap());
        let mut server = GameServer::with_executor(&config, pool, Arc::new(RecordingObserver::new()));
        server.populate(30).unwrap();

        let summary = server.tick().unwrap();

        assert_eq!(summary.tick, 0);
        assert_eq!(summary.npcs_processed, 30);
        assert_eq!(summary.reset.succeeded, 30);
        assert!(server
            .world()
            .active()
            .iter()
            .all(|cell| !cell.lock().has_pending_updates()));
    }

    #[test]
    fn test_poisoned_npc_removed_after_one_tick() {
        let config = test_config(0);
        let observer = Arc::new(RecordingObserver::new());
        let mut server = GameServer::with_executor(
            &config,
            Arc::new(InlineExecutor),
            Arc::clone(&observer) as Arc<dyn ResetObserver>,
        );
        let ids = server.populate(5).unwrap();
        assert!(server.poison(ids[2]));

        let summary = server.tick().unwrap();

        assert_eq!(summary.reset.failed, 1);
        assert_eq!(summary.reset.unregistered, vec![ids[2]]);
        assert!(!server.world().contains(ids[2]));
        assert_eq!(observer.failure_count(), 1);
        assert!(!server.poison(ids[2]));

        let next = server.tick().unwrap();
        assert_eq!(next.npcs_processed, 4);
        assert!(next.reset.is_clean());
    }

    #[test]
    fn test_populate_stops_when_full() {
        let mut config = test_config(0);
        config.reset.max_entities = 4;
        let mut server = GameServer::with_executor(&config, Arc::new(InlineExecutor), Arc::new(RecordingObserver::new()));

        assert!(matches!(server.populate(6), Err(crate::ServerError::World(_))));
        assert_eq!(server.world().len(), 4);
    }

    #[test]
    fn test_run_for_counts_ticks() {
        let mut server = GameServer::from_config(&test_config(2)).unwrap();
        server.populate(12).unwrap();

        let stats = server.run_for(10).unwrap().clone();

        assert_eq!(stats.ticks, 10);
        assert_eq!(stats.resets_completed, 120);
        assert_eq!(server.tick_count(), 10);
        assert_eq!(server.clock().tick_count(), 10);
    }

    #[test]
    fn test_unvalidated_huge_tick_rate_still_runs() {
        let mut config = test_config(0);
        config.tick_rate = 2_000_000;
        let mut server = GameServer::with_executor(&config, Arc::new(InlineExecutor), Arc::new(RecordingObserver::new()));
        server.populate(3).unwrap();

        let stats = server.run_for(1).unwrap();

        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.resets_completed, 3);
        assert_eq!(server.clock().budget(), MIN_TICK_BUDGET);
    }
}
