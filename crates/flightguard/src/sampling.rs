//! The sampling loop.
//!
//! Runs at the higher rate. Each cycle:
//!
//! 1. applies pending operator commands,
//! 2. ingests pending GPS bytes,
//! 3. reads the accelerometer (a short read ends the cycle here),
//! 4. reads the acoustic level,
//! 5. estimates orientation and publishes the fused reading,
//! 6. reads back the latest verdict,
//! 7. emits one status line and offers it to the flight log.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::intake::{ArmState, CommandIntake, NullSource, PositionIntake};
use crate::orientation::OrientationEstimator;
use crate::schedule::PeriodicTask;
use crate::sensors::{noise_level, AcousticSensor, MotionSensor, ACOUSTIC_FULL_SCALE};
use crate::status::StatusRecord;
use crate::storage::{LoggedRecord, RecordSink};
use crate::telemetry::{FusedReading, TelemetryPort, TelemetryStore};

/// Default period between sampling cycles.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(10);

/// Default bound on acquiring the telemetry lock to publish.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(5);

/// Default bound on acquiring the telemetry lock to read the verdict.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Counters for one sampling loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplingStats {
    /// Cycles run.
    pub cycles: u64,
    /// Status records emitted.
    pub emitted: u64,
    /// Cycles skipped on a short sensor read.
    pub short_reads: u64,
    /// Fused readings not published because the lock was busy.
    pub missed_publishes: u64,
    /// Status lines that could not be written.
    pub write_errors: u64,
}

/// High-rate sensor fusion and reporting.
pub struct SamplingLoop {
    motion: Box<dyn MotionSensor>,
    acoustic: Box<dyn AcousticSensor>,
    estimator: OrientationEstimator,
    full_scale: u16,
    commands: CommandIntake,
    position: PositionIntake,
    publish: TelemetryPort,
    verdict: TelemetryPort,
    output: Box<dyn Write + Send>,
    recorder: Option<RecordSink>,
    session: Option<String>,
    period: Duration,
    stats: SamplingStats,
}

impl fmt::Debug for SamplingLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplingLoop")
            .field("estimator", &self.estimator)
            .field("commands", &self.commands)
            .field("position", &self.position)
            .field("period", &self.period)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SamplingLoop {
    /// Create a loop with default timing, no operator link and no GPS.
    #[must_use]
    pub fn new(
        store: Arc<TelemetryStore>,
        motion: Box<dyn MotionSensor>,
        acoustic: Box<dyn AcousticSensor>,
        output: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            motion,
            acoustic,
            estimator: OrientationEstimator::default(),
            full_scale: ACOUSTIC_FULL_SCALE,
            commands: CommandIntake::new(Box::new(NullSource), ArmState::new()),
            position: PositionIntake::new(Box::new(NullSource)),
            publish: TelemetryPort::new(Arc::clone(&store), DEFAULT_PUBLISH_TIMEOUT),
            verdict: TelemetryPort::new(store, DEFAULT_READ_TIMEOUT),
            output,
            recorder: None,
            session: None,
            period: DEFAULT_PERIOD,
            stats: SamplingStats::default(),
        }
    }

    /// Read operator commands from `commands`.
    #[must_use]
    pub fn with_commands(mut self, commands: CommandIntake) -> Self {
        self.commands = commands;
        self
    }

    /// Read GPS from `position`.
    #[must_use]
    pub fn with_position(mut self, position: PositionIntake) -> Self {
        self.position = position;
        self
    }

    /// Offer every record to the flight log, tagged with `session`.
    #[must_use]
    pub fn with_recorder(mut self, sink: RecordSink, session: Option<String>) -> Self {
        self.recorder = Some(sink);
        self.session = session;
        self
    }

    /// Override the cycle period.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Override the lock bounds for publishing and reading.
    #[must_use]
    pub fn with_timeouts(mut self, publish: Duration, read: Duration) -> Self {
        self.publish = TelemetryPort::new(self.publish.store(), publish);
        self.verdict = TelemetryPort::new(self.verdict.store(), read);
        self
    }

    /// Override the orientation estimator.
    #[must_use]
    pub fn with_estimator(mut self, estimator: OrientationEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// Override the acoustic full-scale value.
    #[must_use]
    pub fn with_full_scale(mut self, full_scale: u16) -> Self {
        self.full_scale = full_scale;
        self
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SamplingStats {
        self.stats
    }

    /// The arm state updated by this loop's command intake.
    #[must_use]
    pub fn arm_state(&self) -> &ArmState {
        self.commands.arm_state()
    }

    /// Run one cycle and return the record emitted, if any.
    pub fn run_cycle(&mut self) -> Option<StatusRecord> {
        self.stats.cycles += 1;

        self.commands.poll();
        let fix = self.position.poll();

        let Some(sample) = self.motion.read_sample() else {
            self.stats.short_reads += 1;
            return None;
        };
        let noise = noise_level(self.acoustic.read_raw(), self.full_scale);

        let reading = FusedReading::new(self.estimator.estimate(sample), noise);
        if !self.publish.write_fused(reading) {
            self.stats.missed_publishes += 1;
        }

        let result = self.verdict.read_result();
        let record =
            StatusRecord::from_cycle(&reading, result, &fix, self.commands.arm_state().is_armed());

        self.emit(&record);
        if let Some(sink) = &self.recorder {
            sink.offer(LoggedRecord::now(record, self.session.clone()));
        }
        Some(record)
    }

    fn emit(&mut self, record: &StatusRecord) {
        let written = writeln!(self.output, "{record}").and_then(|()| self.output.flush());
        match written {
            Ok(()) => self.stats.emitted += 1,
            Err(e) => {
                self.stats.write_errors += 1;
                if self.stats.write_errors.is_power_of_two() {
                    warn!(error = %e, failures = self.stats.write_errors, "status output failed");
                }
            }
        }
    }
}

impl PeriodicTask for SamplingLoop {
    fn name(&self) -> &'static str {
        "sampling"
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick(&mut self) {
        self.run_cycle();
    }
}
