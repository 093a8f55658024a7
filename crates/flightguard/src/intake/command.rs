//! Operator commands.
//!
//! The link carries newline-delimited text. A line containing `DISARM`
//! disarms; otherwise a line containing `ARM` arms. Anything else is ignored
//! and nothing is acknowledged.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::source::{take_lines, ByteSource};

/// Longest partial command line kept while waiting for its newline.
const MAX_COMMAND_LINE: usize = 256;

/// Arm/disarm flag shared between the command intake and its readers.
#[derive(Debug, Clone, Default)]
pub struct ArmState {
    armed: Arc<AtomicBool>,
}

impl ArmState {
    /// Create a disarmed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the vehicle is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Set the flag.
    pub fn set(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }
}

/// A recognized operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Arm the vehicle.
    Arm,
    /// Disarm the vehicle.
    Disarm,
}

impl Command {
    /// Interpret one line.
    ///
    /// `DISARM` is checked first since it contains `ARM`.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        if line.contains("DISARM") {
            Some(Self::Disarm)
        } else if line.contains("ARM") {
            Some(Self::Arm)
        } else {
            None
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm => write!(f, "ARM"),
            Self::Disarm => write!(f, "DISARM"),
        }
    }
}

/// Turns link bytes into [`ArmState`] changes.
pub struct CommandIntake {
    source: Box<dyn ByteSource>,
    buffer: Vec<u8>,
    arm: ArmState,
}

impl fmt::Debug for CommandIntake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandIntake")
            .field("buffered", &self.buffer.len())
            .field("arm", &self.arm)
            .finish_non_exhaustive()
    }
}

impl CommandIntake {
    /// Create an intake reading from `source` and updating `arm`.
    #[must_use]
    pub fn new(source: Box<dyn ByteSource>, arm: ArmState) -> Self {
        Self {
            source,
            buffer: Vec::new(),
            arm,
        }
    }

    /// The arm state this intake updates.
    #[must_use]
    pub fn arm_state(&self) -> &ArmState {
        &self.arm
    }

    /// Drain pending bytes and apply every complete command line.
    ///
    /// Returns the commands applied, in order.
    pub fn poll(&mut self) -> Vec<Command> {
        if self.source.drain_into(&mut self.buffer) == 0 && self.buffer.is_empty() {
            return Vec::new();
        }

        let mut applied = Vec::new();
        for line in take_lines(&mut self.buffer, MAX_COMMAND_LINE) {
            match Command::parse(&line) {
                Some(cmd) => {
                    self.arm.set(cmd == Command::Arm);
                    info!(command = %cmd, "operator command");
                    applied.push(cmd);
                }
                None => debug!(line = %line, "ignored link line"),
            }
        }
        applied
    }
}
