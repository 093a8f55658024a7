//! MPU-6050 accelerometer over I2C.

use std::fmt;

use embedded_hal::i2c::{Error as _, I2c};
use tracing::{debug, info};

use super::MotionSensor;
use crate::error::{Error, Result};
use crate::orientation::RawMotionSample;

/// Default 7-bit device address (AD0 low).
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// Power management register; writing 0 leaves sleep mode.
pub const PWR_MGMT_1: u8 = 0x6B;

/// First accelerometer data register (`ACCEL_XOUT_H`).
pub const ACCEL_XOUT_H: u8 = 0x3B;

/// MPU-6050 driver.
pub struct Mpu6050<I> {
    i2c: I,
    address: u8,
    wake_register: u8,
    data_register: u8,
    short_reads: u64,
}

impl<I> fmt::Debug for Mpu6050<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mpu6050")
            .field("address", &format_args!("{:#04x}", self.address))
            .field("short_reads", &self.short_reads)
            .finish_non_exhaustive()
    }
}

impl<I: I2c> Mpu6050<I> {
    /// Create a driver at the default address and registers.
    #[must_use]
    pub fn new(i2c: I) -> Self {
        Self::with_registers(i2c, DEFAULT_ADDRESS, PWR_MGMT_1, ACCEL_XOUT_H)
    }

    /// Create a driver with explicit address and registers.
    #[must_use]
    pub fn with_registers(i2c: I, address: u8, wake_register: u8, data_register: u8) -> Self {
        Self {
            i2c,
            address,
            wake_register,
            data_register,
            short_reads: 0,
        }
    }

    /// Take the device out of sleep mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus write fails.
    pub fn wake(&mut self) -> Result<()> {
        self.i2c
            .write(self.address, &[self.wake_register, 0])
            .map_err(|e| bus_error(self.address, &e))?;
        info!(address = %format!("{:#04x}", self.address), "motion sensor awake");
        Ok(())
    }

    /// Reads that failed and skipped a cycle.
    #[must_use]
    pub fn short_reads(&self) -> u64 {
        self.short_reads
    }

    /// Give the bus back.
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c + Send> MotionSensor for Mpu6050<I> {
    fn read_sample(&mut self) -> Option<RawMotionSample> {
        let mut block = [0_u8; 6];
        match self
            .i2c
            .write_read(self.address, &[self.data_register], &mut block)
        {
            Ok(()) => Some(RawMotionSample::from_be_bytes(block)),
            Err(e) => {
                self.short_reads += 1;
                debug!(kind = %e.kind(), "accelerometer read failed");
                None
            }
        }
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(address: u8, e: &E) -> Error {
    Error::bus(address, format!("{} ({e:?})", e.kind()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    use super::*;

    /// Register file behind an auto-incrementing register pointer.
    #[derive(Default)]
    struct MemoryBus {
        registers: HashMap<(u8, u8), u8>,
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl ErrorType for MemoryBus {
        type Error = ErrorKind;
    }

    impl I2c for MemoryBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), ErrorKind> {
            if self.fail {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            let mut pointer = 0_u8;
            for op in operations {
                match op {
                    Operation::Write(bytes) => {
                        let Some((&register, values)) = bytes.split_first() else {
                            continue;
                        };
                        pointer = register;
                        if !values.is_empty() {
                            self.writes.push((address, bytes.to_vec()));
                        }
                        for &value in values {
                            self.registers.insert((address, pointer), value);
                            pointer = pointer.wrapping_add(1);
                        }
                    }
                    Operation::Read(buf) => {
                        for slot in buf.iter_mut() {
                            *slot = self
                                .registers
                                .get(&(address, pointer))
                                .copied()
                                .unwrap_or(0);
                            pointer = pointer.wrapping_add(1);
                        }
                    }
                }
            }
            Ok(())
        }
    }

    fn bus_with_sample(x: i16, y: i16, z: i16) -> MemoryBus {
        let mut bus = MemoryBus::default();
        let bytes = [x.to_be_bytes(), y.to_be_bytes(), z.to_be_bytes()].concat();
        for (i, b) in bytes.into_iter().enumerate() {
            bus.registers
                .insert((DEFAULT_ADDRESS, ACCEL_XOUT_H + u8::try_from(i).unwrap()), b);
        }
        bus
    }

    #[test]
    fn test_wake_writes_zero_to_power_register() {
        let mut mpu = Mpu6050::new(MemoryBus::default());
        mpu.wake().unwrap();
        let bus = mpu.release();
        assert_eq!(bus.writes, vec![(0x68, vec![0x6B, 0])]);
    }

    #[test]
    fn test_wake_failure_is_error() {
        let mut mpu = Mpu6050::new(MemoryBus {
            fail: true,
            ..MemoryBus::default()
        });
        let err = mpu.wake().unwrap_err();
        assert!(matches!(err, Error::Bus { address: 0x68, .. }));
        assert!(err.to_string().contains("0x68"));
    }

    #[test]
    fn test_read_sample_decodes_big_endian() {
        let mut mpu = Mpu6050::new(bus_with_sample(-200, 16384, 300));
        assert_eq!(
            mpu.read_sample(),
            Some(RawMotionSample::new(-200, 16384, 300))
        );
        assert_eq!(mpu.short_reads(), 0);
    }

    #[test]
    fn test_read_does_not_write_registers() {
        let mut mpu = Mpu6050::new(bus_with_sample(1, 2, 3));
        assert!(mpu.read_sample().is_some());
        assert!(mpu.release().writes.is_empty());
    }

    #[test]
    fn test_bus_failure_yields_none() {
        let mut mpu = Mpu6050::new(MemoryBus {
            fail: true,
            ..MemoryBus::default()
        });
        assert_eq!(mpu.read_sample(), None);
        assert_eq!(mpu.read_sample(), None);
        assert_eq!(mpu.short_reads(), 2);
    }

    #[test]
    fn test_custom_registers() {
        let mut bus = MemoryBus::default();
        bus.registers.insert((0x69, 0x10), 0x7F);
        bus.registers.insert((0x69, 0x11), 0xFF);
        let mut mpu = Mpu6050::with_registers(bus, 0x69, 0x20, 0x10);
        mpu.wake().unwrap();

        let sample = mpu.read_sample().unwrap();
        assert_eq!(sample.x, i16::MAX);
        assert_eq!(mpu.release().writes, vec![(0x69, vec![0x20, 0])]);
    }
}
