//! Platform-agnostic MPU-6050 to SPI slave bridge.
//!
//! A [`Sampler`] reads accelerometer, gyroscope and temperature data over
//! I2C via [embedded-hal] and publishes it into a [`SampleBuffer`]. A
//! [`TransferEngine`], driven from the SPI transfer-complete interrupt,
//! streams the triple selected by the bus master one byte per exchange.
//! The accelerometer side implements the [`RawAccelerometer` trait][trait]
//! from the `accelerometer` crate.
//!
//! ```
//! use mpu6050_spi_bridge::{SampleBuffer, SpiSlavePort, TransferEngine, I16x3, ACCEL_TAG};
//!
//! static SAMPLES: SampleBuffer = SampleBuffer::new();
//!
//! // main loop side, normally `Sampler::refresh`
//! SAMPLES.publish(
//!     I16x3::new(4660, 22136, 30612),
//!     I16x3::new(0, 0, 0),
//!     I16x3::new(24, 24, 24),
//! );
//!
//! // interrupt side
//! let mut port = SpiSlavePort::new(TransferEngine::new(&SAMPLES));
//! port.exchange(ACCEL_TAG);
//! let mut rx = [0u8; 6];
//! port.transfer_in_place(&mut rx);
//! assert_eq!(rx, [0x12, 0x34, 0x56, 0x78, 0x77, 0x94]);
//! ```
//!
//! [embedded-hal]: https://docs.rs/embedded-hal
//! [trait]: https://docs.rs/accelerometer/latest/accelerometer/trait.RawAccelerometer.html
//!

#![deny(missing_docs)]
#![deny(warnings)]
#![no_std]
#![forbid(unsafe_code)]

mod buffer;
mod engine;
mod log;
mod reg;

#[cfg(feature = "async")]
pub mod asynch;

use core::fmt::{self, Debug};

#[cfg(feature = "out_f32")]
pub use accelerometer::vector::F32x3;
pub use accelerometer::vector::I16x3;
pub use accelerometer::{Accelerometer, Error, ErrorKind, RawAccelerometer};
#[cfg(feature = "out_f32")]
use cast::u16;
use cast::{f32, i16};
use embedded_hal as hal;
use hal::i2c::{ErrorType, I2c};
#[cfg(feature = "out_f32")]
use num_traits::FromPrimitive;

pub use crate::buffer::{SampleBuffer, TripleSource};
pub use crate::engine::{
    high_byte, low_byte, Cursor, EngineState, Half, Selection, Slot, SpiSlavePort,
    TransferEngine, ACCEL_TAG, GYRO_TAG, TEMP_TAG,
};
use crate::reg::*;
pub use crate::reg::{AccelRange, Dlpf, GyroRange};

/// Possible slave addresses
pub enum SlaveAddr {
    /// Default slave address
    Default,
    /// Alternative slave address providing bit value for `AD0`
    Alternative(bool),
}

impl SlaveAddr {
    fn addr(self) -> u8 {
        match self {
            SlaveAddr::Default => I2C_SAD,
            SlaveAddr::Alternative(ad0) => I2C_SAD | ad0 as u8,
        }
    }
}

/// Device configuration applied by [`Mpu6050::init`]
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Gyroscope full-scale range
    pub gyro_range: GyroRange,
    /// Accelerometer full-scale range
    pub accel_range: AccelRange,
    /// Digital low-pass filter
    pub dlpf: Dlpf,
    /// `SMPLRT_DIV`, sample rate = gyroscope output rate / (1 + divider)
    pub sample_rate_divider: u8,
}

impl Default for Config {
    /// ±500 °/s, ±8 g, filter off, full rate
    fn default() -> Self {
        Self {
            gyro_range: GyroRange::Dps500,
            accel_range: AccelRange::G8,
            dlpf: Dlpf::Hz260,
            sample_rate_divider: 0,
        }
    }
}

/// One complete sensor read-out, as published by the [`Sampler`]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Reading {
    /// Raw acceleration
    pub accel: I16x3,
    /// Raw angular rate
    pub gyro: I16x3,
    /// Raw `TEMP_OUT`
    pub temp_raw: i16,
}

impl Reading {
    /// Temperature in °C
    pub fn temperature_celsius(&self) -> f32 {
        f32(self.temp_raw) / TEMP_SENSITIVITY + TEMP_OFFSET
    }

    /// Temperature in °C truncated toward zero
    pub fn temperature(&self) -> i16 {
        celsius_to_i16(self.temperature_celsius())
    }

    /// Temperature replicated into all three components,
    /// the form streamed for [`Selection::Temperature`]
    pub fn temperature_triple(&self) -> I16x3 {
        let t = self.temperature();
        I16x3::new(t, t, t)
    }
}

fn celsius_to_i16(celsius: f32) -> i16 {
    // the sensor range is -40..85 °C, conversion can not fail
    i16(celsius).unwrap_or(0)
}

impl fmt::Display for Reading {
    /// Operator line, e.g.
    /// `aX =   4660 | aY =  22136 | aZ =  30612 | gX = ... | tmp = 36.65`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aX = {:6} | aY = {:6} | aZ = {:6} | gX = {:6} | gY = {:6} | gZ = {:6} | tmp = {:.2}",
            self.accel.x,
            self.accel.y,
            self.accel.z,
            self.gyro.x,
            self.gyro.y,
            self.gyro.z,
            self.temperature_celsius(),
        )
    }
}

/// Failure of [`Sampler::refresh`]
#[derive(Debug)]
pub enum RefreshError<E: Debug> {
    /// The sensor did not complete a bus transaction,
    /// the sample buffer keeps its previous content
    SensorUnavailable(Error<E>),
}

impl<E: Debug> From<Error<E>> for RefreshError<E> {
    fn from(e: Error<E>) -> Self {
        RefreshError::SensorUnavailable(e)
    }
}

pub(crate) fn publish(buffer: &SampleBuffer, reading: &Reading) {
    buffer.publish(reading.accel, reading.gyro, reading.temperature_triple());
}

#[inline]
pub(crate) fn be_triple(buf: &[u8; 6]) -> I16x3 {
    I16x3::new(
        be_i16(buf[0], buf[1]),
        be_i16(buf[2], buf[3]),
        be_i16(buf[4], buf[5]),
    )
}

#[inline]
pub(crate) fn be_i16(high: u8, low: u8) -> i16 {
    i16::from_be_bytes([high, low])
}

/// `MPU-6050` driver
pub struct Mpu6050<I2C> {
    /// The concrete I²C device implementation
    i2c: I2C,
    /// The I²C device slave address
    addr: u8,
    /// Current gyroscope full-scale
    #[cfg(feature = "out_f32")]
    gyro_range: GyroRange,
    /// Current accelerometer full-scale
    #[cfg(feature = "out_f32")]
    accel_range: AccelRange,
}

impl<I2C, E> Mpu6050<I2C>
where
    I2C: I2c + ErrorType<Error = E>,
    E: Debug,
{
    /// Create a new `MPU-6050` driver from the given `I2C` peripheral
    pub fn new(i2c: I2C, addr: SlaveAddr) -> Result<Self, Error<E>> {
        let mut dev = Self {
            i2c,
            addr: addr.addr(),
            #[cfg(feature = "out_f32")]
            gyro_range: GyroRange::Dps250,
            #[cfg(feature = "out_f32")]
            accel_range: AccelRange::G2,
        };

        // Ensure we have the correct device ID
        if dev.get_device_id()? != DEVICE_ID {
            crate::log::log_warn!("unexpected WHO_AM_I");
            ErrorKind::Device.err()?;
        }

        Ok(dev)
    }

    /// Destroy driver instance, return `I2C` bus instance
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    /// `WHO_AM_I` register
    pub fn get_device_id(&mut self) -> Result<u8, Error<E>> {
        self.read_reg(Register::WHO_AM_I).map_err(Into::into)
    }

    /// Leave sleep mode, internal oscillator as clock source,
    /// `PWR_MGMT_1` = 0
    pub fn wake(&mut self) -> Result<(), Error<E>> {
        self.write_reg(Register::PWR_MGMT_1, PWR_MGMT_1_WAKE)?;
        Ok(())
    }

    /// Sleep mode,
    /// `PWR_MGMT_1`: `SLEEP`
    pub fn set_sleep(&mut self, sleep: bool) -> Result<(), Error<E>> {
        self.modify_reg(Register::PWR_MGMT_1, |v| {
            if sleep {
                v | SLEEP
            } else {
                v & !SLEEP
            }
        })?;
        Ok(())
    }

    /// Sleep mode,
    /// `PWR_MGMT_1`: `SLEEP`
    pub fn is_sleeping(&mut self) -> Result<bool, Error<E>> {
        let reg = self.read_reg(Register::PWR_MGMT_1)?;
        Ok((reg & SLEEP) != 0)
    }

    /// Full-scale selection,
    /// `GYRO_CONFIG`: `FS_SEL`, `ACCEL_CONFIG`: `AFS_SEL`,
    /// written in one auto-incrementing transaction
    pub fn set_ranges(&mut self, gyro: GyroRange, accel: AccelRange) -> Result<(), Error<E>> {
        self.i2c.write(
            self.addr,
            &[Register::GYRO_CONFIG.addr(), gyro.bits(), accel.bits()],
        )?;
        #[cfg(feature = "out_f32")]
        {
            self.gyro_range = gyro;
            self.accel_range = accel;
        }
        Ok(())
    }

    /// Digital low-pass filter,
    /// `CONFIG`: `DLPF_CFG`
    pub fn set_dlpf(&mut self, dlpf: Dlpf) -> Result<(), Error<E>> {
        self.modify_reg(Register::CONFIG, |v| {
            (v & !DLPF_CFG_MASK) | (dlpf as u8)
        })?;
        Ok(())
    }

    /// Sample rate divider,
    /// `SMPLRT_DIV`
    pub fn set_sample_rate_divider(&mut self, div: u8) -> Result<(), Error<E>> {
        self.write_reg(Register::SMPLRT_DIV, div)?;
        Ok(())
    }

    /// Sample rate divider,
    /// `SMPLRT_DIV`
    pub fn get_sample_rate_divider(&mut self) -> Result<u8, Error<E>> {
        self.read_reg(Register::SMPLRT_DIV).map_err(Into::into)
    }

    /// Wake the device and apply `config`
    pub fn init(&mut self, config: &Config) -> Result<(), Error<E>> {
        self.wake()?;
        self.set_ranges(config.gyro_range, config.accel_range)?;
        self.set_dlpf(config.dlpf)?;
        self.set_sample_rate_divider(config.sample_rate_divider)?;
        crate::log::log_debug!("device configured");
        Ok(())
    }

    /// Angular rate,
    /// `GYRO_XOUT_H` .. `GYRO_ZOUT_L`
    pub fn gyro_raw(&mut self) -> Result<I16x3, Error<E>> {
        let mut buf = [0u8; 6];
        self.read_regs(Register::GYRO_XOUT_H, &mut buf)?;
        Ok(be_triple(&buf))
    }

    /// Angular rate in °/s
    #[cfg(feature = "out_f32")]
    pub fn gyro_norm(&mut self) -> Result<F32x3, Error<E>> {
        let raw = self.gyro_raw()?;
        Ok(F32x3::new(
            self.gyro_range.convert_out_i16tof32(raw.x),
            self.gyro_range.convert_out_i16tof32(raw.y),
            self.gyro_range.convert_out_i16tof32(raw.z),
        ))
    }

    /// Temperature sensor data,
    /// `TEMP_OUT_H`, `TEMP_OUT_L`
    pub fn temp_raw(&mut self) -> Result<i16, Error<E>> {
        let mut buf = [0u8; 2];
        self.read_regs(Register::TEMP_OUT_H, &mut buf)?;
        Ok(be_i16(buf[0], buf[1]))
    }

    /// Acceleration, angular rate and temperature,
    /// in that order and one transaction each
    pub fn read_all(&mut self) -> Result<Reading, Error<E>> {
        let accel = self.accel_raw()?;
        let gyro = self.gyro_raw()?;
        let temp_raw = self.temp_raw()?;
        Ok(Reading {
            accel,
            gyro,
            temp_raw,
        })
    }

    /// Dump registers
    #[cfg(debug_assertions)]
    pub fn dump_regs<W>(&mut self, w: &mut W) -> Result<(), Error<E>>
    where
        W: fmt::Write,
    {
        let regs = [
            ("SMPLRT_DIV (19h)", Register::SMPLRT_DIV),
            ("CONFIG (1Ah)", Register::CONFIG),
            ("GYRO_CONFIG (1Bh)", Register::GYRO_CONFIG),
            ("ACCEL_CONFIG (1Ch)", Register::ACCEL_CONFIG),
            ("PWR_MGMT_1 (6Bh)", Register::PWR_MGMT_1),
            ("PWR_MGMT_2 (6Ch)", Register::PWR_MGMT_2),
        ];
        for (name, reg) in regs {
            let value = self.read_reg(reg)?;
            if writeln!(w, "{} = {:#010b}", name, value).is_err() {
                break;
            }
        }
        Ok(())
    }

    #[inline]
    fn read_reg(&mut self, reg: Register) -> Result<u8, E> {
        let mut buf = [0u8];
        self.i2c.write_read(self.addr, &[reg.addr()], &mut buf)?;
        Ok(buf[0])
    }

    /// Burst read, the register pointer auto-increments
    #[inline]
    fn read_regs(&mut self, reg: Register, buffer: &mut [u8]) -> Result<(), E> {
        self.i2c.write_read(self.addr, &[reg.addr()], buffer)
    }

    #[inline]
    fn write_reg(&mut self, reg: Register, val: u8) -> Result<(), E> {
        self.i2c.write(self.addr, &[reg.addr(), val])
    }

    #[inline]
    fn modify_reg<F>(&mut self, reg: Register, f: F) -> Result<(), E>
    where
        F: FnOnce(u8) -> u8,
    {
        let r = self.read_reg(reg)?;
        self.write_reg(reg, f(r))?;
        Ok(())
    }
}

impl<I2C, E> RawAccelerometer<I16x3> for Mpu6050<I2C>
where
    I2C: I2c + ErrorType<Error = E>,
    E: Debug,
{
    type Error = E;

    /// Get acceleration reading from the accelerometer
    fn accel_raw(&mut self) -> Result<I16x3, Error<E>> {
        let mut buf = [0u8; 6];
        self.read_regs(Register::ACCEL_XOUT_H, &mut buf)?;
        Ok(be_triple(&buf))
    }
}

#[cfg(feature = "out_f32")]
impl<I2C, E> Accelerometer for Mpu6050<I2C>
where
    I2C: I2c + ErrorType<Error = E>,
    E: Debug,
{
    type Error = E;

    /// Get normalized ±g reading from the accelerometer
    fn accel_norm(&mut self) -> Result<F32x3, Error<E>> {
        let acc_raw: I16x3 = self.accel_raw()?;

        Ok(F32x3::new(
            self.accel_range.convert_out_i16tof32(acc_raw.x),
            self.accel_range.convert_out_i16tof32(acc_raw.y),
            self.accel_range.convert_out_i16tof32(acc_raw.z),
        ))
    }

    /// Get sample rate of accelerometer in Hz
    fn sample_rate(&mut self) -> Result<f32, Error<Self::Error>> {
        let config = self.read_reg(Register::CONFIG)?;
        let div = self.read_reg(Register::SMPLRT_DIV)?;
        let base = Dlpf::from_u8(config & DLPF_CFG_MASK).map_or(0.0, Dlpf::gyro_output_rate);
        Ok(base / f32(u16(div) + 1))
    }
}

/// Main-loop side of the bridge
///
/// Owns the sensor driver and is the only writer of the [`SampleBuffer`].
pub struct Sampler<'a, I2C> {
    dev: Mpu6050<I2C>,
    buffer: &'a SampleBuffer,
    last: Option<Reading>,
    failures: u32,
}

impl<'a, I2C, E> Sampler<'a, I2C>
where
    I2C: I2c + ErrorType<Error = E>,
    E: Debug,
{
    /// Create a sampler publishing into `buffer`
    pub fn new(dev: Mpu6050<I2C>, buffer: &'a SampleBuffer) -> Self {
        Self {
            dev,
            buffer,
            last: None,
            failures: 0,
        }
    }

    /// Read acceleration, angular rate and temperature and publish them
    ///
    /// A failed bus transaction is not retried and leaves the buffer
    /// untouched.
    pub fn refresh(&mut self) -> Result<(), RefreshError<E>> {
        match self.dev.read_all() {
            Ok(reading) => {
                publish(self.buffer, &reading);
                self.last = Some(reading);
                self.failures = 0;
                crate::log::log_trace!("sample published");
                Ok(())
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                Err(e.into())
            }
        }
    }

    /// [`Sampler::refresh`], keeping the previous sample on failure
    ///
    /// Returns `true` if a new sample was published.
    pub fn refresh_or_keep(&mut self) -> bool {
        match self.refresh() {
            Ok(()) => true,
            Err(RefreshError::SensorUnavailable(_)) => {
                crate::log::log_warn!(
                    "sensor unavailable, keeping stale sample ({} in a row)",
                    self.failures
                );
                false
            }
        }
    }

    /// Last successfully published reading
    pub fn last(&self) -> Option<&Reading> {
        self.last.as_ref()
    }

    /// Number of failed refreshes since the last successful one
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    /// Write the diagnostic line for the last reading,
    /// nothing if no reading has been taken yet
    pub fn dump<W>(&self, w: &mut W) -> fmt::Result
    where
        W: fmt::Write,
    {
        match &self.last {
            Some(reading) => writeln!(w, "{}", reading),
            None => Ok(()),
        }
    }

    /// Access the sensor driver
    pub fn device(&mut self) -> &mut Mpu6050<I2C> {
        &mut self.dev
    }

    /// Destroy sampler instance, return the sensor driver
    pub fn destroy(self) -> Mpu6050<I2C> {
        self.dev
    }
}
