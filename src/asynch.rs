//! Asynchronous version of the driver and sampler.
//!
//! Requires enabling the `async` feature. The transfer engine side is
//! unchanged: it runs in interrupt context and never awaits.

use core::fmt::{self, Debug};

use accelerometer::{Error, ErrorKind};
#[cfg(feature = "out_f32")]
use cast::{f32, u16};
use embedded_hal_async as hal;
use hal::i2c::{ErrorType, I2c};
#[cfg(feature = "out_f32")]
use num_traits::FromPrimitive;

use crate::reg::*;
#[cfg(feature = "out_f32")]
use crate::F32x3;
use crate::{
    be_i16, be_triple, publish, AccelRange, Config, Dlpf, GyroRange, I16x3, Reading,
    RefreshError, SampleBuffer, SlaveAddr,
};

/// Asynchronous `MPU-6050` driver
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
    pub async fn new(i2c: I2C, addr: SlaveAddr) -> Result<Self, Error<E>> {
        let mut dev = Self {
            i2c,
            addr: addr.addr(),
            #[cfg(feature = "out_f32")]
            gyro_range: GyroRange::Dps250,
            #[cfg(feature = "out_f32")]
            accel_range: AccelRange::G2,
        };

        // Ensure we have the correct device ID
        if dev.get_device_id().await? != DEVICE_ID {
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
    pub async fn get_device_id(&mut self) -> Result<u8, Error<E>> {
        self.read_reg(Register::WHO_AM_I).await.map_err(Into::into)
    }

    /// Leave sleep mode, internal oscillator as clock source,
    /// `PWR_MGMT_1` = 0
    pub async fn wake(&mut self) -> Result<(), Error<E>> {
        self.write_reg(Register::PWR_MGMT_1, PWR_MGMT_1_WAKE).await?;
        Ok(())
    }

    /// Sleep mode,
    /// `PWR_MGMT_1`: `SLEEP`
    pub async fn set_sleep(&mut self, sleep: bool) -> Result<(), Error<E>> {
        self.modify_reg(Register::PWR_MGMT_1, |v| {
            if sleep {
                v | SLEEP
            } else {
                v & !SLEEP
            }
        })
        .await?;
        Ok(())
    }

    /// Sleep mode,
    /// `PWR_MGMT_1`: `SLEEP`
    pub async fn is_sleeping(&mut self) -> Result<bool, Error<E>> {
        let reg = self.read_reg(Register::PWR_MGMT_1).await?;
        Ok((reg & SLEEP) != 0)
    }

    /// Full-scale selection,
    /// `GYRO_CONFIG`: `FS_SEL`, `ACCEL_CONFIG`: `AFS_SEL`
    pub async fn set_ranges(&mut self, gyro: GyroRange, accel: AccelRange) -> Result<(), Error<E>> {
        self.i2c
            .write(
                self.addr,
                &[Register::GYRO_CONFIG.addr(), gyro.bits(), accel.bits()],
            )
            .await?;
        #[cfg(feature = "out_f32")]
        {
            self.gyro_range = gyro;
            self.accel_range = accel;
        }
        Ok(())
    }

    /// Digital low-pass filter,
    /// `CONFIG`: `DLPF_CFG`
    pub async fn set_dlpf(&mut self, dlpf: Dlpf) -> Result<(), Error<E>> {
        self.modify_reg(Register::CONFIG, |v| {
            (v & !DLPF_CFG_MASK) | (dlpf as u8)
        })
        .await?;
        Ok(())
    }

    /// Sample rate divider,
    /// `SMPLRT_DIV`
    pub async fn set_sample_rate_divider(&mut self, div: u8) -> Result<(), Error<E>> {
        self.write_reg(Register::SMPLRT_DIV, div).await?;
        Ok(())
    }

    /// Sample rate divider,
    /// `SMPLRT_DIV`
    pub async fn get_sample_rate_divider(&mut self) -> Result<u8, Error<E>> {
        self.read_reg(Register::SMPLRT_DIV).await.map_err(Into::into)
    }

    /// Sample rate in Hz, from `CONFIG`: `DLPF_CFG` and `SMPLRT_DIV`
    #[cfg(feature = "out_f32")]
    pub async fn sample_rate(&mut self) -> Result<f32, Error<E>> {
        let config = self.read_reg(Register::CONFIG).await?;
        let div = self.read_reg(Register::SMPLRT_DIV).await?;
        let base = Dlpf::from_u8(config & DLPF_CFG_MASK).map_or(0.0, Dlpf::gyro_output_rate);
        Ok(base / f32(u16(div) + 1))
    }

    /// Wake the device and apply `config`
    pub async fn init(&mut self, config: &Config) -> Result<(), Error<E>> {
        self.wake().await?;
        self.set_ranges(config.gyro_range, config.accel_range).await?;
        self.set_dlpf(config.dlpf).await?;
        self.set_sample_rate_divider(config.sample_rate_divider)
            .await?;
        crate::log::log_debug!("device configured");
        Ok(())
    }

    /// Acceleration,
    /// `ACCEL_XOUT_H` .. `ACCEL_ZOUT_L`
    pub async fn accel_raw(&mut self) -> Result<I16x3, Error<E>> {
        let mut buf = [0u8; 6];
        self.read_regs(Register::ACCEL_XOUT_H, &mut buf).await?;
        Ok(be_triple(&buf))
    }

    /// Acceleration in g
    #[cfg(feature = "out_f32")]
    pub async fn accel_norm(&mut self) -> Result<F32x3, Error<E>> {
        let raw = self.accel_raw().await?;
        Ok(F32x3::new(
            self.accel_range.convert_out_i16tof32(raw.x),
            self.accel_range.convert_out_i16tof32(raw.y),
            self.accel_range.convert_out_i16tof32(raw.z),
        ))
    }

    /// Angular rate,
    /// `GYRO_XOUT_H` .. `GYRO_ZOUT_L`
    pub async fn gyro_raw(&mut self) -> Result<I16x3, Error<E>> {
        let mut buf = [0u8; 6];
        self.read_regs(Register::GYRO_XOUT_H, &mut buf).await?;
        Ok(be_triple(&buf))
    }

    /// Angular rate in °/s
    #[cfg(feature = "out_f32")]
    pub async fn gyro_norm(&mut self) -> Result<F32x3, Error<E>> {
        let raw = self.gyro_raw().await?;
        Ok(F32x3::new(
            self.gyro_range.convert_out_i16tof32(raw.x),
            self.gyro_range.convert_out_i16tof32(raw.y),
            self.gyro_range.convert_out_i16tof32(raw.z),
        ))
    }

    /// Temperature sensor data,
    /// `TEMP_OUT_H`, `TEMP_OUT_L`
    pub async fn temp_raw(&mut self) -> Result<i16, Error<E>> {
        let mut buf = [0u8; 2];
        self.read_regs(Register::TEMP_OUT_H, &mut buf).await?;
        Ok(be_i16(buf[0], buf[1]))
    }

    /// Acceleration, angular rate and temperature,
    /// in that order and one transaction each
    pub async fn read_all(&mut self) -> Result<Reading, Error<E>> {
        let accel = self.accel_raw().await?;
        let gyro = self.gyro_raw().await?;
        let temp_raw = self.temp_raw().await?;
        Ok(Reading {
            accel,
            gyro,
            temp_raw,
        })
    }

    /// Dump registers
    #[cfg(debug_assertions)]
    pub async fn dump_regs<W>(&mut self, w: &mut W) -> Result<(), Error<E>>
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
            let value = self.read_reg(reg).await?;
            if writeln!(w, "{} = {:#010b}", name, value).is_err() {
                break;
            }
        }
        Ok(())
    }

    #[inline]
    async fn read_reg(&mut self, reg: Register) -> Result<u8, E> {
        let mut buf = [0u8];
        self.i2c
            .write_read(self.addr, &[reg.addr()], &mut buf)
            .await?;
        Ok(buf[0])
    }

    #[inline]
    async fn read_regs(&mut self, reg: Register, buffer: &mut [u8]) -> Result<(), E> {
        self.i2c.write_read(self.addr, &[reg.addr()], buffer).await
    }

    #[inline]
    async fn write_reg(&mut self, reg: Register, val: u8) -> Result<(), E> {
        self.i2c.write(self.addr, &[reg.addr(), val]).await
    }

    #[inline]
    async fn modify_reg<F>(&mut self, reg: Register, f: F) -> Result<(), E>
    where
        F: FnOnce(u8) -> u8,
    {
        let r = self.read_reg(reg).await?;
        self.write_reg(reg, f(r)).await?;
        Ok(())
    }
}

/// Asynchronous main-loop side of the bridge
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

    /// Read acceleration, angular rate and temperature and publish them,
    /// the buffer is left untouched on failure
    pub async fn refresh(&mut self) -> Result<(), RefreshError<E>> {
        match self.dev.read_all().await {
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
    pub async fn refresh_or_keep(&mut self) -> bool {
        match self.refresh().await {
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

    /// Write the diagnostic line for the last reading
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
