#![allow(non_upper_case_globals)]

#[cfg(feature = "out_f32")]
use cast::f32;
#[cfg(feature = "out_f32")]
use num_derive::FromPrimitive;

/// I2C slave address (`AD0` low)
pub const I2C_SAD: u8 = 0b110_1000;

/// Register mapping
#[allow(dead_code)]
#[allow(non_camel_case_types)]
#[derive(Copy, Clone)]
pub enum Register {
    SMPLRT_DIV = 0x19,
    CONFIG = 0x1A,
    GYRO_CONFIG = 0x1B,
    ACCEL_CONFIG = 0x1C,
    ACCEL_XOUT_H = 0x3B,
    ACCEL_XOUT_L = 0x3C,
    ACCEL_YOUT_H = 0x3D,
    ACCEL_YOUT_L = 0x3E,
    ACCEL_ZOUT_H = 0x3F,
    ACCEL_ZOUT_L = 0x40,
    TEMP_OUT_H = 0x41,
    TEMP_OUT_L = 0x42,
    GYRO_XOUT_H = 0x43,
    GYRO_XOUT_L = 0x44,
    GYRO_YOUT_H = 0x45,
    GYRO_YOUT_L = 0x46,
    GYRO_ZOUT_H = 0x47,
    GYRO_ZOUT_L = 0x48,
    PWR_MGMT_1 = 0x6B,
    PWR_MGMT_2 = 0x6C,
    WHO_AM_I = 0x75,
}

impl Register {
    /// Get register address
    pub fn addr(self) -> u8 {
        self as u8
    }
}

// === CONFIG (1Ah) ===

pub const DLPF_CFG_MASK: u8 = 0b0000_0111;

/// Digital low-pass filter bandwidth (accelerometer / gyroscope)
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "out_f32", derive(FromPrimitive))]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dlpf {
    /// 260 Hz / 256 Hz, gyroscope output rate 8 kHz
    Hz260 = 0,
    /// 184 Hz / 188 Hz
    Hz184 = 1,
    /// 94 Hz / 98 Hz
    Hz94 = 2,
    /// 44 Hz / 42 Hz
    Hz44 = 3,
    /// 21 Hz / 20 Hz
    Hz21 = 4,
    /// 10 Hz / 10 Hz
    Hz10 = 5,
    /// 5 Hz / 5 Hz
    Hz5 = 6,
    /// Reserved, gyroscope output rate 8 kHz
    Reserved = 7,
}

impl Dlpf {
    /// Gyroscope output rate in Hz before the sample rate divider
    #[cfg(feature = "out_f32")]
    pub(crate) fn gyro_output_rate(self) -> f32 {
        match self {
            Self::Hz260 | Self::Reserved => 8000.0,
            _ => 1000.0,
        }
    }
}

// === GYRO_CONFIG (1Bh), ACCEL_CONFIG (1Ch) ===

pub const FS_SEL_SHIFT: u8 = 3;

/// Gyroscope full-scale range, `GYRO_CONFIG`: `FS_SEL`
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GyroRange {
    /// ±250 °/s
    Dps250 = 0b00,
    /// ±500 °/s
    Dps500 = 0b01,
    /// ±1000 °/s
    Dps1000 = 0b10,
    /// ±2000 °/s
    Dps2000 = 0b11,
}

impl GyroRange {
    pub(crate) fn bits(self) -> u8 {
        (self as u8) << FS_SEL_SHIFT
    }

    #[cfg(feature = "out_f32")]
    pub(crate) fn convert_out_i16tof32(self, val: i16) -> f32 {
        // LSB per °/s
        let sens: f32 = match self {
            Self::Dps250 => 131.0,
            Self::Dps500 => 65.5,
            Self::Dps1000 => 32.8,
            Self::Dps2000 => 16.4,
        };
        f32(val) / sens
    }
}

/// Accelerometer full-scale range, `ACCEL_CONFIG`: `AFS_SEL`
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccelRange {
    /// ±2 g
    G2 = 0b00,
    /// ±4 g
    G4 = 0b01,
    /// ±8 g
    G8 = 0b10,
    /// ±16 g
    G16 = 0b11,
}

impl AccelRange {
    pub(crate) fn bits(self) -> u8 {
        (self as u8) << FS_SEL_SHIFT
    }

    #[cfg(feature = "out_f32")]
    pub(crate) fn convert_out_i16tof32(self, val: i16) -> f32 {
        // LSB per g
        let sens: f32 = match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        };
        f32(val) / sens
    }
}

// === TEMP_OUT_H (41h) ===

/// LSB per °C of `TEMP_OUT`
pub const TEMP_SENSITIVITY: f32 = 340.0;
/// °C offset of `TEMP_OUT`
pub const TEMP_OFFSET: f32 = 36.65;

// === PWR_MGMT_1 (6Bh) ===

pub const SLEEP: u8 = 0b0100_0000;

/// Value written to `PWR_MGMT_1` to leave sleep mode
/// with the internal 8 MHz oscillator as clock source
pub const PWR_MGMT_1_WAKE: u8 = 0x00;

// === WHO_AM_I (75h) ===

/// WHO_AM_I device identification register
pub const DEVICE_ID: u8 = 0b0110_1000;
