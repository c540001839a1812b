#![allow(dead_code)]

#[allow(unused_imports)]
pub use mpu6050_spi_bridge::{Mpu6050, SampleBuffer, Sampler, SlaveAddr};

use embedded_hal_mock as hal;
#[allow(unused_imports)]
pub use hal::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};

pub const DEV_ADDR: u8 = 0b110_1000;

pub fn trans_who_am_i() -> I2cTrans {
    I2cTrans::write_read(DEV_ADDR, vec![0x75], vec![0b0110_1000])
}

pub fn trans_accel(data: [u8; 6]) -> I2cTrans {
    I2cTrans::write_read(DEV_ADDR, vec![0x3B], data.to_vec())
}

pub fn trans_gyro(data: [u8; 6]) -> I2cTrans {
    I2cTrans::write_read(DEV_ADDR, vec![0x43], data.to_vec())
}

pub fn trans_temp(data: [u8; 2]) -> I2cTrans {
    I2cTrans::write_read(DEV_ADDR, vec![0x41], data.to_vec())
}

/// accel (4660, 22136, 30612), gyro (10072, 9029, -26505), temp 0
pub fn trans_reading() -> [I2cTrans; 3] {
    [
        trans_accel([0x12, 0x34, 0x56, 0x78, 0x77, 0x94]),
        trans_gyro([0x27, 0x58, 0x23, 0x45, 0x98, 0x77]),
        trans_temp([0x00, 0x00]),
    ]
}

/// Simple blocking executor for async tests
pub fn block_on<F: core::future::Future>(fut: F) -> F::Output {
    use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    fn dummy_raw_waker() -> RawWaker {
        fn no_op(_: *const ()) {}
        fn clone(_: *const ()) -> RawWaker {
            dummy_raw_waker()
        }
        const VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(core::ptr::null(), &VTABLE)
    }

    let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
    let mut cx = Context::from_waker(&waker);
    let mut fut = core::pin::pin!(fut);

    loop {
        if let Poll::Ready(result) = fut.as_mut().poll(&mut cx) {
            return result;
        }
    }
}
