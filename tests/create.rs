mod common;

use common::*;

#[test]
fn create() {
    let trans = [trans_who_am_i()];
    let mock = I2cMock::new(&trans);
    let dev = Mpu6050::new(mock, SlaveAddr::Default).unwrap();
    dev.destroy().done();
}

#[test]
fn create0() {
    let trans = [trans_who_am_i()];
    let mock = I2cMock::new(&trans);
    let dev = Mpu6050::new(mock, SlaveAddr::Alternative(false)).unwrap();
    dev.destroy().done();
}

#[test]
fn create1() {
    let trans = [
        // WHO_AM_I on alternative slave address, the ID does not follow AD0
        I2cTrans::write_read(DEV_ADDR | 0b1, vec![0x75], vec![0b0110_1000]),
    ];
    let mock = I2cMock::new(&trans);
    let dev = Mpu6050::new(mock, SlaveAddr::Alternative(true)).unwrap();
    dev.destroy().done();
}

#[test]
fn create_wrong_device() {
    let trans = [I2cTrans::write_read(DEV_ADDR, vec![0x75], vec![0x70])];
    let mut mock = I2cMock::new(&trans);
    let res = Mpu6050::new(mock.clone(), SlaveAddr::Default);
    assert!(res.is_err());
    mock.done();
}

#[test]
fn dev_id_get() {
    let trans = [trans_who_am_i(), trans_who_am_i()];
    let mock = I2cMock::new(&trans);
    let mut dev = Mpu6050::new(mock, SlaveAddr::Default).unwrap();
    let dev_id = dev.get_device_id().unwrap();
    assert_eq!(dev_id, 0b0110_1000);
    dev.destroy().done();
}
