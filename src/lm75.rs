// Licensed under the Apache-2.0 license

//! Driver for the LM75 temperature sensor

use embedded_hal::i2c::{I2c, SevenBitAddress};

/// Strap-selectable addresses populated on the AFC board.
pub const ADDRESSES: [SevenBitAddress; 4] = [0x4C, 0x4D, 0x4E, 0x4F];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Register {
    Temperature = 0x00,
    Configuration = 0x01,
    Hysteresis = 0x02,
    OverTemperature = 0x03,
}

/// Shutdown bit of the configuration register.
pub const CONFIG_SHUTDOWN: u8 = 1 << 0;

#[derive(Copy, Clone, Debug, PartialEq, PartialOrd)]
pub struct Celsius(pub f32);

/// Temperature registers are left-justified two's complement with 0.5 °C
/// per LSB in the top nine bits.
fn convert(raw: [u8; 2]) -> Celsius {
    Celsius(f32::from(i16::from_be_bytes(raw) >> 7) * 0.5)
}

pub struct Lm75<I> {
    bus: I,
    address: SevenBitAddress,
}

impl<I: I2c> Lm75<I> {
    pub fn new(bus: I, address: SevenBitAddress) -> Self {
        Self { bus, address }
    }

    pub fn release(self) -> I {
        self.bus
    }

    /// Point at the temperature register and read it.
    pub fn temperature(&mut self) -> Result<Celsius, I::Error> {
        self.read_reg(Register::Temperature).map(convert)
    }

    /// Read two bytes without moving the register pointer. After power-up
    /// the pointer rests on the temperature register.
    pub fn read_raw(&mut self) -> Result<Celsius, I::Error> {
        let mut buf = [0u8; 2];
        self.bus.read(self.address, &mut buf)?;
        Ok(convert(buf))
    }

    pub fn configuration(&mut self) -> Result<u8, I::Error> {
        let mut buf = [0u8; 1];
        self.bus
            .write_read(self.address, &[Register::Configuration as u8], &mut buf)?;
        let [config] = buf;
        Ok(config)
    }

    pub fn set_shutdown(&mut self, shutdown: bool) -> Result<(), I::Error> {
        let config = self.configuration()?;
        let config = if shutdown {
            config | CONFIG_SHUTDOWN
        } else {
            config & !CONFIG_SHUTDOWN
        };
        self.bus
            .write(self.address, &[Register::Configuration as u8, config])
    }

    fn read_reg(&mut self, reg: Register) -> Result<[u8; 2], I::Error> {
        let mut buf = [0u8; 2];
        self.bus.write_read(self.address, &[reg as u8], &mut buf)?;
        Ok(buf)
    }
}
