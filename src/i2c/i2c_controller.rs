// Licensed under the Apache-2.0 license

//! embedded-hal view of a local-master channel.
//!
//! Device drivers written against `embedded_hal::i2c::I2c` (such as
//! [`Lm75`](crate::lm75::Lm75)) run unchanged on top of the transaction
//! engine through [`I2cController`].

use embedded_hal::i2c::{Operation, SevenBitAddress};

use crate::common::{Logger, NoOpLogger};
use crate::i2c::common::{Error, Millis};
use crate::i2c::engine::Engine;
use crate::i2c::mode::{Channel, LocalMaster};
use crate::i2c::traits::{BusController, Clock, Signal};

pub struct I2cController<'a, B, S, C, const N: usize, L: Logger = NoOpLogger> {
    engine: &'a Engine<B, S, C, N, L>,
    channel: Channel<LocalMaster>,
    timeout: Option<Millis>,
}

impl<'a, B, S, C, const N: usize, L> I2cController<'a, B, S, C, N, L>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
    L: Logger,
{
    /// Every operation waits at most `timeout` (`None`: forever).
    pub fn new(
        engine: &'a Engine<B, S, C, N, L>,
        channel: Channel<LocalMaster>,
        timeout: Option<Millis>,
    ) -> Self {
        Self {
            engine,
            channel,
            timeout,
        }
    }
}

impl<B, S, C, const N: usize, L: Logger> embedded_hal::i2c::ErrorType
    for I2cController<'_, B, S, C, N, L>
{
    type Error = Error;
}

impl<B, S, C, const N: usize, L> embedded_hal::i2c::I2c for I2cController<'_, B, S, C, N, L>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
    L: Logger,
{
    fn read(&mut self, addr: SevenBitAddress, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.engine
            .read_timeout(self.channel, addr, buffer, self.timeout)
    }

    fn write(&mut self, addr: SevenBitAddress, bytes: &[u8]) -> Result<(), Self::Error> {
        self.engine
            .write_timeout(self.channel, addr, bytes, self.timeout)
    }

    fn write_read(
        &mut self,
        addr: SevenBitAddress,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.engine
            .write_read_timeout(self.channel, addr, bytes, buffer, self.timeout)
    }

    /// Supports the shapes one engine request can carry: a single write, a
    /// single read, or a write followed by a read.
    fn transaction(
        &mut self,
        addr: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        match operations {
            [] => Ok(()),
            [Operation::Write(bytes)] => self.write(addr, bytes),
            [Operation::Read(buffer)] => self.read(addr, buffer),
            [Operation::Write(bytes), Operation::Read(buffer)] => {
                self.write_read(addr, bytes, buffer)
            }
            _ => Err(Error::Unsupported),
        }
    }
}
