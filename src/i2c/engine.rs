// Licensed under the Apache-2.0 license

//! Channel registry and task-level request layer.
//!
//! An [`Engine`] owns a fixed table of channel contexts. Tasks call the
//! blocking request methods through typed [`Channel`] handles; the platform's
//! interrupt vector for controller `n` calls [`Engine::on_interrupt`] with
//! the matching [`ChannelId`].
//!
//! A request:
//!
//! 1. is validated (length, address) before anything touches the bus,
//! 2. takes the channel lock, waiting at most until the caller's deadline,
//! 3. copies its buffers into the channel and sets START,
//! 4. sleeps on the channel completion until the handler posts its
//!    sequence number or the deadline passes,
//! 5. collects the result, or marks the transaction abandoned so the
//!    handler resets the bus at its next step.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Vec;

use crate::common::{Logger, NoOpLogger};
use crate::i2c::address::{AddressResolver, BusAddress};
use crate::i2c::common::{ChannelConfig, Error, Millis, MAX_MSG_LENGTH, TRACE_DEPTH};
use crate::i2c::completion::{ChannelLock, Completion};
use crate::i2c::mode::{
    Channel, ChannelId, IpmbSlave, MasterRead, MasterWrite, Mode, SlaveReceive,
};
use crate::i2c::state_machine::{ChannelState, Kind, Phase, Request, Trace};
use crate::i2c::traits::{remaining, BusController, Clock, Signal};

/// Largest 7-bit address a request may target.
const MAX_TARGET_ADDRESS: u8 = 0x7F;

struct ChannelContext<B, S> {
    state: Mutex<RefCell<Option<ChannelState<B>>>>,
    lock: ChannelLock<S>,
    completion: Completion<S>,
    frame_ready: S,
}

impl<B, S: Signal + Default> ChannelContext<B, S> {
    fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(None)),
            lock: ChannelLock::default(),
            completion: Completion::default(),
            frame_ready: S::default(),
        }
    }
}

/// Transaction engine for `N` bus controllers.
pub struct Engine<B, S, C, const N: usize, L: Logger = NoOpLogger> {
    channels: [ChannelContext<B, S>; N],
    clock: C,
    logger: L,
}

impl<B, S, C, const N: usize> Engine<B, S, C, N>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self::with_logger(clock, NoOpLogger)
    }
}

impl<B, S, C, const N: usize, L> Engine<B, S, C, N, L>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
    L: Logger,
{
    pub fn with_logger(clock: C, logger: L) -> Self {
        Self {
            channels: core::array::from_fn(|_| ChannelContext::new()),
            clock,
            logger,
        }
    }

    /// Bring controller `id` up in role `M`.
    ///
    /// # Errors
    ///
    /// `InvalidChannel` for an id outside the table, `AlreadyInitialized` if
    /// the channel was set up before.
    pub fn init<M: Mode>(
        &self,
        id: ChannelId,
        bus: B,
        settings: M::Settings,
        config: ChannelConfig,
    ) -> Result<Channel<M>, Error> {
        let ctx = self.context(id)?;
        let own_address = M::own_address(&settings);
        critical_section::with(|cs| {
            let mut slot = ctx.state.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(Error::AlreadyInitialized);
            }
            *slot = Some(ChannelState::new(id, bus, M::KIND, own_address, config));
            Ok(())
        })?;
        self.logger
            .info(format_args!("{}: up as {:?}", id, M::KIND));
        Ok(Channel::new(id))
    }

    /// Bring controller `id` up as an IPMB channel at the address `resolver`
    /// reports.
    pub fn init_ipmb<R: AddressResolver>(
        &self,
        id: ChannelId,
        bus: B,
        resolver: &R,
        config: ChannelConfig,
    ) -> Result<Channel<IpmbSlave>, Error> {
        let address = resolver.resolve()?;
        self.init::<IpmbSlave>(id, bus, address, config)
    }

    /// Master write with the channel's default timeout.
    pub fn write<M: MasterWrite>(
        &self,
        channel: Channel<M>,
        address: u8,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let timeout = self.default_timeout(channel.id())?;
        self.write_timeout(channel, address, bytes, timeout)
    }

    pub fn write_timeout<M: MasterWrite>(
        &self,
        channel: Channel<M>,
        address: u8,
        bytes: &[u8],
        timeout: Option<Millis>,
    ) -> Result<(), Error> {
        let request = Request {
            address,
            kind: Kind::Write,
            tx: bytes,
            rx_len: 0,
        };
        self.transfer(channel.id(), &request, &mut [], timeout)
    }

    /// Master read of `buf.len()` bytes with the channel's default timeout.
    pub fn read<M: MasterRead>(
        &self,
        channel: Channel<M>,
        address: u8,
        buf: &mut [u8],
    ) -> Result<(), Error> {
        let timeout = self.default_timeout(channel.id())?;
        self.read_timeout(channel, address, buf, timeout)
    }

    pub fn read_timeout<M: MasterRead>(
        &self,
        channel: Channel<M>,
        address: u8,
        buf: &mut [u8],
        timeout: Option<Millis>,
    ) -> Result<(), Error> {
        let request = Request {
            address,
            kind: Kind::Read,
            tx: &[],
            rx_len: buf.len(),
        };
        self.transfer(channel.id(), &request, buf, timeout)
    }

    /// Write `bytes`, then read `buf.len()` bytes after a repeated START.
    pub fn write_read<M: MasterRead + MasterWrite>(
        &self,
        channel: Channel<M>,
        address: u8,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> Result<(), Error> {
        let timeout = self.default_timeout(channel.id())?;
        self.write_read_timeout(channel, address, bytes, buf, timeout)
    }

    pub fn write_read_timeout<M: MasterRead + MasterWrite>(
        &self,
        channel: Channel<M>,
        address: u8,
        bytes: &[u8],
        buf: &mut [u8],
        timeout: Option<Millis>,
    ) -> Result<(), Error> {
        let request = Request {
            address,
            kind: Kind::WriteRead,
            tx: bytes,
            rx_len: buf.len(),
        };
        self.transfer(channel.id(), &request, buf, timeout)
    }

    /// Wait for the next frame another master writes to us and copy it into
    /// `buf`. Returns the frame length.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` if `buf` is longer than [`MAX_MSG_LENGTH`], if the
    /// frame overflowed on the wire, or if it does not fit in `buf`.
    /// `Timeout` if nothing arrives in time.
    pub fn slave_receive<M: SlaveReceive>(
        &self,
        channel: Channel<M>,
        buf: &mut [u8],
        timeout: Option<Millis>,
    ) -> Result<usize, Error> {
        let ctx = self.context(channel.id())?;
        let deadline = timeout.map(|timeout| self.clock.now() + timeout);
        loop {
            match self.try_slave_receive(channel, buf) {
                Ok(len) => return Ok(len),
                Err(nb::Error::Other(e)) => return Err(e),
                Err(nb::Error::WouldBlock) => {}
            }
            let wait = match deadline {
                None => None,
                Some(deadline) => Some(remaining(&self.clock, deadline).ok_or(Error::Timeout)?),
            };
            ctx.frame_ready.wait(wait);
        }
    }

    /// Non-blocking form of [`slave_receive`](Self::slave_receive).
    pub fn try_slave_receive<M: SlaveReceive>(
        &self,
        channel: Channel<M>,
        buf: &mut [u8],
    ) -> nb::Result<usize, Error> {
        if buf.len() > MAX_MSG_LENGTH {
            return Err(nb::Error::Other(Error::BufferOverflow));
        }
        let ctx = self.context(channel.id())?;
        let frame = self
            .with_state(ctx, ChannelState::pop_frame)?
            .ok_or(nb::Error::WouldBlock)?;
        if frame.overflow {
            return Err(nb::Error::Other(Error::BufferOverflow));
        }
        let len = frame.bytes.len();
        buf.get_mut(..len)
            .ok_or(Error::BufferOverflow)?
            .copy_from_slice(&frame.bytes);
        Ok(len)
    }

    /// Interrupt entry point for controller `id`.
    pub fn on_interrupt(&self, id: ChannelId) {
        let Some(ctx) = self.channels.get(id.index()) else {
            return;
        };
        let wake = critical_section::with(|cs| {
            ctx.state
                .borrow_ref_mut(cs)
                .as_mut()
                .map(|state| state.service(&self.logger))
                .unwrap_or_default()
        });
        if let Some(seq) = wake.completed {
            ctx.completion.complete(seq);
        }
        if wake.frame {
            ctx.frame_ready.raise();
        }
    }

    /// Slave address the IPMB channel answers to.
    pub fn own_address(&self, channel: Channel<IpmbSlave>) -> Result<BusAddress, Error> {
        let ctx = self.context(channel.id())?;
        self.with_state(ctx, |state| state.own_address())?
            .ok_or(Error::NotInitialized)
    }

    /// Recent interrupt activity on `id`, oldest first.
    pub fn trace(&self, id: ChannelId) -> Result<Vec<Trace, TRACE_DEPTH>, Error> {
        let ctx = self.context(id)?;
        self.with_state(ctx, |state| state.trace().copied().collect())
    }

    pub fn phase(&self, id: ChannelId) -> Result<Phase, Error> {
        let ctx = self.context(id)?;
        self.with_state(ctx, |state| state.phase())
    }

    fn transfer(
        &self,
        id: ChannelId,
        request: &Request<'_>,
        rx: &mut [u8],
        timeout: Option<Millis>,
    ) -> Result<(), Error> {
        if request.tx.len() > MAX_MSG_LENGTH || request.rx_len > MAX_MSG_LENGTH {
            return Err(Error::BufferOverflow);
        }
        if request.address > MAX_TARGET_ADDRESS {
            return Err(Error::InvalidAddress);
        }
        // A master receiver cannot stop before taking at least one byte.
        if request.kind != Kind::Write && request.rx_len == 0 {
            return Err(Error::Unsupported);
        }
        let ctx = self.context(id)?;
        let deadline = timeout.map(|timeout| self.clock.now() + timeout);

        let Some(_guard) = ctx.lock.acquire(deadline, &self.clock) else {
            self.logger
                .debug(format_args!("{}: timed out waiting for the channel", id));
            return Err(Error::Timeout);
        };

        let seq = self.with_state(ctx, |state| state.arm(request, &self.logger))??;
        ctx.completion.wait(seq, deadline, &self.clock);
        let result = self.with_state(ctx, |state| state.collect(seq, rx))?;
        if result == Err(Error::Timeout) {
            self.logger.warn(format_args!(
                "{}: transaction {} to {:#04x} timed out",
                id, seq, request.address
            ));
        }
        result
    }

    fn default_timeout(&self, id: ChannelId) -> Result<Option<Millis>, Error> {
        let ctx = self.context(id)?;
        self.with_state(ctx, |state| state.config().default_timeout)
    }

    fn context(&self, id: ChannelId) -> Result<&ChannelContext<B, S>, Error> {
        self.channels.get(id.index()).ok_or(Error::InvalidChannel)
    }

    fn with_state<R>(
        &self,
        ctx: &ChannelContext<B, S>,
        f: impl FnOnce(&mut ChannelState<B>) -> R,
    ) -> Result<R, Error> {
        critical_section::with(|cs| {
            ctx.state
                .borrow_ref_mut(cs)
                .as_mut()
                .map(f)
                .ok_or(Error::NotInitialized)
        })
    }
}
