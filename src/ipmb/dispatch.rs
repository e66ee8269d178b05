// Licensed under the Apache-2.0 license

//! IPMB request dispatch.
//!
//! The dispatcher waits for frames on an IPMB link, validates them, looks up
//! a handler by `(netFn, command)` and writes the reply back to the
//! requester. Replies are sent once; a failed reply is reported to the
//! [`Diagnostics`] sink and never retried.

use heapless::{FnvIndexMap, Vec};

use crate::common::{Logger, NoOpLogger};
use crate::i2c::address::BusAddress;
use crate::i2c::common::{Error, Millis, MAX_MSG_LENGTH};
use crate::i2c::engine::Engine;
use crate::i2c::mode::{Channel, IpmbSlave};
use crate::i2c::traits::{BusController, Clock, Signal};
use crate::ipmb::message::{CompletionCode, FrameError, IpmiMessage, NetFn, MAX_DATA_LEN};

/// Handler table size.
pub const MAX_HANDLERS: usize = 8;

/// Reply data room once the completion code is placed.
pub const MAX_RESPONSE_DATA: usize = MAX_DATA_LEN - 1;

/// Transport under the dispatcher.
pub trait IpmbLink {
    fn own_address(&self) -> BusAddress;

    /// Next frame addressed to us.
    fn receive(&mut self, buf: &mut [u8], timeout: Option<Millis>) -> Result<usize, Error>;

    /// Write `frame` to the node at 7-bit `address`.
    fn send(&mut self, address: u8, frame: &[u8]) -> Result<(), Error>;
}

/// [`IpmbLink`] over an engine channel in IPMB role.
pub struct IpmbPort<'a, B, S, C, const N: usize, L: Logger = NoOpLogger> {
    engine: &'a Engine<B, S, C, N, L>,
    channel: Channel<IpmbSlave>,
    address: BusAddress,
    reply_timeout: Option<Millis>,
}

impl<'a, B, S, C, const N: usize, L> IpmbPort<'a, B, S, C, N, L>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
    L: Logger,
{
    /// Replies wait at most `reply_timeout` (`None`: forever). The own
    /// address is the one the channel was initialized with.
    pub fn new(
        engine: &'a Engine<B, S, C, N, L>,
        channel: Channel<IpmbSlave>,
        reply_timeout: Option<Millis>,
    ) -> Result<Self, Error> {
        Ok(Self {
            engine,
            channel,
            address: engine.own_address(channel)?,
            reply_timeout,
        })
    }
}

impl<B, S, C, const N: usize, L> IpmbLink for IpmbPort<'_, B, S, C, N, L>
where
    B: BusController,
    S: Signal + Default,
    C: Clock,
    L: Logger,
{
    fn own_address(&self) -> BusAddress {
        self.address
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Option<Millis>) -> Result<usize, Error> {
        self.engine.slave_receive(self.channel, buf, timeout)
    }

    fn send(&mut self, address: u8, frame: &[u8]) -> Result<(), Error> {
        self.engine
            .write_timeout(self.channel, address, frame, self.reply_timeout)
    }
}

/// Produces the reply data for one command. The returned completion code
/// goes out as the first data byte.
pub trait CommandHandler {
    fn handle(
        &self,
        request: &IpmiMessage,
        response: &mut Vec<u8, MAX_RESPONSE_DATA>,
    ) -> CompletionCode;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagEvent {
    /// A reply went out.
    Success,
    /// A reply could not be sent.
    Fault,
}

/// Status indicator driven by reply outcomes (LEDs on the AFC).
pub trait Diagnostics {
    fn notify(&mut self, event: DiagEvent);
}

impl Diagnostics for () {
    fn notify(&mut self, _event: DiagEvent) {}
}

/// What one [`Dispatcher::poll`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Replied { netfn: NetFn, command: u8 },
    ReplyFailed(Error),
    /// Valid request without a handler; kept as [`Dispatcher::last_unhandled`].
    Unhandled,
    Rejected(FrameError),
}

const fn handler_key(netfn: NetFn, command: u8) -> u16 {
    ((netfn.raw() as u16) << 8) | command as u16
}

pub struct Dispatcher<'h, T: IpmbLink, D: Diagnostics = (), L: Logger = NoOpLogger> {
    link: T,
    diagnostics: D,
    logger: L,
    handlers: FnvIndexMap<u16, &'h dyn CommandHandler, MAX_HANDLERS>,
    unhandled: Option<IpmiMessage>,
}

impl<'h, T: IpmbLink, D: Diagnostics> Dispatcher<'h, T, D> {
    pub fn new(link: T, diagnostics: D) -> Self {
        Self::with_logger(link, diagnostics, NoOpLogger)
    }
}

impl<'h, T: IpmbLink, D: Diagnostics, L: Logger> Dispatcher<'h, T, D, L> {
    pub fn with_logger(link: T, diagnostics: D, logger: L) -> Self {
        Self {
            link,
            diagnostics,
            logger,
            handlers: FnvIndexMap::new(),
            unhandled: None,
        }
    }

    /// Route `(netfn, command)` to `handler`, replacing any earlier entry.
    ///
    /// # Errors
    ///
    /// `NotARequest` for a response netFn, `TableFull` once
    /// [`MAX_HANDLERS`] distinct commands are registered.
    pub fn register(
        &mut self,
        netfn: NetFn,
        command: u8,
        handler: &'h dyn CommandHandler,
    ) -> Result<(), RegisterError> {
        if !netfn.is_request() {
            return Err(RegisterError::NotARequest);
        }
        self.handlers
            .insert(handler_key(netfn, command), handler)
            .map(|_| ())
            .map_err(|_| RegisterError::TableFull)
    }

    /// Most recent valid request nobody handled.
    pub fn last_unhandled(&self) -> Option<&IpmiMessage> {
        self.unhandled.as_ref()
    }

    pub fn take_unhandled(&mut self) -> Option<IpmiMessage> {
        self.unhandled.take()
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    /// Handle at most one frame.
    ///
    /// # Errors
    ///
    /// Whatever the link's receive reports: `Timeout` when nothing arrived,
    /// `BufferOverflow` for an oversized frame.
    pub fn poll(&mut self, timeout: Option<Millis>) -> Result<Outcome, Error> {
        let mut buf = [0u8; MAX_MSG_LENGTH];
        let len = self.link.receive(&mut buf, timeout)?;
        let frame = buf.get(..len).ok_or(Error::BufferOverflow)?;

        let own = self.link.own_address().ipmb();
        let request = match IpmiMessage::decode(own, frame) {
            Ok(message) if message.netfn.is_request() => message,
            Ok(_) => return Ok(self.reject(FrameError::NotARequest)),
            Err(e) => return Ok(self.reject(e)),
        };

        let key = handler_key(request.netfn, request.command);
        let Some(handler) = self.handlers.get(&key).copied() else {
            self.logger.debug(format_args!(
                "ipmb: no handler for netfn {:#04x} cmd {:#04x}",
                request.netfn.raw(),
                request.command
            ));
            self.unhandled = Some(request);
            return Ok(Outcome::Unhandled);
        };

        let mut data = Vec::new();
        let completion_code = handler.handle(&request, &mut data);
        let reply = request
            .response(completion_code, &data)
            .and_then(|reply| reply.encode());
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.logger
                    .warn(format_args!("ipmb: cannot build reply: {}", e));
                self.diagnostics.notify(DiagEvent::Fault);
                return Ok(Outcome::ReplyFailed(Error::BufferOverflow));
            }
        };

        match self.link.send(request.requester >> 1, &reply) {
            Ok(()) => {
                self.diagnostics.notify(DiagEvent::Success);
                Ok(Outcome::Replied {
                    netfn: request.netfn.response(),
                    command: request.command,
                })
            }
            Err(e) => {
                self.logger.warn(format_args!(
                    "ipmb: reply to {:#04x} failed: {}",
                    request.requester, e
                ));
                self.diagnostics.notify(DiagEvent::Fault);
                Ok(Outcome::ReplyFailed(e))
            }
        }
    }

    /// Serve requests forever.
    pub fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.poll(None) {
                self.logger
                    .debug(format_args!("ipmb: receive failed: {}", e));
            }
        }
    }

    fn reject(&mut self, error: FrameError) -> Outcome {
        self.logger
            .debug(format_args!("ipmb: dropping frame: {}", error));
        Outcome::Rejected(error)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegisterError {
    NotARequest,
    TableFull,
}
