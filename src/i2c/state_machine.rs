// Licensed under the Apache-2.0 license

//! Interrupt-level transaction state machine.
//!
//! Every controller interrupt is handled in two stages. [`transition`] maps
//! the current [`Phase`] and the reported [`BusStatus`] to a [`Step`]; then
//! [`ChannelState::service`] performs that step's register writes, always
//! finishing with a write that clears the interrupt flag. Both roles share
//! this one core; the channel's [`ModeKind`] only decides whether
//! slave-address statuses are legal.

use heapless::{Deque, HistoryBuffer, Vec};

use crate::common::Logger;
use crate::i2c::address::BusAddress;
use crate::i2c::common::{
    ChannelConfig, Error, Fault, FRAME_QUEUE_DEPTH, MAX_MSG_LENGTH, TRACE_DEPTH,
};
use crate::i2c::mode::{ChannelId, ModeKind};
use crate::i2c::status::BusStatus;
use crate::i2c::traits::{BusController, Control};

/// What the channel is doing on the bus.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// START requested, waiting for the controller to own the bus.
    Starting,
    MasterTransmit,
    MasterReceive,
    SlaveReceive,
}

/// Action taken for one interrupt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    SendAddress,
    /// Send the next byte, or move on to the read half, or stop.
    TransmitNext,
    BeginReceive,
    ReceiveByte,
    ReceiveLast,
    /// The target declined. Stop and fail the transaction.
    Nack(Fault),
    SlaveAddressed,
    /// Lost the bus while sending our address, and the winner addressed us.
    ArbitrationLostAddressed,
    SlaveByte,
    /// Byte arrived after the frame buffer filled up.
    SlaveByteRejected,
    SlaveStop,
    /// Status carries no information. Leave the interrupt flag alone.
    Ignore,
    Fault(Fault),
}

impl Step {
    const fn advances_master(self) -> bool {
        matches!(
            self,
            Step::SendAddress
                | Step::TransmitNext
                | Step::BeginReceive
                | Step::ReceiveByte
                | Step::ReceiveLast
        )
    }
}

/// The transition table.
pub(crate) const fn transition(mode: ModeKind, phase: Phase, status: BusStatus) -> Step {
    use BusStatus as S;

    let slave = matches!(mode, ModeKind::IpmbSlave);
    match (phase, status) {
        (_, S::BusError) => Step::Fault(Fault::BusError),
        (_, S::NoInfo) => Step::Ignore,

        (Phase::Starting, S::Start | S::RepeatedStart) => Step::SendAddress,

        (Phase::MasterTransmit, S::AddressWriteAck | S::DataSentAck) => Step::TransmitNext,
        (Phase::MasterTransmit, S::AddressWriteNack) => {
            Step::Nack(Fault::AddressNotAcknowledged)
        }
        (Phase::MasterTransmit, S::DataSentNack) => Step::Nack(Fault::DataNotAcknowledged),

        (Phase::MasterReceive, S::AddressReadAck) => Step::BeginReceive,
        (Phase::MasterReceive, S::AddressReadNack) => Step::Nack(Fault::AddressNotAcknowledged),
        (Phase::MasterReceive, S::DataReceivedAck) => Step::ReceiveByte,
        (Phase::MasterReceive, S::DataReceivedNack) => Step::ReceiveLast,

        (Phase::MasterTransmit | Phase::MasterReceive, S::ArbitrationLost) => {
            Step::Fault(Fault::ArbitrationLost)
        }
        (
            Phase::MasterTransmit | Phase::MasterReceive,
            S::ArbitrationLostOwnAddressWrite | S::ArbitrationLostGeneralCall,
        ) if slave => Step::ArbitrationLostAddressed,

        (Phase::Idle | Phase::Starting, S::OwnAddressWrite | S::GeneralCall) if slave => {
            Step::SlaveAddressed
        }
        (Phase::SlaveReceive, S::SlaveDataAck | S::GeneralCallDataAck) => Step::SlaveByte,
        (Phase::SlaveReceive, S::SlaveDataNack | S::GeneralCallDataNack) => {
            Step::SlaveByteRejected
        }
        (Phase::SlaveReceive, S::SlaveStop) => Step::SlaveStop,

        (_, other) => Step::Fault(Fault::UnexpectedStatus(other.code())),
    }
}

/// Interrupt trace entry, newest last.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    Status { phase: Phase, code: u8 },
    Started(u32),
    Completed(u32),
    Fault(Fault),
    Abandoned(u32),
    ForcedReset,
    FrameQueued(u8),
    FrameOverflow,
    FrameDropped,
}

/// Who holds the transaction record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Ownership {
    /// Free for the next caller.
    Idle,
    /// Armed; only the interrupt handler touches it.
    Engine,
    /// The caller gave up. The handler resets the bus at its next step.
    Abandoned,
    /// Result posted, waiting for the caller to collect it.
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Write,
    Read,
    WriteRead,
}

/// A validated request, copied into the channel when armed.
pub(crate) struct Request<'a> {
    pub address: u8,
    pub kind: Kind,
    pub tx: &'a [u8],
    pub rx_len: usize,
}

struct Transaction {
    address: u8,
    kind: Kind,
    tx: Vec<u8, MAX_MSG_LENGTH>,
    sent: usize,
    rx: Vec<u8, MAX_MSG_LENGTH>,
    rx_len: usize,
    reading: bool,
    seq: u32,
    ownership: Ownership,
    result: Result<(), Fault>,
}

impl Transaction {
    const fn new() -> Self {
        Self {
            address: 0,
            kind: Kind::Write,
            tx: Vec::new(),
            sent: 0,
            rx: Vec::new(),
            rx_len: 0,
            reading: false,
            seq: 0,
            ownership: Ownership::Idle,
            result: Ok(()),
        }
    }
}

/// A complete frame written to us by another master.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct SlaveFrame {
    pub bytes: Vec<u8, MAX_MSG_LENGTH>,
    pub overflow: bool,
}

/// Work for the caller of [`ChannelState::service`] once the critical
/// section is released.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Wake {
    pub completed: Option<u32>,
    pub frame: bool,
}

/// Everything the interrupt handler and the request layer share for one
/// channel. Always accessed inside a critical section.
pub(crate) struct ChannelState<B> {
    id: ChannelId,
    bus: B,
    mode: ModeKind,
    own_address: Option<BusAddress>,
    config: ChannelConfig,
    phase: Phase,
    /// START is set while we are addressed as slave; the controller sends
    /// it once the bus frees up.
    start_pending: bool,
    xfer: Transaction,
    seq: u32,
    frame: Vec<u8, MAX_MSG_LENGTH>,
    frame_overflow: bool,
    frames: Deque<SlaveFrame, FRAME_QUEUE_DEPTH>,
    trace: HistoryBuffer<Trace, TRACE_DEPTH>,
}

impl<B: BusController> ChannelState<B> {
    /// Enable the controller in `mode`. `own_address` is the slave address
    /// for IPMB channels.
    pub fn new(
        id: ChannelId,
        mut bus: B,
        mode: ModeKind,
        own_address: Option<BusAddress>,
        config: ChannelConfig,
    ) -> Self {
        bus.clear_control(Control::ACK | Control::START | Control::INTERRUPT);
        if let Some(address) = own_address {
            bus.set_own_address(address.seven_bit(), config.general_call);
        }
        bus.set_control(Control::ENABLE | idle_ack(mode));
        Self {
            id,
            bus,
            mode,
            own_address,
            config,
            phase: Phase::Idle,
            start_pending: false,
            xfer: Transaction::new(),
            seq: 0,
            frame: Vec::new(),
            frame_overflow: false,
            frames: Deque::new(),
            trace: HistoryBuffer::new(),
        }
    }

    pub fn own_address(&self) -> Option<BusAddress> {
        self.own_address
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn trace(&self) -> impl Iterator<Item = &Trace> {
        self.trace.oldest_ordered()
    }

    pub fn pop_frame(&mut self) -> Option<SlaveFrame> {
        self.frames.pop_front()
    }

    /// Load `request` and request a START. Returns the sequence number the
    /// completion will carry.
    pub fn arm<L: Logger>(&mut self, request: &Request<'_>, logger: &L) -> Result<u32, Error> {
        if self.xfer.ownership == Ownership::Abandoned {
            if self.phase == Phase::SlaveReceive {
                // Never started; the deferred START carries the new request.
                self.xfer.ownership = Ownership::Idle;
            } else {
                logger.debug(format_args!(
                    "{}: resetting after abandoned transaction {}",
                    self.id, self.xfer.seq
                ));
                self.forced_reset();
            }
        }

        let xfer = &mut self.xfer;
        xfer.tx.clear();
        xfer.tx
            .extend_from_slice(request.tx)
            .map_err(|()| Error::BufferOverflow)?;
        xfer.rx.clear();
        xfer.rx_len = request.rx_len;
        xfer.sent = 0;
        xfer.address = request.address;
        xfer.kind = request.kind;
        xfer.reading = request.kind == Kind::Read;
        xfer.result = Ok(());

        self.seq = match self.seq.wrapping_add(1) {
            0 => 1,
            seq => seq,
        };
        xfer.seq = self.seq;
        xfer.ownership = Ownership::Engine;
        self.trace.write(Trace::Started(self.seq));

        if self.phase == Phase::Idle {
            self.phase = Phase::Starting;
        } else {
            self.start_pending = true;
        }
        self.bus.set_control(Control::START);
        Ok(self.seq)
    }

    /// Hand the result of transaction `seq` to its caller, or mark it
    /// abandoned if it is still running.
    pub fn collect(&mut self, seq: u32, rx: &mut [u8]) -> Result<(), Error> {
        if self.xfer.seq != seq {
            return Err(Error::Failure);
        }
        match self.xfer.ownership {
            Ownership::Done => {
                self.xfer.ownership = Ownership::Idle;
                self.xfer.result?;
                for (dst, src) in rx.iter_mut().zip(self.xfer.rx.iter()) {
                    *dst = *src;
                }
                Ok(())
            }
            Ownership::Engine => {
                self.xfer.ownership = Ownership::Abandoned;
                self.trace.write(Trace::Abandoned(seq));
                Err(Error::Timeout)
            }
            Ownership::Idle | Ownership::Abandoned => Err(Error::Failure),
        }
    }

    /// Interrupt handler body.
    pub fn service<L: Logger>(&mut self, logger: &L) -> Wake {
        let mut wake = Wake::default();
        let code = self.bus.status();
        self.trace.write(Trace::Status {
            phase: self.phase,
            code,
        });

        let step = match BusStatus::try_from(code) {
            Ok(status) => transition(self.mode, self.phase, status),
            Err(code) => Step::Fault(Fault::UnexpectedStatus(code)),
        };

        if self.xfer.ownership == Ownership::Abandoned && step.advances_master() {
            logger.debug(format_args!(
                "{}: dropping abandoned transaction {}",
                self.id, self.xfer.seq
            ));
            self.forced_reset();
            return wake;
        }

        match step {
            Step::SendAddress => {
                let rw = u8::from(self.xfer.reading);
                self.bus.write_data((self.xfer.address << 1) | rw);
                self.bus.clear_control(Control::START | Control::INTERRUPT);
                self.phase = if self.xfer.reading {
                    Phase::MasterReceive
                } else {
                    Phase::MasterTransmit
                };
            }
            Step::TransmitNext => {
                if let Some(&byte) = self.xfer.tx.get(self.xfer.sent) {
                    self.xfer.sent += 1;
                    self.bus.write_data(byte);
                    self.bus.clear_control(Control::INTERRUPT);
                } else if self.xfer.kind == Kind::WriteRead && !self.xfer.reading {
                    self.xfer.reading = true;
                    self.phase = Phase::Starting;
                    self.bus.set_control(Control::START);
                    self.bus.clear_control(Control::INTERRUPT);
                } else {
                    self.finish(&mut wake);
                }
            }
            Step::BeginReceive => {
                self.ack_if_more_than_one(self.xfer.rx_len);
                self.bus.clear_control(Control::INTERRUPT);
            }
            Step::ReceiveByte => {
                let byte = self.bus.read_data();
                if self.xfer.rx.push(byte).is_err() {
                    self.fault(Fault::UnexpectedStatus(code), logger, &mut wake);
                    return wake;
                }
                let left = self.xfer.rx_len.saturating_sub(self.xfer.rx.len());
                if left == 0 {
                    self.finish(&mut wake);
                } else {
                    self.ack_if_more_than_one(left);
                    self.bus.clear_control(Control::INTERRUPT);
                }
            }
            Step::ReceiveLast => {
                let byte = self.bus.read_data();
                // Dropped if the buffer is already full.
                let _ = self.xfer.rx.push(byte);
                self.finish(&mut wake);
            }
            Step::Nack(fault) => {
                logger.debug(format_args!(
                    "{}: {} at {:#04x}",
                    self.id, fault, self.xfer.address
                ));
                self.abort(fault, &mut wake);
            }
            Step::SlaveAddressed => {
                if self.phase == Phase::Starting {
                    self.start_pending = true;
                }
                self.begin_frame();
            }
            Step::ArbitrationLostAddressed => {
                logger.debug(format_args!(
                    "{}: lost arbitration to a master addressing us",
                    self.id
                ));
                self.trace.write(Trace::Fault(Fault::ArbitrationLost));
                self.bus.clear_control(Control::START);
                self.start_pending = false;
                self.complete(Err(Fault::ArbitrationLost), &mut wake);
                self.begin_frame();
            }
            Step::SlaveByte => {
                let byte = self.bus.read_data();
                if self.frame.push(byte).is_err() {
                    self.frame_overflow = true;
                }
                if self.frame.is_full() || self.frame_overflow {
                    self.bus.clear_control(Control::ACK);
                } else {
                    self.bus.set_control(Control::ACK);
                }
                self.bus.clear_control(Control::INTERRUPT);
            }
            Step::SlaveByteRejected => {
                self.frame_overflow = true;
                self.bus.set_control(Control::ACK);
                self.bus.clear_control(Control::INTERRUPT);
                self.end_frame(logger, &mut wake);
            }
            Step::SlaveStop => {
                self.bus.set_control(Control::ACK);
                self.bus.clear_control(Control::INTERRUPT);
                self.end_frame(logger, &mut wake);
            }
            Step::Ignore => {}
            Step::Fault(fault) => self.fault(fault, logger, &mut wake),
        }
        wake
    }

    fn ack_if_more_than_one(&mut self, left: usize) {
        if left > 1 {
            self.bus.set_control(Control::ACK);
        } else {
            self.bus.clear_control(Control::ACK);
        }
    }

    /// Stop after a successful master transfer.
    fn finish(&mut self, wake: &mut Wake) {
        self.bus.set_control(Control::STOP);
        self.bus.clear_control(Control::INTERRUPT);
        self.phase = Phase::Idle;
        self.complete(Ok(()), wake);
    }

    fn fault<L: Logger>(&mut self, fault: Fault, logger: &L, wake: &mut Wake) {
        logger.warn(format_args!(
            "{}: {} in phase {:?}, resetting",
            self.id, fault, self.phase
        ));
        self.abort(fault, wake);
    }

    /// Release the bus, drop any partial frame and fail the transaction.
    fn abort(&mut self, fault: Fault, wake: &mut Wake) {
        self.release_bus();
        self.discard_frame();
        self.phase = Phase::Idle;
        self.start_pending = false;
        self.trace.write(Trace::Fault(fault));
        self.complete(Err(fault), wake);
    }

    fn forced_reset(&mut self) {
        self.release_bus();
        self.discard_frame();
        self.phase = Phase::Idle;
        self.start_pending = false;
        self.xfer.ownership = Ownership::Idle;
        self.trace.write(Trace::ForcedReset);
    }

    fn release_bus(&mut self) {
        self.bus.clear_control(Control::START);
        match self.mode {
            ModeKind::IpmbSlave => self.bus.set_control(Control::STOP | Control::ACK),
            ModeKind::LocalMaster => {
                self.bus.clear_control(Control::ACK);
                self.bus.set_control(Control::STOP);
            }
        }
        self.bus.clear_control(Control::INTERRUPT);
    }

    fn complete(&mut self, result: Result<(), Fault>, wake: &mut Wake) {
        match self.xfer.ownership {
            Ownership::Engine => {
                self.xfer.result = result;
                self.xfer.ownership = Ownership::Done;
                if result.is_ok() {
                    self.trace.write(Trace::Completed(self.xfer.seq));
                }
                wake.completed = Some(self.xfer.seq);
            }
            Ownership::Abandoned => self.xfer.ownership = Ownership::Idle,
            Ownership::Idle | Ownership::Done => {}
        }
    }

    fn begin_frame(&mut self) {
        self.discard_frame();
        self.bus.set_control(Control::ACK);
        self.bus.clear_control(Control::INTERRUPT);
        self.phase = Phase::SlaveReceive;
    }

    fn discard_frame(&mut self) {
        self.frame.clear();
        self.frame_overflow = false;
    }

    fn end_frame<L: Logger>(&mut self, logger: &L, wake: &mut Wake) {
        self.phase = if core::mem::take(&mut self.start_pending) {
            Phase::Starting
        } else {
            Phase::Idle
        };

        let bytes = core::mem::take(&mut self.frame);
        let overflow = core::mem::take(&mut self.frame_overflow);
        if bytes.is_empty() && !overflow {
            return;
        }
        if overflow {
            logger.warn(format_args!("{}: slave frame overflow", self.id));
            self.trace.write(Trace::FrameOverflow);
        }

        match self.frames.push_back(SlaveFrame { bytes, overflow }) {
            Ok(()) => {
                let queued = u8::try_from(self.frames.len()).unwrap_or(u8::MAX);
                self.trace.write(Trace::FrameQueued(queued));
                wake.frame = true;
            }
            Err(_) => {
                logger.warn(format_args!("{}: frame queue full, dropping", self.id));
                self.trace.write(Trace::FrameDropped);
            }
        }
    }
}

const fn idle_ack(mode: ModeKind) -> Control {
    match mode {
        ModeKind::IpmbSlave => Control::ACK,
        ModeKind::LocalMaster => Control::empty(),
    }
}
