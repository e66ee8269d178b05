// Licensed under the Apache-2.0 license

//! Host model of an LPC-style controller and the bus around it.
//!
//! The model reacts to control register writes the way the silicon does:
//! nothing moves while the interrupt flag is set, and clearing it performs
//! the next bus action and raises the flag again with a new status. A
//! background thread plays the interrupt controller and calls the engine's
//! handler whenever the flag is up.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::vec::Vec;

use crate::i2c::address::BusAddress;
use crate::i2c::common::ChannelConfigBuilder;
use crate::i2c::engine::Engine;
use crate::i2c::mode::{Channel, ChannelId, IpmbSlave, LocalMaster};
use crate::i2c::std_support::{StdClock, StdSignal};
use crate::i2c::traits::{BusController, Control};

pub(crate) type SimEngine = Engine<SimBus, StdSignal, StdClock, 2>;

pub(crate) const CHANNEL: ChannelId = ChannelId::new(0);

/// What a logic analyser on the wire would show for our own master traffic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum BusEvent {
    Start,
    RepeatedStart,
    Address { address: u8, read: bool },
    Write(u8),
    Read { byte: u8, ack: bool },
    Stop,
}

/// A device we can address as master.
#[derive(Clone, Debug, Default)]
pub(crate) struct Target {
    received: Vec<u8>,
    nack_after: Option<usize>,
    read_data: Vec<u8>,
    read_pos: usize,
}

impl Target {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` data bytes in total, NACK the rest.
    pub fn nack_after(mut self, count: usize) -> Self {
        self.nack_after = Some(count);
        self
    }

    /// Bytes returned to reads, repeated cyclically.
    pub fn with_read_data(mut self, data: &[u8]) -> Self {
        self.read_data = data.to_vec();
        self
    }

    fn next_read(&mut self) -> u8 {
        if self.read_data.is_empty() {
            return 0xFF;
        }
        let byte = self.read_data[self.read_pos % self.read_data.len()];
        self.read_pos += 1;
        byte
    }
}

enum State {
    Idle,
    /// START is on the wire, waiting for SLA+R/W in the data register.
    Address,
    Transmit { address: u8 },
    Receive { address: u8 },
    Slave { general_call: bool, bytes: VecDeque<u8> },
    /// Off the bus until the interrupt flag is cleared.
    Released,
}

struct FaultPlan {
    at_write: usize,
    status: u8,
}

struct Model {
    control: Control,
    status: u8,
    data: u8,
    own: Option<(u8, bool)>,
    state: State,
    events: Vec<BusEvent>,
    targets: HashMap<u8, Target>,
    inbound: VecDeque<(u8, Vec<u8>)>,
    fault: Option<FaultPlan>,
    writes: usize,
    stalled: bool,
}

impl Model {
    fn new() -> Self {
        Self {
            control: Control::empty(),
            status: 0xF8,
            data: 0,
            own: None,
            state: State::Idle,
            events: Vec::new(),
            targets: HashMap::new(),
            inbound: VecDeque::new(),
            fault: None,
            writes: 0,
            stalled: false,
        }
    }

    fn raise(&mut self, status: u8) {
        self.status = status;
        self.control.insert(Control::INTERRUPT);
    }

    fn set(&mut self, bits: Control) {
        self.control.insert(bits);
        if self.control.contains(Control::INTERRUPT) {
            return;
        }
        if bits.contains(Control::STOP) {
            self.stop();
        }
        if bits.contains(Control::START) {
            self.try_start();
        }
        if bits.contains(Control::ACK) {
            self.poll_inbound();
        }
    }

    fn clear(&mut self, bits: Control) {
        let pending = self.control.contains(Control::INTERRUPT);
        // STO is cleared by hardware only.
        self.control.remove(bits - Control::STOP);
        if pending && bits.contains(Control::INTERRUPT) {
            self.resume();
        }
    }

    fn resume(&mut self) {
        self.status = 0xF8;
        if self.control.contains(Control::STOP) {
            self.stop();
            self.after_release();
            return;
        }
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle | State::Released => self.after_release(),
            State::Address => self.address_phase(),
            State::Transmit { address } => {
                if self.control.contains(Control::START) {
                    self.repeated_start();
                } else {
                    self.transmit(address);
                }
            }
            State::Receive { address } => {
                if self.control.contains(Control::START) {
                    self.repeated_start();
                } else {
                    self.receive(address);
                }
            }
            State::Slave {
                general_call,
                bytes,
            } => self.slave_next(general_call, bytes),
        }
    }

    fn after_release(&mut self) {
        self.state = State::Idle;
        if self.control.contains(Control::START) {
            self.try_start();
        } else {
            self.poll_inbound();
        }
    }

    fn stop(&mut self) {
        self.control.remove(Control::STOP);
        if matches!(
            self.state,
            State::Address | State::Transmit { .. } | State::Receive { .. }
        ) {
            self.events.push(BusEvent::Stop);
        }
        self.state = State::Idle;
    }

    fn try_start(&mut self) {
        if self.stalled || !matches!(self.state, State::Idle) {
            return;
        }
        self.events.push(BusEvent::Start);
        self.state = State::Address;
        self.raise(0x08);
    }

    fn repeated_start(&mut self) {
        self.events.push(BusEvent::RepeatedStart);
        self.state = State::Address;
        self.raise(0x10);
    }

    /// Count a byte put on the wire; true if the planned fault fires on it.
    fn fault_fires(&mut self) -> bool {
        let fires = self
            .fault
            .as_ref()
            .is_some_and(|plan| plan.at_write == self.writes);
        self.writes += 1;
        if let Some(plan) = self.fault.take_if(|_| fires) {
            self.state = State::Released;
            self.raise(plan.status);
        }
        fires
    }

    fn address_phase(&mut self) {
        let address = self.data >> 1;
        let read = self.data & 1 == 1;
        self.events.push(BusEvent::Address { address, read });
        if self.fault_fires() {
            return;
        }
        let present = self.targets.contains_key(&address);
        self.state = if read {
            State::Receive { address }
        } else {
            State::Transmit { address }
        };
        self.raise(match (read, present) {
            (false, true) => 0x18,
            (false, false) => 0x20,
            (true, true) => 0x40,
            (true, false) => 0x48,
        });
    }

    fn transmit(&mut self, address: u8) {
        let byte = self.data;
        self.events.push(BusEvent::Write(byte));
        if self.fault_fires() {
            return;
        }
        self.state = State::Transmit { address };
        let accepted = match self.targets.get_mut(&address) {
            Some(target) if target.nack_after.map_or(true, |n| target.received.len() < n) => {
                target.received.push(byte);
                true
            }
            _ => false,
        };
        self.raise(if accepted { 0x28 } else { 0x30 });
    }

    fn receive(&mut self, address: u8) {
        let byte = self
            .targets
            .get_mut(&address)
            .map_or(0xFF, Target::next_read);
        let ack = self.control.contains(Control::ACK);
        self.events.push(BusEvent::Read { byte, ack });
        self.data = byte;
        self.state = State::Receive { address };
        self.raise(if ack { 0x50 } else { 0x58 });
    }

    fn poll_inbound(&mut self) {
        if !matches!(self.state, State::Idle)
            || self.control.contains(Control::INTERRUPT)
            || !self.control.contains(Control::ACK)
        {
            return;
        }
        while let Some((address, bytes)) = self.inbound.pop_front() {
            let general_call = address == 0;
            let addressed = self.own.is_some_and(|(own, accept_general_call)| {
                own == address || (general_call && accept_general_call)
            });
            if addressed {
                self.state = State::Slave {
                    general_call,
                    bytes: bytes.into(),
                };
                self.raise(if general_call { 0x70 } else { 0x60 });
                return;
            }
        }
    }

    fn slave_next(&mut self, general_call: bool, mut bytes: VecDeque<u8>) {
        let ack = self.control.contains(Control::ACK);
        match bytes.pop_front() {
            Some(byte) => {
                self.data = byte;
                let status = match (general_call, ack) {
                    (false, true) => 0x80,
                    (false, false) => 0x88,
                    (true, true) => 0x90,
                    (true, false) => 0x98,
                };
                // A NACKed byte drops us out of the frame.
                self.state = if ack {
                    State::Slave {
                        general_call,
                        bytes,
                    }
                } else {
                    State::Released
                };
                self.raise(status);
            }
            None => {
                self.state = State::Released;
                self.raise(0xA0);
            }
        }
    }
}

/// Shared handle to the model; the engine owns one clone, the test another.
#[derive(Clone)]
pub(crate) struct SimBus(Arc<Mutex<Model>>);

impl SimBus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Model::new())))
    }

    fn model(&self) -> MutexGuard<'_, Model> {
        self.0.lock().unwrap()
    }

    pub fn attach(&self, address: u8, target: Target) {
        self.model().targets.insert(address, target);
    }

    /// Data bytes a target has accepted so far.
    pub fn received(&self, address: u8) -> Vec<u8> {
        self.model()
            .targets
            .get(&address)
            .map(|t| t.received.clone())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.model().events.clone()
    }

    pub fn clear_events(&self) {
        self.model().events.clear();
    }

    /// Another master writes `bytes` to 7-bit `address` once the bus is free.
    pub fn inject_frame(&self, address: u8, bytes: &[u8]) {
        let mut model = self.model();
        model.inbound.push_back((address, bytes.to_vec()));
        model.poll_inbound();
    }

    /// Report `status` instead of an ACK on the `at_write`-th byte we put on
    /// the wire from now on (0 is the next address byte).
    pub fn fail_at_write(&self, at_write: usize, status: u8) {
        let mut model = self.model();
        model.writes = 0;
        model.fault = Some(FaultPlan { at_write, status });
    }

    /// While stalled, START requests are never granted.
    pub fn set_stalled(&self, stalled: bool) {
        self.model().stalled = stalled;
    }

    /// Grant a START request left over from while the bus was stalled.
    pub fn release_stalled_start(&self) {
        let mut model = self.model();
        if model.control.contains(Control::START) && !model.control.contains(Control::INTERRUPT) {
            model.try_start();
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        let model = self.model();
        model.control.contains(Control::ENABLE | Control::INTERRUPT)
    }
}

impl BusController for SimBus {
    fn status(&self) -> u8 {
        self.model().status
    }

    fn set_control(&mut self, bits: Control) {
        self.model().set(bits);
    }

    fn clear_control(&mut self, bits: Control) {
        self.model().clear(bits);
    }

    fn write_data(&mut self, byte: u8) {
        self.model().data = byte;
    }

    fn read_data(&self) -> u8 {
        self.model().data
    }

    fn set_own_address(&mut self, address: u8, general_call: bool) {
        self.model().own = Some((address, general_call));
    }
}

/// Calls `isr` whenever the simulated interrupt flag is up.
pub(crate) struct IrqThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IrqThread {
    pub fn spawn<F>(bus: SimBus, isr: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if bus.interrupt_pending() {
                        isr();
                    } else {
                        thread::sleep(Duration::from_micros(50));
                    }
                }
            })
        };
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for IrqThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// An engine, one simulated controller on [`CHANNEL`], and its interrupt
/// thread.
pub(crate) struct Rig {
    pub engine: Arc<SimEngine>,
    pub sim: SimBus,
    _irq: IrqThread,
}

impl Rig {
    pub fn new() -> Self {
        let engine = Arc::new(SimEngine::new(StdClock::new()));
        let sim = SimBus::new();
        let irq = {
            let engine = engine.clone();
            IrqThread::spawn(sim.clone(), move || engine.on_interrupt(CHANNEL))
        };
        Self {
            engine,
            sim,
            _irq: irq,
        }
    }

    pub fn local_master(&self) -> Channel<LocalMaster> {
        self.engine
            .init::<LocalMaster>(CHANNEL, self.sim.clone(), (), Default::default())
            .unwrap()
    }

    pub fn ipmb(&self, own: u8, general_call: bool) -> Channel<IpmbSlave> {
        let config = ChannelConfigBuilder::new()
            .general_call(general_call)
            .build();
        self.engine
            .init::<IpmbSlave>(CHANNEL, self.sim.clone(), BusAddress::new(own).unwrap(), config)
            .unwrap()
    }

    /// Poll `done` for up to a second.
    pub fn wait_for(&self, done: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(1);
        while !done() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(1));
        }
    }
}
