// Licensed under the Apache-2.0 license

//! Channel roles and the typed handles that carry them.
//!
//! A channel is fixed to one role at initialization. The role is a type
//! parameter of its [`Channel`] handle, so asking a local-master channel to
//! receive as a slave, or an IPMB channel to perform a master read, does not
//! compile.

use core::fmt;
use core::marker::PhantomData;

use crate::i2c::address::BusAddress;

/// Index into an engine's channel table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u8);

impl ChannelId {
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i2c{}", self.0)
    }
}

/// Runtime tag of a channel's role.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModeKind {
    LocalMaster,
    IpmbSlave,
}

mod sealed {
    pub trait Sealed {}
}

/// A channel role.
pub trait Mode: sealed::Sealed {
    const KIND: ModeKind;

    /// Extra data needed to bring the channel up in this role.
    type Settings;

    fn own_address(settings: &Self::Settings) -> Option<BusAddress>;
}

/// Roles allowed to transmit as master.
pub trait MasterWrite: Mode {}

/// Roles allowed to receive as master.
pub trait MasterRead: Mode {}

/// Roles that accept frames from other masters.
pub trait SlaveReceive: Mode {}

/// Sensor bus: master read and write, never addressed.
#[derive(Copy, Clone, Debug)]
pub enum LocalMaster {}

/// IPMB link: master write for replies, slave receive for requests.
#[derive(Copy, Clone, Debug)]
pub enum IpmbSlave {}

impl sealed::Sealed for LocalMaster {}
impl sealed::Sealed for IpmbSlave {}

impl Mode for LocalMaster {
    const KIND: ModeKind = ModeKind::LocalMaster;
    type Settings = ();

    fn own_address(_: &()) -> Option<BusAddress> {
        None
    }
}

impl Mode for IpmbSlave {
    const KIND: ModeKind = ModeKind::IpmbSlave;
    type Settings = BusAddress;

    fn own_address(settings: &BusAddress) -> Option<BusAddress> {
        Some(*settings)
    }
}

impl MasterWrite for LocalMaster {}
impl MasterRead for LocalMaster {}
impl MasterWrite for IpmbSlave {}
impl SlaveReceive for IpmbSlave {}

/// Handle to an initialized channel in role `M`.
///
/// Only [`Engine::init`](super::engine::Engine::init) hands these out.
pub struct Channel<M> {
    id: ChannelId,
    _mode: PhantomData<M>,
}

impl<M> Channel<M> {
    pub(crate) const fn new(id: ChannelId) -> Self {
        Self {
            id,
            _mode: PhantomData,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ChannelId {
        self.id
    }
}

impl<M> Clone for Channel<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Channel<M> {}

impl<M> fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Channel").field(&self.id).finish()
    }
}
