// Licensed under the Apache-2.0 license

//! Own bus address of an IPMB channel.

use crate::i2c::common::Error;

/// A 7-bit address usable as a slave address.
///
/// The reserved blocks `0x00..=0x07` and `0x78..=0x7F` are rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BusAddress(u8);

impl BusAddress {
    pub const fn new(address: u8) -> Result<Self, Error> {
        match address {
            0x08..=0x77 => Ok(Self(address)),
            _ => Err(Error::InvalidAddress),
        }
    }

    /// From the 8-bit form used inside IPMB frames. The low bit must be 0.
    pub const fn from_ipmb(address: u8) -> Result<Self, Error> {
        if address & 1 != 0 {
            return Err(Error::InvalidAddress);
        }
        Self::new(address >> 1)
    }

    #[must_use]
    pub const fn seven_bit(self) -> u8 {
        self.0
    }

    /// 8-bit form (7-bit address shifted left), as carried in IPMB headers.
    #[must_use]
    pub const fn ipmb(self) -> u8 {
        self.0 << 1
    }
}

impl TryFrom<u8> for BusAddress {
    type Error = Error;

    fn try_from(address: u8) -> Result<Self, Self::Error> {
        Self::new(address)
    }
}

/// Supplies the channel's own address before the first transaction.
///
/// On an AMC this is derived from the slot's geographic-address pins by
/// board code; the engine only needs the result.
pub trait AddressResolver {
    fn resolve(&self) -> Result<BusAddress, Error>;
}

/// Resolver for a statically assigned address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FixedAddress(pub BusAddress);

impl AddressResolver for FixedAddress {
    fn resolve(&self) -> Result<BusAddress, Error> {
        Ok(self.0)
    }
}

impl<F> AddressResolver for F
where
    F: Fn() -> Result<BusAddress, Error>,
{
    fn resolve(&self) -> Result<BusAddress, Error> {
        self()
    }
}
