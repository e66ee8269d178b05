// Licensed under the Apache-2.0 license

//! Get Device ID (App netFn, command 0x01).

use heapless::Vec;
use hex_literal::hex;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::ipmb::dispatch::{CommandHandler, MAX_RESPONSE_DATA};
use crate::ipmb::message::{CompletionCode, IpmiMessage};

pub const GET_DEVICE_ID: u8 = 0x01;

/// Response body of Get Device ID, without the completion code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DeviceId {
    pub device_id: u8,
    pub device_revision: u8,
    pub firmware_major: u8,
    /// BCD.
    pub firmware_minor: u8,
    /// BCD, minor nibble first: 0x02 is IPMI 2.0.
    pub ipmi_version: u8,
    pub device_support: u8,
    /// IANA enterprise number, little endian.
    pub manufacturer_id: [u8; 3],
    pub product_id: [u8; 2],
}

impl DeviceId {
    /// Identity reported by the AFC board controller.
    pub const AFC: Self = zerocopy::transmute!(hex!("0A 02 05 50 02 1F 5A 31 00 01 01"));
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::AFC
    }
}

pub struct GetDeviceId {
    id: DeviceId,
}

impl GetDeviceId {
    #[must_use]
    pub const fn new(id: DeviceId) -> Self {
        Self { id }
    }
}

impl CommandHandler for GetDeviceId {
    fn handle(
        &self,
        _request: &IpmiMessage,
        response: &mut Vec<u8, MAX_RESPONSE_DATA>,
    ) -> CompletionCode {
        match response.extend_from_slice(self.id.as_bytes()) {
            Ok(()) => CompletionCode::SUCCESS,
            Err(()) => CompletionCode::OUT_OF_SPACE,
        }
    }
}
