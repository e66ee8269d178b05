// Licensed under the Apache-2.0 license

//! IPMB frame layout.
//!
//! A frame as seen by the receiving controller, after its own slave address:
//!
//! ```text
//! +-----------+------+------+-------------+-----+---------+------+
//! | netFn|LUN | chk1 | srcA | seq|srcLUN  | cmd | data... | chk2 |
//! +-----------+------+------+-------------+-----+---------+------+
//! ```
//!
//! `chk1` covers the destination address and the first byte; `chk2` covers
//! everything from `srcA` through the data. Both are two's-complement sums.
//! Responses carry their completion code as the first data byte.

use core::fmt;

use heapless::Vec;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::i2c::common::MAX_MSG_LENGTH;

/// Header bytes from `netFn|LUN` through `cmd`.
pub const HEADER_LEN: usize = 5;

/// Shortest valid frame: header plus `chk2`.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;

/// Room for data (completion code included) in a maximum-length frame.
pub const MAX_DATA_LEN: usize = MAX_MSG_LENGTH - MIN_FRAME_LEN;

/// Network function code (six bits). Even codes are requests; the matching
/// response code is one higher.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NetFn(u8);

impl NetFn {
    pub const CHASSIS: Self = Self(0x00);
    pub const BRIDGE: Self = Self(0x02);
    pub const SENSOR_EVENT: Self = Self(0x04);
    pub const APP: Self = Self(0x06);
    pub const FIRMWARE: Self = Self(0x08);
    pub const STORAGE: Self = Self(0x0A);
    pub const TRANSPORT: Self = Self(0x0C);
    pub const GROUP_EXTENSION: Self = Self(0x2C);

    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw & 0x3F)
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_request(self) -> bool {
        self.0 & 1 == 0
    }

    /// Response code for this request code.
    #[must_use]
    pub const fn response(self) -> Self {
        Self(self.0 | 1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompletionCode(pub u8);

impl CompletionCode {
    pub const SUCCESS: Self = Self(0x00);
    pub const NODE_BUSY: Self = Self(0xC0);
    pub const INVALID_COMMAND: Self = Self(0xC1);
    pub const INVALID_FOR_LUN: Self = Self(0xC2);
    pub const TIMEOUT: Self = Self(0xC3);
    pub const OUT_OF_SPACE: Self = Self(0xC4);
    pub const REQUEST_DATA_LENGTH_INVALID: Self = Self(0xC7);
    pub const REQUEST_DATA_FIELD_LENGTH_EXCEEDED: Self = Self(0xC8);
    pub const PARAMETER_OUT_OF_RANGE: Self = Self(0xC9);
    pub const CANNOT_RETURN_REQUESTED_BYTES: Self = Self(0xCA);
    pub const INVALID_DATA_FIELD: Self = Self(0xCC);
    pub const UNSPECIFIED: Self = Self(0xFF);

    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    TooShort,
    HeaderChecksum,
    DataChecksum,
    NotARequest,
    PayloadTooLong,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            FrameError::TooShort => "frame too short",
            FrameError::HeaderChecksum => "header checksum mismatch",
            FrameError::DataChecksum => "data checksum mismatch",
            FrameError::NotARequest => "not a request",
            FrameError::PayloadTooLong => "payload too long",
        };
        f.write_str(msg)
    }
}

#[derive(Copy, Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct Header {
    netfn_lun: u8,
    header_checksum: u8,
    source: u8,
    seq_lun: u8,
    command: u8,
}

/// Two's-complement checksum: `sum(bytes) + checksum(bytes) == 0 (mod 256)`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, byte| sum.wrapping_add(*byte))
        .wrapping_neg()
}

/// A decoded IPMB request or response. Addresses are in 8-bit form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IpmiMessage {
    pub netfn: NetFn,
    pub command: u8,
    /// Six-bit sequence number chosen by the requester.
    pub sequence: u8,
    pub requester: u8,
    pub requester_lun: u8,
    pub responder: u8,
    pub responder_lun: u8,
    /// Present on responses only.
    pub completion_code: Option<CompletionCode>,
    pub data: Vec<u8, MAX_DATA_LEN>,
}

impl IpmiMessage {
    pub fn request(
        netfn: NetFn,
        command: u8,
        sequence: u8,
        requester: u8,
        responder: u8,
        data: &[u8],
    ) -> Result<Self, FrameError> {
        if !netfn.is_request() {
            return Err(FrameError::NotARequest);
        }
        Ok(Self {
            netfn,
            command,
            sequence: sequence & 0x3F,
            requester,
            requester_lun: 0,
            responder,
            responder_lun: 0,
            completion_code: None,
            data: Vec::from_slice(data).map_err(|()| FrameError::PayloadTooLong)?,
        })
    }

    /// Response to this request, echoing its command and sequence number.
    pub fn response(&self, completion_code: CompletionCode, data: &[u8]) -> Result<Self, FrameError> {
        if !self.netfn.is_request() {
            return Err(FrameError::NotARequest);
        }
        if data.len() >= MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLong);
        }
        Ok(Self {
            netfn: self.netfn.response(),
            completion_code: Some(completion_code),
            data: Vec::from_slice(data).map_err(|()| FrameError::PayloadTooLong)?,
            ..self.clone()
        })
    }

    /// 8-bit address of the node this message travels to.
    #[must_use]
    pub fn destination(&self) -> u8 {
        if self.netfn.is_request() {
            self.responder
        } else {
            self.requester
        }
    }

    /// Parse a frame received at 8-bit address `destination`.
    pub fn decode(destination: u8, frame: &[u8]) -> Result<Self, FrameError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort);
        }
        let (header, rest) =
            Header::read_from_prefix(frame).map_err(|_| FrameError::TooShort)?;
        if checksum(&[destination, header.netfn_lun]) != header.header_checksum {
            return Err(FrameError::HeaderChecksum);
        }
        let covered = frame.get(2..).ok_or(FrameError::TooShort)?;
        if checksum(covered) != 0 {
            return Err(FrameError::DataChecksum);
        }
        let (_, payload) = rest.split_last().ok_or(FrameError::TooShort)?;

        let netfn = NetFn::new(header.netfn_lun >> 2);
        let destination_lun = header.netfn_lun & 0x03;
        let source_lun = header.seq_lun & 0x03;
        let sequence = header.seq_lun >> 2;

        let (completion_code, data) = if netfn.is_request() {
            (None, payload)
        } else {
            let (cc, data) = payload.split_first().ok_or(FrameError::TooShort)?;
            (Some(CompletionCode(*cc)), data)
        };
        let data = Vec::from_slice(data).map_err(|()| FrameError::PayloadTooLong)?;

        let message = if netfn.is_request() {
            Self {
                netfn,
                command: header.command,
                sequence,
                requester: header.source,
                requester_lun: source_lun,
                responder: destination,
                responder_lun: destination_lun,
                completion_code,
                data,
            }
        } else {
            Self {
                netfn,
                command: header.command,
                sequence,
                requester: destination,
                requester_lun: destination_lun,
                responder: header.source,
                responder_lun: source_lun,
                completion_code,
                data,
            }
        };
        Ok(message)
    }

    /// Serialize everything after the destination's slave address.
    pub fn encode(&self) -> Result<Vec<u8, MAX_MSG_LENGTH>, FrameError> {
        let (destination, destination_lun, source, source_lun) = if self.netfn.is_request() {
            (self.responder, self.responder_lun, self.requester, self.requester_lun)
        } else {
            (self.requester, self.requester_lun, self.responder, self.responder_lun)
        };
        let netfn_lun = (self.netfn.raw() << 2) | (destination_lun & 0x03);
        let header = Header {
            netfn_lun,
            header_checksum: checksum(&[destination, netfn_lun]),
            source,
            seq_lun: (self.sequence << 2) | (source_lun & 0x03),
            command: self.command,
        };

        let mut frame: Vec<u8, MAX_MSG_LENGTH> = Vec::new();
        let too_long = |_| FrameError::PayloadTooLong;
        frame.extend_from_slice(header.as_bytes()).map_err(too_long)?;
        if let Some(cc) = self.completion_code {
            frame.push(cc.0).map_err(|_| FrameError::PayloadTooLong)?;
        }
        frame.extend_from_slice(&self.data).map_err(too_long)?;
        let chk2 = frame.get(2..).map_or(0, checksum);
        frame.push(chk2).map_err(|_| FrameError::PayloadTooLong)?;
        Ok(frame)
    }
}
