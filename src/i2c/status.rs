// Licensed under the Apache-2.0 license

//! Controller status codes.

/// Protocol state reported by the controller when it raises an interrupt.
///
/// Names follow the sub-machine the code belongs to: master transmit,
/// master receive, slave receive and slave transmit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BusStatus {
    BusError = 0x00,
    Start = 0x08,
    RepeatedStart = 0x10,
    AddressWriteAck = 0x18,
    AddressWriteNack = 0x20,
    DataSentAck = 0x28,
    DataSentNack = 0x30,
    ArbitrationLost = 0x38,
    AddressReadAck = 0x40,
    AddressReadNack = 0x48,
    DataReceivedAck = 0x50,
    DataReceivedNack = 0x58,
    OwnAddressWrite = 0x60,
    ArbitrationLostOwnAddressWrite = 0x68,
    GeneralCall = 0x70,
    ArbitrationLostGeneralCall = 0x78,
    SlaveDataAck = 0x80,
    SlaveDataNack = 0x88,
    GeneralCallDataAck = 0x90,
    GeneralCallDataNack = 0x98,
    SlaveStop = 0xA0,
    OwnAddressRead = 0xA8,
    ArbitrationLostOwnAddressRead = 0xB0,
    SlaveDataSentAck = 0xB8,
    SlaveDataSentNack = 0xC0,
    SlaveLastDataSentAck = 0xC8,
    NoInfo = 0xF8,
}

impl TryFrom<u8> for BusStatus {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        let status = match code {
            0x00 => Self::BusError,
            0x08 => Self::Start,
            0x10 => Self::RepeatedStart,
            0x18 => Self::AddressWriteAck,
            0x20 => Self::AddressWriteNack,
            0x28 => Self::DataSentAck,
            0x30 => Self::DataSentNack,
            0x38 => Self::ArbitrationLost,
            0x40 => Self::AddressReadAck,
            0x48 => Self::AddressReadNack,
            0x50 => Self::DataReceivedAck,
            0x58 => Self::DataReceivedNack,
            0x60 => Self::OwnAddressWrite,
            0x68 => Self::ArbitrationLostOwnAddressWrite,
            0x70 => Self::GeneralCall,
            0x78 => Self::ArbitrationLostGeneralCall,
            0x80 => Self::SlaveDataAck,
            0x88 => Self::SlaveDataNack,
            0x90 => Self::GeneralCallDataAck,
            0x98 => Self::GeneralCallDataNack,
            0xA0 => Self::SlaveStop,
            0xA8 => Self::OwnAddressRead,
            0xB0 => Self::ArbitrationLostOwnAddressRead,
            0xB8 => Self::SlaveDataSentAck,
            0xC0 => Self::SlaveDataSentNack,
            0xC8 => Self::SlaveLastDataSentAck,
            0xF8 => Self::NoInfo,
            other => return Err(other),
        };
        Ok(status)
    }
}

impl BusStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}
