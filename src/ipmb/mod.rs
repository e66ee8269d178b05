// Licensed under the Apache-2.0 license

//! IPMB request handling on top of an [`IpmbSlave`](crate::i2c::IpmbSlave)
//! channel.

pub mod device_id;
pub mod dispatch;
pub mod message;

pub use device_id::{DeviceId, GetDeviceId, GET_DEVICE_ID};
pub use dispatch::{
    CommandHandler, DiagEvent, Diagnostics, Dispatcher, IpmbLink, IpmbPort, Outcome,
    RegisterError, MAX_HANDLERS, MAX_RESPONSE_DATA,
};
pub use message::{checksum, CompletionCode, FrameError, IpmiMessage, NetFn};
