// Licensed under the Apache-2.0 license

// Enforce Copilot coding guidelines - prevent panic-prone patterns in production code only
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::indexing_slicing))]
#![cfg_attr(not(test), warn(clippy::expect_used))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]
pub mod common;
pub mod i2c;
pub mod ipmb;
pub mod lm75;

// Links the single-core critical-section implementation.
#[cfg(all(target_arch = "arm", target_os = "none"))]
use cortex_m as _;
