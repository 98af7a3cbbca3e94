// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concrete drivers: one per transport.
//!
//! - [`line`] — newline-delimited JSON records over a long-lived TCP stream
//! - [`rest`] — request/response HTTP/1.1 with a pooled connection
//! - [`sdk`] — in-process vendor-library wrapper

pub mod line;
pub mod rest;
pub mod sdk;

pub use line::LineDriver;
pub use rest::RestDriver;
pub use sdk::{SdkDriver, VendorApi, VendorError};

#[cfg(any(test, feature = "test-support"))]
pub use sdk::SimVendor;
