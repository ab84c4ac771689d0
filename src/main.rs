//! Firmware entry for the DDC112 single-channel picoammeter.
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]
#![warn(missing_docs)]

#[cfg(target_os = "none")]
mod runtime;

/// Host builds only check that the library compiles; all functionality is
/// in [`runtime`].
#[cfg(not(target_os = "none"))]
fn main() {}
