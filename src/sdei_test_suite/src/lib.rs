//! SDEI conformance tests that run on top of a platform abstraction layer.
//!
//! The test cases in [`sdei_tests`] consume the dispatcher, the watchdogs, the
//! interrupt controller, the memory map and the PE through the traits defined
//! in [`platform`]. A port (a bare-metal firmware image, or `sdei_port_std`
//! on a hosted environment) implements these traits and instantiates the
//! test cases.
//!
//! ```rust,ignore
//! static CHECK: OnceLock<EventStatusCheck<MyPlatform>> = OnceLock::new();
//!
//! let check = CHECK.get_or_init(|| EventStatusCheck::new(MyPlatform, Config::DEFAULT));
//! assert_eq!(check.run(), TestOutcome::Pass);
//! ```
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]

pub mod outcome;
pub mod platform;
pub mod sdei;
pub mod sdei_tests;
pub mod utils;

pub use outcome::TestOutcome;
