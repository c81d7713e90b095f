//! SDEI test cases
//!
//! Each test case is a module defining a `META` constant and a check type that
//! a port instantiates with its [`Platform`](crate::platform::Platform)
//! implementation.
pub mod event_status;

/// Identifies a test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestMeta {
    /// The number under which the test case is published in the conformance
    /// test pool.
    pub id: u32,
    /// The module name of the test case.
    pub name: &'static str,
    pub description: &'static str,
}

/// All test cases, in the order they should run.
pub const TESTS: &[TestMeta] = &[event_status::META];

/// Find a test case by its name.
pub fn find(name: &str) -> Option<&'static TestMeta> {
    TESTS.iter().find(|meta| meta.name == name)
}
