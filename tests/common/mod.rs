//! Integration test common infrastructure.
//!
//! Provides a scriptable in-memory IRC connection, a factory that hands them
//! out, and a harness that wires a `BridgedClient` to both.

pub mod connection;
pub mod harness;

#[allow(unused_imports)]
pub use connection::{JoinBehavior, MockConnection, MockFactory, NickBehavior};
#[allow(unused_imports)]
pub use harness::{Harness, RecordingSink, server, settle};
