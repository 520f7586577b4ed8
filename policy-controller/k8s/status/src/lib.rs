//! Writes the updates computed by the index to the cluster.
//!
//! Only the current holder of the write lease writes; other replicas drain
//! the queue and drop what they receive, relying on the index's periodic
//! resync once they acquire the lease.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;


pub use self::controller::{Controller, ControllerMetrics};
