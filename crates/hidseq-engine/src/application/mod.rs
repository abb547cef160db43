//! Application layer: sequence runs, the two executors and the async driver.
//!
//! Everything here depends only on `hidseq-core` types and on the ports in
//! [`device`]; the serial port, toggle program and config file are injected
//! from the infrastructure layer.

pub mod context;
pub mod device;
pub mod engine;
pub mod parallel;
pub mod run;
pub mod sequential;
pub mod service;
