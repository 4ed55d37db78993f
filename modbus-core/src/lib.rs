//! Core types and utilities for the Modbus TCP transport
//!
//! This crate provides error handling, MBAP wire constants, unit identifiers
//! and the per-function framing lengths used by `modbus-transport`.

pub mod constants;
pub mod error;
pub mod function;
pub mod unit;

pub use error::{ModbusError, ModbusResult};
pub use function::MessageType;
pub use unit::UnitId;
