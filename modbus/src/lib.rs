//! Modbus TCP transport
//!
//! The library is organized as a workspace:
//!
//! - `modbus-core`: errors, MBAP constants, unit ids and per-function framing lengths
//! - `modbus-transport`: TCP connections, MBAP headers, message reassembly and recovery
//!
//! # Usage
//!
//! ```no_run
//! use modbus::tcp::{Backend, TcpConnection};
//!
//! # async fn run() -> modbus::ModbusResult<()> {
//! let mut ctx = TcpConnection::new_tcp("127.0.0.1", 502)?;
//! ctx.set_unit_id(1)?;
//! ctx.connect().await?;
//!
//! let mut req = [0u8; 260];
//! let len = ctx.build_request_basis(0x03, 0x0000, 10, &mut req)?;
//! ctx.send_message(&mut req[..len]).await?;
//!
//! let mut rsp = [0u8; 260];
//! let n = ctx.receive_confirmation(&req[..len], &mut rsp).await?;
//! # let _ = n;
//! # Ok(())
//! # }
//! ```

// Re-export core types
pub use modbus_core::{MessageType, ModbusError, ModbusResult, UnitId};
pub use modbus_core::constants;
pub use modbus_core::function;

// Re-export the TCP transport
pub mod tcp {
    pub use modbus_transport::*;
}
