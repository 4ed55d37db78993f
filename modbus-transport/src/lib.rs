//! Transport layer of a Modbus TCP stack
//!
//! This crate provides the TCP connection (client connect, server listen and
//! accept), MBAP header construction, step-wise message reassembly and the
//! link recovery policy. Upper layers drive it through the [`Backend`] trait.

pub mod backend;
pub mod framer;
pub mod mbap;
pub mod recovery;
pub mod settings;
pub mod socket;
pub mod target;
pub mod tcp;

pub use backend::Backend;
pub use framer::{Framer, Step};
pub use mbap::{ServerTransaction, TransactionCounter};
pub use recovery::LinkRepair;
pub use settings::{ErrorRecovery, TcpSettings, TraceDirection, TraceHook};
pub use target::TcpTarget;
pub use tcp::TcpConnection;
