//! Per-function framing lengths
//!
//! A Modbus frame carries no reliable length the receiver can trust up front, so
//! the receiver learns the size of a message from its function code: first the
//! fixed metadata that follows the function code, then the variable data whose
//! size the metadata announces.

use crate::error::{ModbusError, ModbusResult};

/// Direction of a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// A request received by a server
    Indication,
    /// A response received by a client
    Confirmation,
}

pub const READ_COILS: u8 = 0x01;
pub const READ_DISCRETE_INPUTS: u8 = 0x02;
pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const READ_INPUT_REGISTERS: u8 = 0x04;
pub const WRITE_SINGLE_COIL: u8 = 0x05;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const READ_EXCEPTION_STATUS: u8 = 0x07;
pub const WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const WRITE_MULTIPLE_REGISTERS: u8 = 0x10;
pub const REPORT_SLAVE_ID: u8 = 0x11;
pub const MASK_WRITE_REGISTER: u8 = 0x16;
pub const WRITE_AND_READ_REGISTERS: u8 = 0x17;

/// Number of bytes to read after the function code before the data length is known
pub fn meta_length_after_function(function: u8, msg_type: MessageType) -> usize {
    match msg_type {
        MessageType::Indication => match function {
            READ_COILS..=WRITE_SINGLE_REGISTER => 4,
            WRITE_MULTIPLE_COILS | WRITE_MULTIPLE_REGISTERS => 5,
            MASK_WRITE_REGISTER => 6,
            WRITE_AND_READ_REGISTERS => 9,
            // READ_EXCEPTION_STATUS, REPORT_SLAVE_ID and unknown functions
            _ => 0,
        },
        MessageType::Confirmation => match function {
            WRITE_SINGLE_COIL
            | WRITE_SINGLE_REGISTER
            | WRITE_MULTIPLE_COILS
            | WRITE_MULTIPLE_REGISTERS => 4,
            MASK_WRITE_REGISTER => 6,
            // Byte count, or the exception code of an exception response
            _ => 1,
        },
    }
}

/// Number of data bytes announced by the metadata
///
/// `msg` holds at least the header, the function code and its metadata;
/// `header_length` is the transport header length preceding the function code.
/// A message that ends before a byte the lookup needs is an invalid argument.
pub fn data_length_after_meta(
    msg: &[u8],
    header_length: usize,
    msg_type: MessageType,
) -> ModbusResult<usize> {
    let byte_at = |offset: usize| -> ModbusResult<u8> {
        let index = header_length + offset;
        msg.get(index).copied().ok_or_else(|| {
            ModbusError::InvalidArgument(format!(
                "Message of {} bytes ends before byte {}",
                msg.len(),
                index
            ))
        })
    };

    let function = byte_at(0)?;

    let length = match msg_type {
        MessageType::Indication => match function {
            WRITE_MULTIPLE_COILS | WRITE_MULTIPLE_REGISTERS => byte_at(5)?,
            WRITE_AND_READ_REGISTERS => byte_at(9)?,
            _ => 0,
        },
        MessageType::Confirmation => {
            if function <= READ_INPUT_REGISTERS
                || function == REPORT_SLAVE_ID
                || function == WRITE_AND_READ_REGISTERS
            {
                byte_at(1)?
            } else {
                0
            }
        }
    };

    Ok(length as usize)
}
