//! MBAP header construction and transaction ids

use bytes::{Buf, BufMut};
use modbus_core::constants::{
    MBAP_LENGTH_OFFSET, MODBUS_PROTOCOL_ID, TCP_HEADER_LENGTH, TCP_MAX_ADU_LENGTH,
    TCP_PRESET_REQ_LENGTH, TCP_PRESET_RSP_LENGTH,
};
use modbus_core::{ModbusError, ModbusResult, UnitId};

/// Transaction id sequence of one connection
///
/// Starts at 0; every request takes the next value, wrapping from 65535 to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionCounter {
    current: u16,
}

impl TransactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the sequence and return the id to use
    pub fn next(&mut self) -> u16 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    /// Id handed out last (0 before the first request)
    pub fn current(&self) -> u16 {
        self.current
    }
}

/// Server side view of an indication, used to build the matching response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTransaction {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub function: u8,
}

impl ServerTransaction {
    /// Extract the transaction context from a received indication
    pub fn from_indication(req: &[u8]) -> ModbusResult<Self> {
        ensure_length(req, TCP_HEADER_LENGTH + 1, "indication")?;
        Ok(Self {
            transaction_id: transaction_id(req)?,
            unit_id: req[TCP_HEADER_LENGTH - 1],
            function: req[TCP_HEADER_LENGTH],
        })
    }
}

/// Write a request basis: MBAP header, function, start address and quantity
///
/// The length field is zeroed and must be patched with [`set_length`] once the
/// message is complete. Returns the number of bytes written.
pub fn build_request_basis(
    transaction_id: u16,
    unit_id: UnitId,
    function: u8,
    addr: u16,
    nb: u16,
    req: &mut [u8],
) -> ModbusResult<usize> {
    ensure_length(req, TCP_PRESET_REQ_LENGTH, "request buffer")?;

    let mut buf = &mut req[..TCP_PRESET_REQ_LENGTH];
    buf.put_u16(transaction_id);
    buf.put_u16(MODBUS_PROTOCOL_ID);
    buf.put_u16(0);
    buf.put_u8(unit_id.value());
    buf.put_u8(function);
    buf.put_u16(addr);
    buf.put_u16(nb);

    Ok(TCP_PRESET_REQ_LENGTH)
}

/// Write a response basis echoing the indication's transaction id, unit and function
pub fn build_response_basis(sft: &ServerTransaction, rsp: &mut [u8]) -> ModbusResult<usize> {
    ensure_length(rsp, TCP_PRESET_RSP_LENGTH, "response buffer")?;

    let mut buf = &mut rsp[..TCP_PRESET_RSP_LENGTH];
    buf.put_u16(sft.transaction_id);
    buf.put_u16(MODBUS_PROTOCOL_ID);
    buf.put_u16(0);
    buf.put_u8(sft.unit_id);
    buf.put_u8(sft.function);

    Ok(TCP_PRESET_RSP_LENGTH)
}

/// Transaction id carried in bytes 0-1
pub fn transaction_id(msg: &[u8]) -> ModbusResult<u16> {
    ensure_length(msg, 2, "message")?;
    Ok((&msg[..2]).get_u16())
}

/// Length field carried in bytes 4-5
pub fn declared_length(msg: &[u8]) -> ModbusResult<u16> {
    ensure_length(msg, MBAP_LENGTH_OFFSET, "message")?;
    Ok((&msg[4..MBAP_LENGTH_OFFSET]).get_u16())
}

/// Patch the length field of a complete message, returning the message length
///
/// The field counts every byte after the first six: unit id, function and data.
pub fn set_length(msg: &mut [u8]) -> ModbusResult<usize> {
    let msg_length = msg.len();
    if msg_length < TCP_HEADER_LENGTH {
        return Err(ModbusError::InvalidArgument(format!(
            "Message of {} bytes is shorter than the MBAP header",
            msg_length
        )));
    }
    if msg_length > TCP_MAX_ADU_LENGTH {
        return Err(ModbusError::TooMuchData {
            length: msg_length,
            max: TCP_MAX_ADU_LENGTH,
        });
    }

    let mbap_length = (msg_length - MBAP_LENGTH_OFFSET) as u16;
    (&mut msg[4..MBAP_LENGTH_OFFSET]).put_u16(mbap_length);

    Ok(msg_length)
}

/// Check that a confirmation answers the given request
pub fn check_confirmation(req: &[u8], rsp: &[u8]) -> ModbusResult<()> {
    let expected = transaction_id(req)?;
    let received = transaction_id(rsp)?;

    if expected != received {
        return Err(ModbusError::TransactionIdMismatch { expected, received });
    }
    Ok(())
}

fn ensure_length(buf: &[u8], needed: usize, what: &str) -> ModbusResult<()> {
    if buf.len() < needed {
        return Err(ModbusError::InvalidArgument(format!(
            "{} too short: expected at least {} bytes, got {}",
            what,
            needed,
            buf.len()
        )));
    }
    Ok(())
}
