//! Step-wise reassembly of one ADU from a byte stream
//!
//! The framer never reads by itself; the connection asks it which part of the
//! buffer to fill next, performs the read, and reports how many bytes arrived.

use modbus_core::constants::{TCP_CHECKSUM_LENGTH, TCP_HEADER_LENGTH, TCP_MAX_ADU_LENGTH};
use modbus_core::function::{data_length_after_meta, meta_length_after_function};
use modbus_core::{MessageType, ModbusError, ModbusResult};
use std::ops::Range;

/// Framing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Reading the transport header and the function code
    Function,
    /// Reading the fixed metadata that follows the function code
    Meta,
    /// Reading the variable data announced by the metadata
    Data,
}

/// Reassembly state of a single message
#[derive(Debug, Clone)]
pub struct Framer {
    msg_type: MessageType,
    header_length: usize,
    checksum_length: usize,
    max_adu_length: usize,
    step: Step,
    received: usize,
    remaining: usize,
}

impl Framer {
    pub fn new(
        msg_type: MessageType,
        header_length: usize,
        checksum_length: usize,
        max_adu_length: usize,
    ) -> Self {
        Self {
            msg_type,
            header_length,
            checksum_length,
            max_adu_length,
            step: Step::Function,
            received: 0,
            remaining: header_length + 1,
        }
    }

    /// Framer for MBAP messages
    pub fn tcp(msg_type: MessageType) -> Self {
        Self::new(msg_type, TCP_HEADER_LENGTH, TCP_CHECKSUM_LENGTH, TCP_MAX_ADU_LENGTH)
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Bytes consumed so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Bytes still required by the current step
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    /// Part of the message buffer the next read must fill
    pub fn pending(&self) -> Range<usize> {
        self.received..self.received + self.remaining
    }

    /// Account for `n` bytes just read into `msg` at [`Framer::pending`]
    ///
    /// Fails with `TooMuchData` as soon as the announced data would take the
    /// message past the maximum ADU length.
    pub fn consume(&mut self, msg: &[u8], n: usize) -> ModbusResult<()> {
        debug_assert!(n <= self.remaining);
        let n = n.min(self.remaining);

        self.received += n;
        self.remaining -= n;

        if self.remaining > 0 {
            return Ok(());
        }

        if self.step == Step::Function {
            self.remaining = meta_length_after_function(msg[self.header_length], self.msg_type);
            if self.remaining != 0 {
                self.step = Step::Meta;
                return Ok(());
            }
        }

        if self.step != Step::Data {
            let length = data_length_after_meta(msg, self.header_length, self.msg_type)?
                + self.checksum_length;
            if self.received + length > self.max_adu_length {
                return Err(ModbusError::TooMuchData {
                    length: self.received + length,
                    max: self.max_adu_length,
                });
            }
            self.remaining = length;
            self.step = Step::Data;
        }

        Ok(())
    }
}

/// Render bytes the way debug output shows them: `<01><03><02>`
pub(crate) fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("<{:02X}>", b)).collect()
}
