//! Transport descriptor trait
//!
//! The protocol engine talks to a transport only through [`Backend`]; the TCP
//! connection is the one implementation in this crate.

use crate::mbap::ServerTransaction;
use async_trait::async_trait;
use modbus_core::{MessageType, ModbusResult};
use std::time::Duration;

/// Operations a transport provides to the protocol engine
#[async_trait]
pub trait Backend: Send {
    /// Bytes preceding the function code
    fn header_length(&self) -> usize;

    /// Bytes trailing the PDU
    fn checksum_length(&self) -> usize;

    fn max_adu_length(&self) -> usize;

    /// Set the unit id put in outgoing headers
    fn set_slave(&mut self, slave: i32) -> ModbusResult<()>;

    /// Write the request basis for `function` into `req`, returns its length
    fn build_request_basis(
        &mut self,
        function: u8,
        addr: u16,
        nb: u16,
        req: &mut [u8],
    ) -> ModbusResult<usize>;

    /// Write the response basis for `sft` into `rsp`, returns its length
    fn build_response_basis(&self, sft: &ServerTransaction, rsp: &mut [u8]) -> ModbusResult<usize>;

    /// Transaction id the response to `req` must carry
    fn prepare_response_tid(&self, req: &[u8]) -> ModbusResult<u16>;

    /// Finalize a complete message before it is sent, returns its length
    fn send_msg_pre(&self, msg: &mut [u8]) -> ModbusResult<usize>;

    /// Write the whole message to the link
    async fn send(&mut self, msg: &[u8]) -> ModbusResult<usize>;

    /// Receive one indication into `req`
    async fn receive(&mut self, req: &mut [u8]) -> ModbusResult<usize> {
        self.receive_msg(req, MessageType::Indication).await
    }

    /// Reassemble one message of `msg_type` into `msg`, returns its length
    async fn receive_msg(&mut self, msg: &mut [u8], msg_type: MessageType) -> ModbusResult<usize>;

    /// Single read from the link
    async fn recv(&mut self, buf: &mut [u8]) -> ModbusResult<usize>;

    /// Validate a reassembled message, returns its length
    fn check_integrity(&self, msg: &[u8], msg_length: usize) -> ModbusResult<usize>;

    /// Transport level check of a confirmation against its request
    fn pre_check_confirmation(&self, req: &[u8], rsp: &[u8]) -> ModbusResult<()>;

    async fn connect(&mut self) -> ModbusResult<()>;

    /// Release the link; calling it again has no effect
    fn close(&mut self);

    /// Discard pending inbound bytes, returns how many were dropped
    async fn flush(&mut self) -> ModbusResult<usize>;

    /// Wait until the link is readable or `timeout` expires
    async fn select(&mut self, timeout: Option<Duration>) -> ModbusResult<()>;

    /// Finalize and send a complete message
    async fn send_message(&mut self, msg: &mut [u8]) -> ModbusResult<usize> {
        let length = self.send_msg_pre(msg)?;
        self.send(&msg[..length]).await
    }

    /// Receive the confirmation to `req` into `rsp` and check it belongs to it
    async fn receive_confirmation(&mut self, req: &[u8], rsp: &mut [u8]) -> ModbusResult<usize> {
        let length = self.receive_msg(rsp, MessageType::Confirmation).await?;
        self.pre_check_confirmation(req, &rsp[..length])?;
        Ok(length)
    }
}
