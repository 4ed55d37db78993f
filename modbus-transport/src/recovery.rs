//! Error and timeout recovery
//!
//! With [`ErrorRecovery::Link`] a failed wait or read repairs the link before the
//! error is handed back. The in-flight operation is never retried and the caller
//! always sees the original error.

use crate::settings::ErrorRecovery;
use async_trait::async_trait;
use modbus_core::ModbusError;
use modbus_core::ModbusResult;
use std::time::Duration;

/// Link operations the recovery policy relies on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkRepair: Send {
    fn error_recovery(&self) -> ErrorRecovery;

    fn response_timeout(&self) -> Option<Duration>;

    async fn flush_link(&mut self) -> ModbusResult<usize>;

    fn close_link(&mut self);

    async fn reconnect_link(&mut self) -> ModbusResult<()>;
}

/// Apply the policy to a failed readiness wait and return the error to report
pub async fn after_wait_failure<L>(link: &mut L, error: ModbusError) -> ModbusError
where
    L: LinkRepair + ?Sized,
{
    log::error!("select: {}", error);

    if link.error_recovery() != ErrorRecovery::Link {
        return error;
    }

    match error {
        ModbusError::Timeout => {
            if let Some(pause) = link.response_timeout() {
                tokio::time::sleep(pause).await;
            }
            match link.flush_link().await {
                Ok(n) => log::warn!("Flushed {} bytes after timeout", n),
                Err(e) => log::warn!("Flush after timeout failed: {}", e),
            }
        }
        ModbusError::BadDescriptor => repair(link).await,
        _ => {}
    }

    error
}

/// Apply the policy to a failed read and return the error to report
pub async fn after_read_failure<L>(link: &mut L, error: ModbusError) -> ModbusError
where
    L: LinkRepair + ?Sized,
{
    log::error!("read: {}", error);

    if link.error_recovery() == ErrorRecovery::Link && error.is_link_failure() {
        repair(link).await;
    }

    error
}

async fn repair<L>(link: &mut L)
where
    L: LinkRepair + ?Sized,
{
    log::warn!("Reconnecting after link failure");
    link.close_link();
    if let Err(e) = link.reconnect_link().await {
        log::warn!("Reconnect failed: {}", e);
    }
}
