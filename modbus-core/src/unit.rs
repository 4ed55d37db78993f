//! Unit (slave) identifier

use crate::constants::{MODBUS_BROADCAST_ADDRESS, MODBUS_MAX_UNIT_ID, MODBUS_TCP_SLAVE};
use crate::error::{ModbusError, ModbusResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target device identifier within a Modbus network
///
/// Valid values are `0..=247` (0 being broadcast) and the TCP-only sentinel
/// `0xFF`, which addresses no specific unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "u8")]
pub struct UnitId(u8);

impl UnitId {
    /// Broadcast address
    pub const BROADCAST: UnitId = UnitId(MODBUS_BROADCAST_ADDRESS);

    /// "Unset" sentinel used in TCP mode
    pub const TCP_UNSET: UnitId = UnitId(MODBUS_TCP_SLAVE);

    /// Validate and wrap a unit id
    pub fn new(value: i32) -> ModbusResult<Self> {
        match value {
            v if (0..=MODBUS_MAX_UNIT_ID as i32).contains(&v) => Ok(Self(v as u8)),
            v if v == MODBUS_TCP_SLAVE as i32 => Ok(Self::TCP_UNSET),
            v => Err(ModbusError::InvalidArgument(format!(
                "Unit id {} is outside 0..=247 and is not the TCP sentinel 0xFF",
                v
            ))),
        }
    }

    /// Raw value as written on the wire
    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self == Self::BROADCAST
    }

    pub fn is_unset(self) -> bool {
        self == Self::TCP_UNSET
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::TCP_UNSET
    }
}

impl TryFrom<i32> for UnitId {
    type Error = ModbusError;

    fn try_from(value: i32) -> ModbusResult<Self> {
        Self::new(value)
    }
}

impl From<UnitId> for u8 {
    fn from(unit: UnitId) -> u8 {
        unit.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
