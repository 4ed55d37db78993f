//! MBAP wire constants

/// MBAP header length: transaction id (2), protocol id (2), length (2), unit id (1)
pub const TCP_HEADER_LENGTH: usize = 7;

/// TCP frames carry no checksum trailer
pub const TCP_CHECKSUM_LENGTH: usize = 0;

/// Maximum ADU length on TCP: 7 bytes of MBAP header plus a 253 byte PDU
pub const TCP_MAX_ADU_LENGTH: usize = 260;

/// Length of a request basis: MBAP header, function code, start address, quantity
pub const TCP_PRESET_REQ_LENGTH: usize = 12;

/// Length of a response basis: MBAP header and function code
pub const TCP_PRESET_RSP_LENGTH: usize = 8;

/// Bytes preceding the MBAP length field's coverage (transaction, protocol, length)
pub const MBAP_LENGTH_OFFSET: usize = 6;

/// Protocol identifier for Modbus
pub const MODBUS_PROTOCOL_ID: u16 = 0;

/// Registered Modbus TCP port
pub const MODBUS_TCP_DEFAULT_PORT: u16 = 502;

/// Service string used when none is given
pub const MODBUS_TCP_DEFAULT_SERVICE: &str = "502";

/// Broadcast unit id
pub const MODBUS_BROADCAST_ADDRESS: u8 = 0;

/// Highest addressable unit id
pub const MODBUS_MAX_UNIT_ID: u8 = 247;

/// "No specific unit" sentinel, only meaningful in TCP mode
pub const MODBUS_TCP_SLAVE: u8 = 0xFF;

/// Longest accepted IPv4 literal ("255.255.255.255")
pub const TCP_IP_MAX_LENGTH: usize = 15;

/// Longest accepted node name
pub const TCP_PI_NODE_MAX_LENGTH: usize = 1024;

/// Longest accepted service name
pub const TCP_PI_SERVICE_MAX_LENGTH: usize = 31;

/// IP type-of-service value requesting low delay
pub const IPTOS_LOWDELAY: u32 = 0x10;
