//! Remote endpoint of a TCP connection

use modbus_core::constants::{
    MODBUS_TCP_DEFAULT_PORT, MODBUS_TCP_DEFAULT_SERVICE, TCP_IP_MAX_LENGTH,
    TCP_PI_NODE_MAX_LENGTH, TCP_PI_SERVICE_MAX_LENGTH,
};
use modbus_core::{ModbusError, ModbusResult};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

/// Where a connection goes (client) or what it binds (server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpTarget {
    /// Numeric IPv4 address and port
    Ipv4 { ip: Ipv4Addr, port: u16 },
    /// Host name and service, resolved for any address family
    Named { node: String, service: String },
}

impl TcpTarget {
    /// IPv4 target from a dotted-quad literal
    pub fn ipv4(ip: &str, port: u16) -> ModbusResult<Self> {
        check_string("IP", ip, TCP_IP_MAX_LENGTH)?;
        let ip = ip.parse::<Ipv4Addr>().map_err(|e| {
            ModbusError::InvalidArgument(format!("Invalid IPv4 address '{}': {}", ip, e))
        })?;
        Ok(TcpTarget::Ipv4 { ip, port })
    }

    /// Name/service target; an empty service means the Modbus port
    pub fn named(node: &str, service: &str) -> ModbusResult<Self> {
        check_string("node", node, TCP_PI_NODE_MAX_LENGTH)?;
        let service = if service.is_empty() {
            MODBUS_TCP_DEFAULT_SERVICE
        } else {
            check_string("service", service, TCP_PI_SERVICE_MAX_LENGTH)?;
            service
        };
        Ok(TcpTarget::Named {
            node: node.to_string(),
            service: service.to_string(),
        })
    }

    /// Candidate socket addresses, in resolver order
    pub async fn resolve(&self) -> ModbusResult<Vec<SocketAddr>> {
        match self {
            TcpTarget::Ipv4 { ip, port } => Ok(vec![SocketAddr::from((*ip, *port))]),
            TcpTarget::Named { node, service } => {
                let port = service_port(service)?;
                let candidates: Vec<SocketAddr> = tokio::net::lookup_host((node.as_str(), port))
                    .await
                    .map_err(|e| {
                        ModbusError::Resolution(format!("[{}]:{}: {}", node, service, e))
                    })?
                    .collect();

                if candidates.is_empty() {
                    return Err(ModbusError::Resolution(format!(
                        "[{}]:{}: no addresses",
                        node, service
                    )));
                }
                Ok(candidates)
            }
        }
    }

    /// Addresses to bind when listening
    ///
    /// The IPv4 target listens on every interface at its port.
    pub async fn listen_addresses(&self) -> ModbusResult<Vec<SocketAddr>> {
        match self {
            TcpTarget::Ipv4 { port, .. } => Ok(vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, *port))]),
            TcpTarget::Named { .. } => self.resolve().await,
        }
    }
}

impl fmt::Display for TcpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcpTarget::Ipv4 { ip, port } => write!(f, "{}:{}", ip, port),
            TcpTarget::Named { node, service } => write!(f, "[{}]:{}", node, service),
        }
    }
}

/// Port number for a service string
///
/// Numeric services are used as is; `modbus` and `mbap` name the registered port.
pub fn service_port(service: &str) -> ModbusResult<u16> {
    match service {
        "" | "modbus" | "mbap" => Ok(MODBUS_TCP_DEFAULT_PORT),
        s => s
            .parse::<u16>()
            .map_err(|_| ModbusError::Resolution(format!("Unknown service '{}'", s))),
    }
}

fn check_string(what: &str, value: &str, max: usize) -> ModbusResult<()> {
    if value.is_empty() {
        return Err(ModbusError::InvalidArgument(format!("The {} string is empty", what)));
    }
    if value.len() > max {
        return Err(ModbusError::InvalidArgument(format!(
            "The {} string is longer than {} bytes",
            what, max
        )));
    }
    Ok(())
}
