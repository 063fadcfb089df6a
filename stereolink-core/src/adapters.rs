//! Network adapter enumeration, for showing the operator which
//! addresses a headset can dial. Purely diagnostic.

use std::net::IpAddr;

use crate::error::StreamError;

/// One usable local network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAdapter {
    /// Interface name as reported by the OS.
    pub name: String,
    /// IPv4 address of the interface.
    pub ip_address: String,
}

/// Enumerate IPv4, non-loopback interfaces.
pub fn list_adapters() -> Result<Vec<NetworkAdapter>, StreamError> {
    let netifas = local_ip_address::list_afinet_netifas()
        .map_err(|e| StreamError::Adapters(e.to_string()))?;

    Ok(netifas
        .into_iter()
        .filter_map(|(name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(NetworkAdapter {
                name,
                ip_address: v4.to_string(),
            }),
            _ => None,
        })
        .collect())
}
