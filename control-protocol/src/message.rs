//! JSON route command, its wire representation, and conversion to/from
//! `switch_core`'s in-memory [`Endpoint`]/[`Route`] types.

use serde::{Deserialize, Serialize};
use switch_core::Endpoint;

use crate::error::FrameError;

/// The exact wire shape from §4.6: `from`/`port` as integers, `ip` as
/// dotted-quad text, `mac` as colon-hex text. Unknown fields are
/// rejected rather than silently ignored, so a caller sending a typo'd
/// field name finds out immediately instead of having it do nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteCommand {
    pub from: i32,
    pub port: i32,
    pub ip: String,
    pub mac: String,
}

impl RouteCommand {
    pub fn close(from: i32) -> Self {
        RouteCommand {
            from,
            port: -1,
            ip: "0.0.0.0".to_string(),
            mac: "00:00:00:00:00:00".to_string(),
        }
    }

    pub fn open(from: i32, dst: Endpoint) -> Self {
        RouteCommand {
            from,
            port: dst.port,
            ip: format_ip(dst.ip),
            mac: format_mac(dst.mac),
        }
    }

    pub fn to_endpoint(&self) -> Result<Endpoint, FrameError> {
        if self.port < 0 {
            return Ok(Endpoint::CLOSED);
        }
        Ok(Endpoint {
            port: self.port,
            ip: parse_ip(&self.ip)?,
            mac: parse_mac(&self.mac)?,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, FrameError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, FrameError> {
        Ok(serde_json::from_slice(body)?)
    }
}

pub fn format_ip(ip: [u8; 4]) -> String {
    format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
}

pub fn format_mac(mac: [u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

pub fn parse_ip(s: &str) -> Result<[u8; 4], FrameError> {
    let mut out = [0u8; 4];
    let mut parts = s.split('.');
    for slot in out.iter_mut() {
        let part = parts.next().ok_or_else(|| FrameError::BadIp(s.to_string()))?;
        *slot = part.parse().map_err(|_| FrameError::BadIp(s.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(FrameError::BadIp(s.to_string()));
    }
    Ok(out)
}

pub fn parse_mac(s: &str) -> Result<[u8; 6], FrameError> {
    let mut out = [0u8; 6];
    let mut parts = s.split(':');
    for slot in out.iter_mut() {
        let part = parts.next().ok_or_else(|| FrameError::BadMac(s.to_string()))?;
        *slot = u8::from_str_radix(part, 16).map_err(|_| FrameError::BadMac(s.to_string()))?;
    }
    if parts.next().is_some() {
        return Err(FrameError::BadMac(s.to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ip_and_mac_text() {
        let ip = [172, 16, 0, 5];
        let mac = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(parse_ip(&format_ip(ip)).unwrap(), ip);
        assert_eq!(parse_mac(&format_mac(mac)).unwrap(), mac);
    }

    #[test]
    fn close_command_has_negative_port() {
        let cmd = RouteCommand::close(50_010);
        assert_eq!(cmd.to_endpoint().unwrap(), Endpoint::CLOSED);
    }

    #[test]
    fn json_round_trip_matches_wire_field_names() {
        let cmd = RouteCommand::open(
            50_010,
            Endpoint {
                port: 6000,
                ip: [10, 0, 0, 1],
                mac: [2, 0, 0, 0, 0, 2],
            },
        );
        let json = cmd.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"from\":50010"));
        assert!(text.contains("\"port\":6000"));
        let back = RouteCommand::from_json(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let body = br#"{"from":1,"port":2,"ip":"1.2.3.4","mac":"00:00:00:00:00:00","extra":1}"#;
        assert!(RouteCommand::from_json(body).is_err());
    }

    #[test]
    fn malformed_ip_is_rejected() {
        assert!(parse_ip("1.2.3").is_err());
        assert!(parse_ip("1.2.3.4.5").is_err());
        assert!(parse_ip("1.2.3.256").is_err());
    }

    #[test]
    fn malformed_mac_is_rejected() {
        assert!(parse_mac("00:00:00:00:00").is_err());
        assert!(parse_mac("zz:00:00:00:00:00").is_err());
    }
}
