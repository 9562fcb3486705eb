//! Editing surface over parsed SDP sessions.
//!
//! The call controller typically rewrites connection/origin addresses
//! (pointing media at a relay) and media ports inside an
//! [`crate::body::MsgBody`] before it travels on; these helpers cover
//! that surface so callers do not assemble sdp-rs line types by hand.

use sdp_rs::lines;
use sdp_rs::SessionDescription;
use std::net::IpAddr;

fn addrtype_of(addr: IpAddr) -> lines::common::Addrtype {
    match addr {
        IpAddr::V4(_) => lines::common::Addrtype::Ip4,
        IpAddr::V6(_) => lines::common::Addrtype::Ip6,
    }
}

/// Session-level connection address, if present.
pub fn connection_address(sdp: &SessionDescription) -> Option<IpAddr> {
    sdp.connection.as_ref().map(|c| c.connection_address.base)
}

/// Rewrite the connection address at session level and in every media
/// section that carries its own `c=` line.
pub fn set_connection_address(sdp: &mut SessionDescription, addr: IpAddr) {
    let addrtype = addrtype_of(addr);
    match sdp.connection.as_mut() {
        Some(c) => {
            c.addrtype = addrtype;
            c.connection_address.base = addr;
        }
        None => {
            sdp.connection = Some(lines::Connection {
                nettype: lines::common::Nettype::In,
                addrtype: addrtype_of(addr),
                connection_address: lines::connection::ConnectionAddress {
                    base: addr,
                    ttl: None,
                    numaddr: None,
                },
            });
        }
    }
    for media in sdp.media_descriptions.iter_mut() {
        for c in media.connections.iter_mut() {
            c.addrtype = addrtype_of(addr);
            c.connection_address.base = addr;
        }
    }
}

/// Rewrite the origin (`o=`) unicast address.
pub fn set_origin_address(sdp: &mut SessionDescription, addr: IpAddr) {
    sdp.origin.addrtype = addrtype_of(addr);
    sdp.origin.unicast_address = addr;
}

pub fn media_port(sdp: &SessionDescription, index: usize) -> Option<u16> {
    sdp.media_descriptions.get(index).map(|m| m.media.port)
}

/// Set the port of the media section at `index`; false if out of range.
pub fn set_media_port(sdp: &mut SessionDescription, index: usize, port: u16) -> bool {
    match sdp.media_descriptions.get_mut(index) {
        Some(m) => {
            m.media.port = port;
            true
        }
        None => false,
    }
}

/// Payload formats of the media section at `index`.
pub fn media_formats(sdp: &SessionDescription, index: usize) -> Vec<String> {
    sdp.media_descriptions
        .get(index)
        .map(|m| m.media.fmt.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

pub fn has_format(sdp: &SessionDescription, index: usize, format: &str) -> bool {
    media_formats(sdp, index).iter().any(|f| f == format)
}
