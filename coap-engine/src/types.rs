// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * types.rs - Peer endpoints, URI schemes and other shared value types.
 */

//! Peer endpoints and other small value types shared across the engine.

use std::{
    fmt::{Display, Formatter},
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use crate::{
    error::EndpointParseError,
    protocol::{COAP_DEFAULT_PORT, COAP_DEFAULT_SECURE_PORT},
};

/// Message ID of a CoAP message.
pub type CoapMessageId = u16;

/// URI schemes understood by the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CoapUriScheme {
    Coap,
    Coaps,
}

impl CoapUriScheme {
    pub fn is_secure(self) -> bool {
        self == CoapUriScheme::Coaps
    }

    /// Returns the port that is used if a URI of this scheme does not specify one.
    pub fn default_port(self) -> u16 {
        match self {
            CoapUriScheme::Coap => COAP_DEFAULT_PORT,
            CoapUriScheme::Coaps => COAP_DEFAULT_SECURE_PORT,
        }
    }
}

impl FromStr for CoapUriScheme {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coap" => Ok(CoapUriScheme::Coap),
            "coaps" => Ok(CoapUriScheme::Coaps),
            _ => Err(EndpointParseError::NotACoapScheme(s.to_string())),
        }
    }
}

impl Display for CoapUriScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CoapUriScheme::Coap => "coap",
            CoapUriScheme::Coaps => "coaps",
        })
    }
}

/// A communication peer: network address, UDP port and whether the peer is reached over DTLS.
///
/// Two endpoints are equal if and only if address, port and secure flag are all equal, so the
/// same host/port pair reached once over plaintext and once over DTLS are two distinct peers.
///
/// # Examples
/// ```
/// use coap_engine::types::CoapEndpoint;
///
/// let ep: CoapEndpoint = "coaps://[fd00::1]".parse()?;
/// assert_eq!(ep.port(), 5684);
/// assert!(ep.is_secure());
/// assert_eq!(ep.to_string(), "coaps://[fd00::1]:5684");
///
/// let bare: CoapEndpoint = "::1".parse()?;
/// assert_eq!(bare.port(), 5683);
/// assert!(!bare.is_secure());
/// # Result::<(), coap_engine::error::EndpointParseError>::Ok(())
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CoapEndpoint {
    address: IpAddr,
    port: u16,
    secure: bool,
}

impl CoapEndpoint {
    pub fn new(address: IpAddr, port: u16, secure: bool) -> CoapEndpoint {
        CoapEndpoint { address, port, secure }
    }

    /// Creates an endpoint for the peer at `addr`.
    pub fn from_socket_addr(addr: SocketAddr, secure: bool) -> CoapEndpoint {
        CoapEndpoint::new(addr.ip(), addr.port(), secure)
    }

    /// Parses an endpoint from its textual form.
    ///
    /// Accepted forms are `scheme://[address]:port`, `scheme://[address]` and a bare address.
    /// If the text starts with `coaps:`, the endpoint is secure and defaults to port 5684,
    /// otherwise it is plaintext and defaults to port 5683. The port is read from the decimal
    /// digits directly following `]:` and stops at the first non-digit, so anything after the
    /// port (e.g. a path) is ignored.
    pub fn parse(text: &str) -> Result<CoapEndpoint, EndpointParseError> {
        let scheme = if text.starts_with("coaps:") {
            CoapUriScheme::Coaps
        } else {
            CoapUriScheme::Coap
        };

        if let Some((address, after)) = bracketed_address(text) {
            let port = match after.strip_prefix(':').map(leading_digits) {
                Some(digits) if !digits.is_empty() => parse_port(digits)?,
                _ => scheme.default_port(),
            };
            return Ok(CoapEndpoint::new(address, port, scheme.is_secure()));
        }

        text.parse::<IpAddr>()
            .map(|address| CoapEndpoint::new(address, COAP_DEFAULT_PORT, false))
            .map_err(|_| EndpointParseError::InvalidAddress(text.to_string()))
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns whether this peer is reached over DTLS.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn scheme(&self) -> CoapUriScheme {
        if self.secure {
            CoapUriScheme::Coaps
        } else {
            CoapUriScheme::Coap
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// Finds the first `[...]` pair and parses its contents as an address, returning the address and
/// the text following the closing bracket.
fn bracketed_address(text: &str) -> Option<(IpAddr, &str)> {
    let start = text.find('[')?;
    let end = start + text[start..].find(']')?;
    let address = text[start + 1..end].parse::<IpAddr>().ok()?;
    Some((address, &text[end + 1..]))
}

fn leading_digits(text: &str) -> &str {
    let len = text.bytes().take_while(u8::is_ascii_digit).count();
    &text[..len]
}

fn parse_port(digits: &str) -> Result<u16, EndpointParseError> {
    let value = digits
        .bytes()
        .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add(u64::from(d - b'0')))
        .unwrap_or(u64::MAX);
    u16::try_from(value).map_err(|_| EndpointParseError::PortOutOfRange(value))
}

impl FromStr for CoapEndpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoapEndpoint::parse(s)
    }
}

impl Display for CoapEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://[{}]:{}", self.scheme(), self.address, self.port)
    }
}

#[cfg(feature = "url")]
impl TryFrom<&url::Url> for CoapEndpoint {
    type Error = EndpointParseError;

    fn try_from(value: &url::Url) -> Result<Self, Self::Error> {
        let scheme = CoapUriScheme::from_str(value.scheme())?;
        let address = match value.host() {
            Some(url::Host::Ipv4(addr)) => IpAddr::V4(addr),
            Some(url::Host::Ipv6(addr)) => IpAddr::V6(addr),
            _ => return Err(EndpointParseError::InvalidAddress(value.to_string())),
        };
        Ok(CoapEndpoint::new(
            address,
            value.port().unwrap_or_else(|| scheme.default_port()),
            scheme.is_secure(),
        ))
    }
}

/// Decodes an unsigned integer option value (network byte order, leading zeros stripped).
///
/// Callers must ensure that `val` is at most four bytes long.
pub(crate) fn decode_var_len_u32(val: &[u8]) -> u32 {
    val.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

pub(crate) fn encode_var_len_u32(val: u32) -> Box<[u8]> {
    let bytes_to_discard = val.leading_zeros() / 8;
    let mut ret_val = Vec::from(val.to_be_bytes());
    ret_val.drain(..bytes_to_discard as usize);
    ret_val.into_boxed_slice()
}

/// Decodes an unsigned integer option value of at most two bytes.
pub(crate) fn decode_var_len_u16(val: &[u8]) -> u16 {
    val.iter().fold(0u16, |acc, b| (acc << 8) | u16::from(*b))
}

pub(crate) fn encode_var_len_u16(val: u16) -> Box<[u8]> {
    let bytes_to_discard = val.leading_zeros() / 8;
    let mut ret_val = Vec::from(val.to_be_bytes());
    ret_val.drain(..bytes_to_discard as usize);
    ret_val.into_boxed_slice()
}
