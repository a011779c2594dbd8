// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * protocol.rs - Types and constants specified by the CoAP standard and its extensions.
 */

//! Various types that are specified and defined in the CoAP standard and its extensions.

use std::fmt::{Display, Formatter};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::{MessageCodeError, UnknownOptionError};

pub type ETag = Box<[u8]>;
pub type MaxAge = u32;
pub type UriHost = String;
pub type UriPort = u16;
pub type UriPath = String;
pub type UriQuery = String;
pub type ContentFormat = u16;
pub type Size = u32;
pub type Block = u32;
pub type Observe = u32;

pub type CoapOptionNum = u16;
pub type CoapToken = Box<[u8]>;

/// Default port for plaintext CoAP ([RFC 7252, Section 6.1](https://datatracker.ietf.org/doc/html/rfc7252#section-6.1)).
pub const COAP_DEFAULT_PORT: u16 = 5683;
/// Default port for CoAP over DTLS ([RFC 7252, Section 6.2](https://datatracker.ietf.org/doc/html/rfc7252#section-6.2)).
pub const COAP_DEFAULT_SECURE_PORT: u16 = 5684;

/// Number of wrong-block responses a block-wise request tolerates before giving up.
pub const COAP_MAX_ATTEMPTS: u8 = 4;
/// Default block size used for block-wise transfers and as the response scratch buffer size.
pub const REST_MAX_CHUNK_SIZE: u16 = 64;
/// Default number of concurrently open confirmable transactions.
pub const COAP_MAX_OPEN_TRANSACTIONS: usize = 4;

/// ACK_TIMEOUT transmission parameter ([RFC 7252, Section 4.8](https://datatracker.ietf.org/doc/html/rfc7252#section-4.8)), in milliseconds.
pub const COAP_DEFAULT_ACK_TIMEOUT_MS: u64 = 2000;
/// ACK_RANDOM_FACTOR transmission parameter.
pub const COAP_DEFAULT_ACK_RANDOM_FACTOR: f32 = 1.5;
/// MAX_RETRANSMIT transmission parameter.
pub const COAP_DEFAULT_MAX_RETRANSMIT: u8 = 4;

/// CoAP option types as defined in [RFC 7252, Section 5.10](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10)
/// and later CoAP extensions.
///
/// Only the options the engine interprets are listed here, others are carried as
/// [CoapOption::Other](crate::message::CoapOption::Other).
#[repr(u16)]
#[non_exhaustive]
#[derive(FromPrimitive, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CoapOptionType {
    /// If-Match option ([RFC 7252, Section 5.10.8.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.8.1)).
    IfMatch = 1,
    /// Uri-Host option ([RFC 7252, Section 5.10.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1)).
    UriHost = 3,
    /// ETag option ([RFC 7252, Section 5.10.6](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.6)).
    ETag = 4,
    /// If-None-Match option ([RFC 7252, Section 5.10.8.2](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.8.2)).
    IfNoneMatch = 5,
    /// Observe option ([RFC 7641, Section 2](https://datatracker.ietf.org/doc/html/rfc7641#section-2)).
    Observe = 6,
    /// Uri-Port option ([RFC 7252, Section 5.10.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1)).
    UriPort = 7,
    /// Location-Path option ([RFC 7252, Section 5.10.7](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.7)).
    LocationPath = 8,
    /// Uri-Path option ([RFC 7252, Section 5.10.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1)).
    UriPath = 11,
    /// Content-Format option ([RFC 7252, Section 5.10.3](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.3)).
    ContentFormat = 12,
    /// Max-Age option ([RFC 7252, Section 5.10.5](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.5)).
    MaxAge = 14,
    /// Uri-Query option ([RFC 7252, Section 5.10.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.1)).
    UriQuery = 15,
    /// Accept option ([RFC 7252, Section 5.10.4](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.4)).
    Accept = 17,
    /// Location-Query option ([RFC 7252, Section 5.10.7](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.7)).
    LocationQuery = 20,
    /// Block2 option ([RFC 7959, Section 2.1](https://datatracker.ietf.org/doc/html/rfc7959#section-2.1)).
    Block2 = 23,
    /// Block1 option ([RFC 7959, Section 2.1](https://datatracker.ietf.org/doc/html/rfc7959#section-2.1)).
    Block1 = 27,
    /// Size2 option ([RFC 7959, Section 4](https://datatracker.ietf.org/doc/html/rfc7959#section-4)).
    Size2 = 28,
    /// Size1 option ([RFC 7959, Section 4](https://datatracker.ietf.org/doc/html/rfc7959#section-4)).
    Size1 = 60,
}

impl CoapOptionType {
    /// Returns the option number this type belongs to.
    pub fn to_option_num(self) -> CoapOptionNum {
        self as u16
    }

    /// Returns the maximum size in bytes that a value of this option type should have.
    pub fn max_len(&self) -> usize {
        match self {
            CoapOptionType::IfMatch | CoapOptionType::ETag => 8,
            CoapOptionType::IfNoneMatch => 0,
            CoapOptionType::UriPort | CoapOptionType::ContentFormat | CoapOptionType::Accept => 2,
            CoapOptionType::Observe | CoapOptionType::Block1 | CoapOptionType::Block2 => 3,
            CoapOptionType::MaxAge | CoapOptionType::Size1 | CoapOptionType::Size2 => 4,
            CoapOptionType::UriHost
            | CoapOptionType::LocationPath
            | CoapOptionType::UriPath
            | CoapOptionType::UriQuery
            | CoapOptionType::LocationQuery => 255,
        }
    }

    /// Returns the minimum size in bytes that a value of this option type should have.
    pub fn min_len(&self) -> usize {
        match self {
            CoapOptionType::UriHost | CoapOptionType::ETag => 1,
            _ => 0,
        }
    }

    /// Returns whether this option is critical, i.e. must be understood by the recipient
    /// ([RFC 7252, Section 5.4.1](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.1)).
    pub fn is_critical(num: CoapOptionNum) -> bool {
        num & 0x01 == 1
    }
}

impl TryFrom<CoapOptionNum> for CoapOptionType {
    type Error = UnknownOptionError;

    fn try_from(num: CoapOptionNum) -> Result<Self, Self::Error> {
        <CoapOptionType as FromPrimitive>::from_u16(num).ok_or(UnknownOptionError::Unknown)
    }
}

/// Content formats commonly used by constrained devices.
///
/// To get the corresponding numeric value, use `[value] as u16`.
///
/// See <https://www.iana.org/assignments/core-parameters/core-parameters.xhtml#content-formats> for
/// values that are currently registered with the IANA.
#[repr(u16)]
#[derive(Copy, Clone, FromPrimitive, Eq, PartialEq, Hash, Debug)]
#[non_exhaustive]
pub enum CoapContentFormat {
    TextPlain = 0,
    LinkFormat = 40,
    Xml = 41,
    OctetStream = 42,
    Json = 50,
    Cbor = 60,
    SenMlJson = 110,
    SenMlCbor = 112,
    LwM2mTlv = 11542,
    LwM2mJson = 11543,
}

impl TryFrom<ContentFormat> for CoapContentFormat {
    type Error = UnknownOptionError;

    fn try_from(value: ContentFormat) -> Result<Self, Self::Error> {
        <CoapContentFormat as FromPrimitive>::from_u16(value).ok_or(UnknownOptionError::Unknown)
    }
}

/// Representation of a CoAP message code, which is either empty, a request or a response code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CoapMessageCode {
    Empty,
    Request(CoapRequestCode),
    Response(CoapResponseCode),
}

impl CoapMessageCode {
    /// Returns the raw code byte (`class << 5 | detail`) for this message code.
    pub fn to_raw_code(self) -> u8 {
        match self {
            CoapMessageCode::Empty => 0,
            CoapMessageCode::Request(req) => req as u8,
            CoapMessageCode::Response(rsp) => rsp as u8,
        }
    }
}

impl From<CoapRequestCode> for CoapMessageCode {
    fn from(code: CoapRequestCode) -> Self {
        CoapMessageCode::Request(code)
    }
}

impl From<CoapResponseCode> for CoapMessageCode {
    fn from(code: CoapResponseCode) -> Self {
        CoapMessageCode::Response(code)
    }
}

impl TryFrom<u8> for CoapMessageCode {
    type Error = MessageCodeError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code >> 5 {
            0 if code == 0 => Ok(CoapMessageCode::Empty),
            0 => CoapRequestCode::try_from(code).map(CoapMessageCode::Request),
            2..=5 => CoapResponseCode::try_from(code).map(CoapMessageCode::Response),
            _ => Err(MessageCodeError::Unknown(code)),
        }
    }
}

/// CoAP request codes as defined in [RFC 7252, Section 5.8](https://datatracker.ietf.org/doc/html/rfc7252#section-5.8)
/// and [RFC 8132](https://datatracker.ietf.org/doc/html/rfc8132).
#[repr(u8)]
#[non_exhaustive]
#[derive(Copy, Clone, FromPrimitive, Debug, PartialEq, Eq, Hash)]
pub enum CoapRequestCode {
    Get = 1,
    Post = 2,
    Put = 3,
    Delete = 4,
    Fetch = 5,
    Patch = 6,
    IPatch = 7,
}

impl TryFrom<u8> for CoapRequestCode {
    type Error = MessageCodeError;

    fn try_from(req: u8) -> Result<Self, Self::Error> {
        <CoapRequestCode as FromPrimitive>::from_u8(req).ok_or(MessageCodeError::NotARequestCode)
    }
}

/// Representation of a CoAP response code.
///
/// The discriminant is the raw code byte, i.e. `class << 5 | detail`.
///
/// See <https://www.iana.org/assignments/core-parameters/core-parameters.xhtml#response-codes> for
/// the possible values currently registered with the IANA.
#[repr(u8)]
#[non_exhaustive]
#[derive(Clone, Copy, FromPrimitive, Debug, Eq, PartialEq, Hash)]
pub enum CoapResponseCode {
    Created = 0x41,
    Deleted = 0x42,
    Valid = 0x43,
    Changed = 0x44,
    Content = 0x45,
    Continue = 0x5f,
    BadRequest = 0x80,
    Unauthorized = 0x81,
    BadOption = 0x82,
    Forbidden = 0x83,
    NotFound = 0x84,
    NotAllowed = 0x85,
    NotAcceptable = 0x86,
    Incomplete = 0x88,
    Conflict = 0x89,
    PreconditionFailed = 0x8c,
    RequestTooLarge = 0x8d,
    UnsupportedContentFormat = 0x8f,
    Unprocessable = 0x96,
    TooManyRequests = 0x9d,
    InternalError = 0xa0,
    NotImplemented = 0xa1,
    BadGateway = 0xa2,
    ServiceUnavailable = 0xa3,
    GatewayTimeout = 0xa4,
    ProxyingNotSupported = 0xa5,
    HopLimitReached = 0xa8,
}

impl CoapResponseCode {
    /// Returns the code class (2 for success, 4 for client errors, 5 for server errors).
    pub fn class(self) -> u8 {
        self as u8 >> 5
    }

    /// Returns the code detail.
    pub fn detail(self) -> u8 {
        self as u8 & 0x1f
    }

    /// Returns the reason phrase for this response code.
    pub fn phrase(self) -> &'static str {
        match self {
            CoapResponseCode::Created => "Created",
            CoapResponseCode::Deleted => "Deleted",
            CoapResponseCode::Valid => "Valid",
            CoapResponseCode::Changed => "Changed",
            CoapResponseCode::Content => "Content",
            CoapResponseCode::Continue => "Continue",
            CoapResponseCode::BadRequest => "Bad Request",
            CoapResponseCode::Unauthorized => "Unauthorized",
            CoapResponseCode::BadOption => "Bad Option",
            CoapResponseCode::Forbidden => "Forbidden",
            CoapResponseCode::NotFound => "Not Found",
            CoapResponseCode::NotAllowed => "Method Not Allowed",
            CoapResponseCode::NotAcceptable => "Not Acceptable",
            CoapResponseCode::Incomplete => "Request Entity Incomplete",
            CoapResponseCode::Conflict => "Conflict",
            CoapResponseCode::PreconditionFailed => "Precondition Failed",
            CoapResponseCode::RequestTooLarge => "Request Entity Too Large",
            CoapResponseCode::UnsupportedContentFormat => "Unsupported Content-Format",
            CoapResponseCode::Unprocessable => "Unprocessable Entity",
            CoapResponseCode::TooManyRequests => "Too Many Requests",
            CoapResponseCode::InternalError => "Internal Server Error",
            CoapResponseCode::NotImplemented => "Not Implemented",
            CoapResponseCode::BadGateway => "Bad Gateway",
            CoapResponseCode::ServiceUnavailable => "Service Unavailable",
            CoapResponseCode::GatewayTimeout => "Gateway Timeout",
            CoapResponseCode::ProxyingNotSupported => "Proxying Not Supported",
            CoapResponseCode::HopLimitReached => "Hop Limit Reached",
        }
    }
}

impl Display for CoapResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02} {}", self.class(), self.detail(), self.phrase())
    }
}

impl TryFrom<u8> for CoapResponseCode {
    type Error = MessageCodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        <CoapResponseCode as FromPrimitive>::from_u8(value).ok_or(MessageCodeError::NotAResponseCode)
    }
}

/// CoAP message types as defined in [RFC 7252, Section 3](https://datatracker.ietf.org/doc/html/rfc7252#section-3)
/// and described in [RFC 7252, Section 4.2 and 4.3](https://datatracker.ietf.org/doc/html/rfc7252#section-4.2).
#[repr(u8)]
#[derive(Copy, Clone, Hash, Eq, PartialEq, FromPrimitive, Debug)]
pub enum CoapMessageType {
    /// Confirmable message, i.e. a message whose reception should be confirmed by the peer.
    Con = 0,
    /// Non-confirmable message, i.e. a message whose reception should not be confirmed by the peer.
    Non = 1,
    /// Acknowledgement for a previous message.
    Ack = 2,
    /// Non-acknowledgement for a previous message.
    Rst = 3,
}

impl CoapMessageType {
    /// Decodes the two-bit type field of a CoAP header.
    pub fn from_bits(bits: u8) -> CoapMessageType {
        match bits & 0x03 {
            0 => CoapMessageType::Con,
            1 => CoapMessageType::Non,
            2 => CoapMessageType::Ack,
            _ => CoapMessageType::Rst,
        }
    }
}
