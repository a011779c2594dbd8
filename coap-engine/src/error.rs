// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * error.rs - CoAP error types.
 */

//! Error types

use std::{string::FromUtf8Error, sync::PoisonError};

use thiserror::Error;

use crate::protocol::{CoapMessageType, CoapOptionType};

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum EndpointParseError {
    /// Neither a bracketed address nor a bare address could be found in the input.
    #[error("CoAP endpoint parse error: no valid address in {:?}", .0)]
    InvalidAddress(String),
    /// An explicit port was given, but it does not fit into 16 bits.
    #[error("CoAP endpoint parse error: port {} out of range", .0)]
    PortOutOfRange(u64),
    /// URI does not have a valid scheme (coap or coaps).
    #[error("CoAP endpoint parse error: URI scheme {} is not a valid CoAP scheme", .0)]
    NotACoapScheme(String),
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContextCreationError {
    /// The configuration supplied to the context was rejected.
    #[error("CoAP context creation error: invalid configuration")]
    InvalidConfiguration(#[from] ContextConfigurationError),
    /// A listening socket could not be created.
    #[error("CoAP context creation error: unable to bind {:?} socket", .0)]
    Bind(std::io::ErrorKind),
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContextConfigurationError {
    /// Block size is not a power of two between 16 and 1024 bytes.
    #[error("CoAP context configuration error: invalid block size {}", .0)]
    InvalidBlockSize(u16),
    /// A numeric limit was set to zero.
    #[error("CoAP context configuration error: {} must not be zero", .0)]
    ZeroLimit(&'static str),
    /// The ACK random factor is smaller than 1.0 or not finite.
    #[error("CoAP context configuration error: ACK random factor must be finite and at least 1.0")]
    InvalidRandomFactor,
    /// ACK timeout, random factor and retransmission count give an unreasonably long exchange.
    #[error("CoAP context configuration error: maximum transmit wait out of range")]
    TransmitWaitOutOfRange,
    #[error(
        "CoAP context configuration error: attempted to set encryption context while one has already been configured"
    )]
    CryptoContextAlreadySet,
    /// A secure endpoint was requested, but no secure socket was configured.
    #[error("CoAP context configuration error: no secure socket configured")]
    NoSecureSocket,
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ResourceRegistrationError {
    /// Resource path is empty or ends with a slash.
    #[error("CoAP resource registration error: invalid resource path")]
    InvalidPath,
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransportError {
    /// Endpoint is secure, but the router has no DTLS context.
    #[error("CoAP transport error: no DTLS context available for secure endpoint")]
    NoSecureContext,
    /// The DTLS backend reported a failure.
    #[error("CoAP transport error: DTLS failure ({:?})", .0)]
    Dtls(DtlsAlert),
}

/// Fatal alerts a DTLS backend may raise during credential lookup or record processing.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DtlsAlert {
    InternalError,
    IllegalParameter,
    HandshakeFailure,
    DecryptError,
}

#[derive(Error, Debug)]
pub enum IoProcessError {
    /// Polling the sockets failed.
    #[error("CoAP IO error: polling failed")]
    Poll(#[from] std::io::Error),
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransactionError {
    /// The transaction handle does not (or no longer) refer to an open transaction.
    #[error("CoAP transaction error: unknown transaction handle")]
    UnknownHandle,
    /// The packet exceeds the maximum message size.
    #[error("CoAP transaction error: packet too large ({} bytes)", .0)]
    PacketTooLarge(usize),
}

#[derive(Error, Debug)]
pub enum RngError {
    /// RNG mutex is poisoned (panic in another thread while calling RNG function).
    #[error("CoAP RNG error: global RNG mutex is poisoned")]
    GlobalMutexPoisonError,
    /// The configured RNG failed to produce bytes.
    #[error("CoAP RNG error: RNG failed to produce bytes")]
    Generator(#[from] rand::Error),
}

impl<T> From<PoisonError<T>> for RngError {
    fn from(_value: PoisonError<T>) -> Self {
        RngError::GlobalMutexPoisonError
    }
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum UnknownOptionError {
    #[error("CoAP option conversion error: unknown option")]
    Unknown,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum OptionValueError {
    /// Provided value for option is too short.
    #[error("CoAP option has invalid value: too short")]
    TooShort,
    /// Provided value for option is too long.
    #[error("CoAP option has invalid value: too long")]
    TooLong,
    /// A string value could not be converted to UTF-8.
    #[error("CoAP option has invalid value: invalid string")]
    StringConversion(#[from] FromUtf8Error),
    /// Option has an illegal value.
    #[error("CoAP option has invalid value")]
    IllegalValue,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum MessageConversionError {
    /// Datagram ended before the header, token or an option was complete.
    #[error("CoAP message conversion error: message truncated")]
    Truncated,
    /// Version field of the header is not 1.
    #[error("CoAP message conversion error: unsupported version {}", .0)]
    UnsupportedVersion(u8),
    /// Token length nibble is larger than 8.
    #[error("CoAP message conversion error: invalid token length {}", .0)]
    InvalidTokenLength(u8),
    /// Option delta or length used the reserved nibble value 15.
    #[error("CoAP message conversion error: reserved option nibble")]
    ReservedOptionNibble,
    /// A payload marker was present, but no payload followed it.
    #[error("CoAP message conversion error: payload marker without payload")]
    EmptyPayload,
    /// Value of an option is invalid.
    #[error("CoAP message conversion error: invalid option value for {:?}", .0)]
    InvalidOptionValue(Option<CoapOptionType>, #[source] OptionValueError),
    /// Message has an option that is specific for another message type (i.e., request option in
    /// response message).
    #[error("CoAP message conversion error: option of type {:?} invalid for message type", .0)]
    InvalidOptionForMessageType(CoapOptionType),
    /// Non-repeatable option was repeated.
    #[error("CoAP message conversion error: non-repeatable option of type {:?} repeated", .0)]
    NonRepeatableOptionRepeated(CoapOptionType),
    /// Invalid message code.
    #[error("CoAP message conversion error: invalid message code")]
    InvalidMessageCode(#[from] MessageCodeError),
    /// A message with code 0.00 (Empty) contains data.
    #[error("CoAP message conversion error: empty message contains data")]
    DataInEmptyMessage,
    /// Message has no ID.
    #[error("CoAP message conversion error: message id missing")]
    MissingMessageId,
    /// Message type does not fit the message code.
    #[error("CoAP message conversion error: invalid message type")]
    InvalidMessageType(#[from] MessageTypeError),
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageCodeError {
    /// Provided message code for request was not a request code.
    #[error("CoAP message code conversion error: not a request code")]
    NotARequestCode,
    /// Provided message code for response was not a response code.
    #[error("CoAP message code conversion error: not a response code")]
    NotAResponseCode,
    /// Raw code is neither empty, a request nor a response.
    #[error("CoAP message code conversion error: unknown code {}.{:02}", .0 >> 5, .0 & 0x1f)]
    Unknown(u8),
}

#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum MessageTypeError {
    /// Message type cannot be used for this message code (e.g., ACK for request).
    #[error("message type {:?} cannot be used for this message code", .0)]
    InvalidForMessageCode(CoapMessageType),
}
