// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * message/mod.rs - Types related to CoAP messages and their wire format.
 */

//! CoAP message representation and the [RFC 7252, Section 3](https://datatracker.ietf.org/doc/html/rfc7252#section-3)
//! wire format.
//!
//! [CoapMessage] is the untyped message (header, token, options, payload), [CoapRequest] and
//! [CoapResponse] wrap it and give typed access to the options relevant for requests and
//! responses respectively.

use std::slice::Iter;

use log::trace;

pub use block::{BlockCursor, CoapBlockOption};
pub use request::CoapRequest;
pub use response::CoapResponse;

use crate::{
    error::{MessageConversionError, OptionValueError},
    protocol::{
        Block, CoapMessageCode, CoapMessageType, CoapOptionNum, CoapOptionType, ContentFormat, ETag, MaxAge,
        Observe, Size, UriHost, UriPath, UriPort, UriQuery,
    },
    types::{decode_var_len_u16, decode_var_len_u32, encode_var_len_u16, encode_var_len_u32, CoapMessageId},
};

pub mod block;
mod request;
mod response;

const COAP_VERSION: u8 = 1;
const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_TOKEN_LENGTH: usize = 8;

/// Representation of a CoAP option including its value.
///
/// For an enum describing the option types known to the engine (and their associated option
/// numbers), see [CoapOptionType], for the data type representing option numbers, see
/// [CoapOptionNum].
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum CoapOption {
    IfMatch(ETag),
    IfNoneMatch,
    UriHost(UriHost),
    UriPort(UriPort),
    UriPath(UriPath),
    UriQuery(UriQuery),
    LocationPath(UriPath),
    LocationQuery(UriQuery),
    ContentFormat(ContentFormat),
    Accept(ContentFormat),
    Size1(Size),
    Size2(Size),
    Block1(Block),
    Block2(Block),
    ETag(ETag),
    MaxAge(MaxAge),
    Observe(Observe),
    Other(CoapOptionNum, Box<[u8]>),
}

impl CoapOption {
    /// Creates a CoAP option from its number and raw value bytes.
    pub fn from_value(number: CoapOptionNum, value: &[u8]) -> Result<CoapOption, OptionValueError> {
        let opt_type = match CoapOptionType::try_from(number) {
            Ok(opt_type) => opt_type,
            Err(_) => return Ok(CoapOption::Other(number, value.into())),
        };
        if opt_type.min_len() > value.len() {
            return Err(OptionValueError::TooShort);
        } else if opt_type.max_len() < value.len() {
            return Err(OptionValueError::TooLong);
        }
        let string = || String::from_utf8(value.to_vec());
        Ok(match opt_type {
            CoapOptionType::IfMatch => CoapOption::IfMatch(value.into()),
            CoapOptionType::UriHost => CoapOption::UriHost(string()?),
            CoapOptionType::ETag => CoapOption::ETag(value.into()),
            CoapOptionType::IfNoneMatch => CoapOption::IfNoneMatch,
            CoapOptionType::Observe => CoapOption::Observe(decode_var_len_u32(value)),
            CoapOptionType::UriPort => CoapOption::UriPort(decode_var_len_u16(value)),
            CoapOptionType::LocationPath => CoapOption::LocationPath(string()?),
            CoapOptionType::UriPath => CoapOption::UriPath(string()?),
            CoapOptionType::ContentFormat => CoapOption::ContentFormat(decode_var_len_u16(value)),
            CoapOptionType::MaxAge => CoapOption::MaxAge(decode_var_len_u32(value)),
            CoapOptionType::UriQuery => CoapOption::UriQuery(string()?),
            CoapOptionType::Accept => CoapOption::Accept(decode_var_len_u16(value)),
            CoapOptionType::LocationQuery => CoapOption::LocationQuery(string()?),
            CoapOptionType::Block2 => CoapOption::Block2(decode_var_len_u32(value)),
            CoapOptionType::Block1 => CoapOption::Block1(decode_var_len_u32(value)),
            CoapOptionType::Size2 => CoapOption::Size2(decode_var_len_u32(value)),
            CoapOptionType::Size1 => CoapOption::Size1(decode_var_len_u32(value)),
        })
    }

    /// Returns the option number associated with this option.
    pub fn number(&self) -> CoapOptionNum {
        match self {
            CoapOption::IfMatch(_) => CoapOptionType::IfMatch as u16,
            CoapOption::IfNoneMatch => CoapOptionType::IfNoneMatch as u16,
            CoapOption::UriHost(_) => CoapOptionType::UriHost as u16,
            CoapOption::UriPort(_) => CoapOptionType::UriPort as u16,
            CoapOption::UriPath(_) => CoapOptionType::UriPath as u16,
            CoapOption::UriQuery(_) => CoapOptionType::UriQuery as u16,
            CoapOption::LocationPath(_) => CoapOptionType::LocationPath as u16,
            CoapOption::LocationQuery(_) => CoapOptionType::LocationQuery as u16,
            CoapOption::ContentFormat(_) => CoapOptionType::ContentFormat as u16,
            CoapOption::Accept(_) => CoapOptionType::Accept as u16,
            CoapOption::Size1(_) => CoapOptionType::Size1 as u16,
            CoapOption::Size2(_) => CoapOptionType::Size2 as u16,
            CoapOption::Block1(_) => CoapOptionType::Block1 as u16,
            CoapOption::Block2(_) => CoapOptionType::Block2 as u16,
            CoapOption::ETag(_) => CoapOptionType::ETag as u16,
            CoapOption::MaxAge(_) => CoapOptionType::MaxAge as u16,
            CoapOption::Observe(_) => CoapOptionType::Observe as u16,
            CoapOption::Other(num, _) => *num,
        }
    }

    /// Returns the value bytes of this option as they appear on the wire.
    pub fn value_bytes(&self) -> Result<Box<[u8]>, OptionValueError> {
        let bytes: Box<[u8]> = match self {
            CoapOption::IfMatch(tag) | CoapOption::ETag(tag) => tag.clone(),
            CoapOption::IfNoneMatch => Box::new([]),
            CoapOption::UriHost(value)
            | CoapOption::UriPath(value)
            | CoapOption::UriQuery(value)
            | CoapOption::LocationPath(value)
            | CoapOption::LocationQuery(value) => value.as_bytes().into(),
            CoapOption::UriPort(value) | CoapOption::ContentFormat(value) | CoapOption::Accept(value) => {
                encode_var_len_u16(*value)
            },
            CoapOption::Size1(value)
            | CoapOption::Size2(value)
            | CoapOption::Block1(value)
            | CoapOption::Block2(value)
            | CoapOption::MaxAge(value)
            | CoapOption::Observe(value) => encode_var_len_u32(*value),
            CoapOption::Other(_num, data) => data.clone(),
        };
        if let Ok(opt_type) = CoapOptionType::try_from(self.number()) {
            if bytes.len() < opt_type.min_len() {
                return Err(OptionValueError::TooShort);
            } else if bytes.len() > opt_type.max_len() {
                return Err(OptionValueError::TooLong);
            }
        }
        Ok(bytes)
    }
}

/// Interface for CoAP messages common between requests, responses and other messages.
pub trait CoapMessageCommon {
    /// Add the supplied CoAP option to this message.
    fn add_option(&mut self, option: CoapOption) {
        self.as_message_mut().options.push(option);
    }

    /// Clear the list of options that were added to this message using [add_option()](CoapMessageCommon::add_option()).
    fn clear_options(&mut self) {
        self.as_message_mut().options.clear();
    }

    /// Returns an iterator over the untyped options contained in this message.
    fn options_iter(&self) -> Iter<CoapOption> {
        self.as_message().options.iter()
    }

    /// Returns the CoAP message type (confirmable, non-confirmable, acknowledgement, rst) of this message.
    fn type_(&self) -> CoapMessageType {
        self.as_message().type_
    }

    /// Sets the CoAP message type (confirmable, non-confirmable, acknowledgement, rst) of this message.
    fn set_type_(&mut self, type_: CoapMessageType) {
        self.as_message_mut().type_ = type_;
    }

    /// Returns the message code of this message.
    fn code(&self) -> CoapMessageCode {
        self.as_message().code
    }

    /// Returns the CoAP message ID for this message.
    fn mid(&self) -> Option<CoapMessageId> {
        self.as_message().mid
    }

    /// Sets the CoAP message ID for this message.
    fn set_mid(&mut self, mid: Option<CoapMessageId>) {
        self.as_message_mut().mid = mid;
    }

    /// Returns a reference to the data/body of this message.
    fn data(&self) -> Option<&[u8]> {
        self.as_message().data.as_ref().map(|v| v.as_ref())
    }

    /// Sets the data/body of this message.
    fn set_data<D: Into<Box<[u8]>>>(&mut self, data: Option<D>) {
        self.as_message_mut().data = data.map(Into::into);
    }

    /// Returns the message token.
    fn token(&self) -> Option<&[u8]> {
        self.as_message().token.as_ref().map(|v| v.as_ref())
    }

    /// Sets the message token.
    ///
    /// Note that [CoapContext::send_request()](crate::CoapContext::send_request()) will
    /// automatically set the token to a random value if you don't.
    fn set_token<D: Into<Box<[u8]>>>(&mut self, token: Option<D>) {
        self.as_message_mut().token = token.map(Into::into);
    }

    /// Returns a reference to this message.
    fn as_message(&self) -> &CoapMessage;
    /// Returns a mutable reference to this message.
    fn as_message_mut(&mut self) -> &mut CoapMessage;
}

/// Representation of a CoAP message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoapMessage {
    /// CoAP message type (CON, NON, ACK, RST).
    type_: CoapMessageType,
    /// CoAP message code (e.g. 2.05 Content or 4.04 Not Found)
    code: CoapMessageCode,
    /// ID of this message, used for deduplication and ACK matching.
    mid: Option<CoapMessageId>,
    /// List of CoAP options associated with this message.
    options: Vec<CoapOption>,
    /// CoAP message token, used for request-response-matching.
    token: Option<Box<[u8]>>,
    /// Message body of this message.
    data: Option<Box<[u8]>>,
}

impl CoapMessage {
    /// Creates a new CoAP message with the given type and code.
    pub fn new(type_: CoapMessageType, code: CoapMessageCode) -> CoapMessage {
        CoapMessage {
            type_,
            code,
            mid: None,
            options: Vec::new(),
            token: None,
            data: None,
        }
    }

    /// Creates an empty message (code 0.00), e.g. an ACK for a separate response or an RST.
    pub fn new_empty(type_: CoapMessageType, mid: CoapMessageId) -> CoapMessage {
        let mut message = CoapMessage::new(type_, CoapMessageCode::Empty);
        message.mid = Some(mid);
        message
    }

    pub(crate) fn set_code(&mut self, code: CoapMessageCode) {
        self.code = code;
    }

    /// Parses a datagram into a CoapMessage.
    pub fn decode(bytes: &[u8]) -> Result<CoapMessage, MessageConversionError> {
        if bytes.len() < 4 {
            return Err(MessageConversionError::Truncated);
        }
        let version = bytes[0] >> 6;
        if version != COAP_VERSION {
            return Err(MessageConversionError::UnsupportedVersion(version));
        }
        let type_ = CoapMessageType::from_bits(bytes[0] >> 4);
        let token_len = bytes[0] & 0x0f;
        if usize::from(token_len) > MAX_TOKEN_LENGTH {
            return Err(MessageConversionError::InvalidTokenLength(token_len));
        }
        let code = CoapMessageCode::try_from(bytes[1])?;
        let mid = u16::from_be_bytes([bytes[2], bytes[3]]);

        let mut pos = 4 + usize::from(token_len);
        let token = bytes.get(4..pos).ok_or(MessageConversionError::Truncated)?;

        let mut options = Vec::new();
        let mut data = None;
        let mut number: u32 = 0;
        while pos < bytes.len() {
            let header = bytes[pos];
            pos += 1;
            if header == PAYLOAD_MARKER {
                if pos == bytes.len() {
                    return Err(MessageConversionError::EmptyPayload);
                }
                data = Some(Box::from(&bytes[pos..]));
                break;
            }
            let delta = read_option_nibble(header >> 4, bytes, &mut pos)?;
            let len = read_option_nibble(header & 0x0f, bytes, &mut pos)? as usize;
            number += delta;
            let num = CoapOptionNum::try_from(number).map_err(|_| MessageConversionError::Truncated)?;
            let value = bytes.get(pos..pos + len).ok_or(MessageConversionError::Truncated)?;
            pos += len;
            options.push(
                CoapOption::from_value(num, value).map_err(|e| {
                    MessageConversionError::InvalidOptionValue(CoapOptionType::try_from(num).ok(), e)
                })?,
            );
        }

        if code == CoapMessageCode::Empty && (token_len > 0 || !options.is_empty() || data.is_some()) {
            return Err(MessageConversionError::DataInEmptyMessage);
        }

        trace!("decoded {:?} message {} with {} options", type_, mid, options.len());
        Ok(CoapMessage {
            type_,
            code,
            mid: Some(mid),
            options,
            token: Some(token.into()),
            data,
        })
    }

    /// Serializes this message into its wire format.
    pub fn encode(&self) -> Result<Vec<u8>, MessageConversionError> {
        let mid = self.mid.ok_or(MessageConversionError::MissingMessageId)?;
        let token: &[u8] = self.token.as_deref().unwrap_or(&[]);
        if token.len() > MAX_TOKEN_LENGTH {
            return Err(MessageConversionError::InvalidTokenLength(token.len() as u8));
        }
        if self.code == CoapMessageCode::Empty && (!token.is_empty() || !self.options.is_empty() || self.data.is_some())
        {
            return Err(MessageConversionError::DataInEmptyMessage);
        }

        let mut out = Vec::with_capacity(4 + token.len() + self.data.as_ref().map_or(0, |d| d.len() + 1));
        out.push((COAP_VERSION << 6) | ((self.type_ as u8) << 4) | token.len() as u8);
        out.push(self.code.to_raw_code());
        out.extend_from_slice(&mid.to_be_bytes());
        out.extend_from_slice(token);

        // Stable sort, repeated options keep their relative order.
        let mut options: Vec<&CoapOption> = self.options.iter().collect();
        options.sort_by_key(|opt| opt.number());
        let mut previous: u16 = 0;
        for option in options {
            let num = option.number();
            let value = option
                .value_bytes()
                .map_err(|e| MessageConversionError::InvalidOptionValue(CoapOptionType::try_from(num).ok(), e))?;
            let (delta_nibble, delta_ext) = option_nibble(u32::from(num - previous));
            let (len_nibble, len_ext) = option_nibble(value.len() as u32);
            out.push((delta_nibble << 4) | len_nibble);
            out.extend_from_slice(&delta_ext);
            out.extend_from_slice(&len_ext);
            out.extend_from_slice(&value);
            previous = num;
        }

        if let Some(data) = self.data.as_ref().filter(|d| !d.is_empty()) {
            out.push(PAYLOAD_MARKER);
            out.extend_from_slice(data);
        }
        Ok(out)
    }
}

/// Splits an option delta or length into its header nibble and extended bytes.
fn option_nibble(value: u32) -> (u8, Vec<u8>) {
    match value {
        0..=12 => (value as u8, Vec::new()),
        13..=268 => (13, vec![(value - 13) as u8]),
        _ => (14, ((value - 269) as u16).to_be_bytes().to_vec()),
    }
}

fn read_option_nibble(nibble: u8, bytes: &[u8], pos: &mut usize) -> Result<u32, MessageConversionError> {
    match nibble {
        0..=12 => Ok(u32::from(nibble)),
        13 => {
            let ext = *bytes.get(*pos).ok_or(MessageConversionError::Truncated)?;
            *pos += 1;
            Ok(u32::from(ext) + 13)
        },
        14 => {
            let ext = bytes.get(*pos..*pos + 2).ok_or(MessageConversionError::Truncated)?;
            *pos += 2;
            Ok(u32::from(u16::from_be_bytes([ext[0], ext[1]])) + 269)
        },
        _ => Err(MessageConversionError::ReservedOptionNibble),
    }
}

impl CoapMessageCommon for CoapMessage {
    fn as_message(&self) -> &CoapMessage {
        self
    }

    fn as_message_mut(&mut self) -> &mut CoapMessage {
        self
    }
}

impl From<CoapRequest> for CoapMessage {
    fn from(val: CoapRequest) -> Self {
        val.into_message()
    }
}

impl From<CoapResponse> for CoapMessage {
    fn from(val: CoapResponse) -> Self {
        val.into_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CoapRequestCode, CoapResponseCode};

    #[test]
    fn encodes_header_token_options_and_payload() {
        let mut message = CoapMessage::new(CoapMessageType::Con, CoapRequestCode::Get.into());
        message.set_mid(Some(0x1234));
        message.set_token(Some(vec![0xAB]));
        message.add_option(CoapOption::UriPath("temp".to_string()));
        message.set_data(Some(b"hi".to_vec()));

        let bytes = message.encode().unwrap();
        assert_eq!(
            bytes,
            vec![0x41, 0x01, 0x12, 0x34, 0xAB, 0xB4, b't', b'e', b'm', b'p', 0xFF, b'h', b'i']
        );
    }

    #[test]
    fn options_are_sorted_and_use_extended_deltas() {
        let mut message = CoapMessage::new(CoapMessageType::Non, CoapResponseCode::Content.into());
        message.set_mid(Some(7));
        message.add_option(CoapOption::Size1(300));
        message.add_option(CoapOption::ContentFormat(0));

        let bytes = message.encode().unwrap();
        // Content-Format (12) with empty value, then Size1 (60): delta 48 -> nibble 13, ext 35.
        assert_eq!(&bytes[4..], &[0xC0, 0xD2, 35, 0x01, 0x2C]);

        let decoded = CoapMessage::decode(&bytes).unwrap();
        let options: Vec<_> = decoded.options_iter().cloned().collect();
        assert_eq!(options, vec![CoapOption::ContentFormat(0), CoapOption::Size1(300)]);
    }

    #[test]
    fn rejects_malformed_datagrams() {
        assert_eq!(CoapMessage::decode(&[0x40, 0x01]), Err(MessageConversionError::Truncated));
        assert_eq!(
            CoapMessage::decode(&[0x80, 0x01, 0, 0]),
            Err(MessageConversionError::UnsupportedVersion(2))
        );
        assert_eq!(
            CoapMessage::decode(&[0x49, 0x01, 0, 0]),
            Err(MessageConversionError::InvalidTokenLength(9))
        );
        assert_eq!(
            CoapMessage::decode(&[0x40, 0x01, 0, 0, 0xFF]),
            Err(MessageConversionError::EmptyPayload)
        );
        assert_eq!(
            CoapMessage::decode(&[0x40, 0x01, 0, 0, 0xF0]),
            Err(MessageConversionError::ReservedOptionNibble)
        );
        assert_eq!(
            CoapMessage::decode(&[0x41, 0x00, 0, 0, 0x01]),
            Err(MessageConversionError::DataInEmptyMessage)
        );
    }

    #[test]
    fn unknown_options_are_preserved() {
        let mut message = CoapMessage::new(CoapMessageType::Con, CoapRequestCode::Post.into());
        message.set_mid(Some(1));
        message.add_option(CoapOption::Other(2048, Box::new([1, 2, 3])));
        let decoded = CoapMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(
            decoded.options_iter().next(),
            Some(&CoapOption::Other(2048, Box::new([1, 2, 3])))
        );
    }
}
