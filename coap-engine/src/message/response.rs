// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * message/response.rs - Types wrapping messages into responses.
 */

use crate::{
    error::{MessageCodeError, MessageConversionError, MessageTypeError},
    message::{block::CoapBlockOption, request::set_once, CoapMessage, CoapMessageCommon, CoapOption},
    protocol::{CoapMessageCode, CoapMessageType, CoapOptionType, CoapResponseCode, ContentFormat, ETag, MaxAge, Observe, Size},
};

/// Representation of a CoAP response message.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CoapResponse {
    pdu: CoapMessage,
    code: CoapResponseCode,
    content_format: Option<ContentFormat>,
    max_age: Option<MaxAge>,
    etag: Option<ETag>,
    observe: Option<Observe>,
    location_path: Vec<String>,
    block2: Option<CoapBlockOption>,
    size2: Option<Size>,
}

impl CoapResponse {
    /// Creates a new CoAP response with the given message type and code.
    ///
    /// Returns an error if the given message type is not allowed for CoAP responses (the allowed
    /// message types are [CoapMessageType::Con] and [CoapMessageType::Non] and [CoapMessageType::Ack]).
    pub fn new(type_: CoapMessageType, code: CoapResponseCode) -> Result<CoapResponse, MessageTypeError> {
        match type_ {
            CoapMessageType::Con | CoapMessageType::Non | CoapMessageType::Ack => {},
            v => return Err(MessageTypeError::InvalidForMessageCode(v)),
        }
        Ok(CoapResponse {
            pdu: CoapMessage::new(type_, code.into()),
            code,
            content_format: None,
            max_age: None,
            etag: None,
            observe: None,
            location_path: Vec::new(),
            block2: None,
            size2: None,
        })
    }

    /// Returns the response code.
    pub fn response_code(&self) -> CoapResponseCode {
        self.code
    }

    /// Sets the response code.
    pub fn set_response_code(&mut self, code: CoapResponseCode) {
        self.code = code;
        self.pdu.set_code(code.into());
    }

    /// Returns the "Content-Format" option value for this response.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    /// Sets the "Content-Format" option value for this response.
    ///
    /// See [RFC 7252, Section 5.10.3](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.3)
    /// for more information.
    pub fn set_content_format(&mut self, content_format: Option<ContentFormat>) {
        self.content_format = content_format;
    }

    /// Returns the "Max-Age" option value for this response.
    pub fn max_age(&self) -> Option<MaxAge> {
        self.max_age
    }

    /// Sets the "Max-Age" option value for this response, i.e. how long (in seconds) the
    /// response may be cached.
    pub fn set_max_age(&mut self, max_age: Option<MaxAge>) {
        self.max_age = max_age
    }

    pub fn etag(&self) -> Option<&ETag> {
        self.etag.as_ref()
    }

    pub fn set_etag(&mut self, etag: Option<ETag>) {
        self.etag = etag
    }

    /// Returns the "Observe" option value for this response.
    pub fn observe(&self) -> Option<Observe> {
        self.observe
    }

    /// Sets the "Observe" option value for this response.
    ///
    /// This option is defined in [RFC 7641](https://datatracker.ietf.org/doc/html/rfc7641) and is
    /// not part of the main CoAP spec.
    pub fn set_observe(&mut self, observe: Option<Observe>) {
        self.observe = observe;
    }

    pub fn location_path(&self) -> &[String] {
        &self.location_path
    }

    pub fn set_location_path(&mut self, location_path: Vec<String>) {
        self.location_path = location_path;
    }

    /// Returns the "Block2" option of this response.
    pub fn block2(&self) -> Option<CoapBlockOption> {
        self.block2
    }

    pub fn set_block2(&mut self, block2: Option<CoapBlockOption>) {
        self.block2 = block2;
    }

    /// Returns the "Size2" option value, i.e. the size of the full representation.
    pub fn size2(&self) -> Option<Size> {
        self.size2
    }

    pub fn set_size2(&mut self, size2: Option<Size>) {
        self.size2 = size2;
    }

    /// Parses the given [CoapMessage] into a CoapResponse.
    ///
    /// Returns a [MessageConversionError] if the provided PDU cannot be parsed into a response.
    pub fn from_message(mut pdu: CoapMessage) -> Result<CoapResponse, MessageConversionError> {
        let code = match pdu.code() {
            CoapMessageCode::Response(code) => code,
            _ => return Err(MessageCodeError::NotAResponseCode.into()),
        };
        let mut response = CoapResponse::new(pdu.type_(), code)?;
        let mut additional_opts = Vec::new();
        for option in pdu.options_iter() {
            match option {
                CoapOption::ContentFormat(value) => {
                    set_once(&mut response.content_format, *value, CoapOptionType::ContentFormat)?
                },
                CoapOption::MaxAge(value) => set_once(&mut response.max_age, *value, CoapOptionType::MaxAge)?,
                CoapOption::ETag(value) => set_once(&mut response.etag, value.clone(), CoapOptionType::ETag)?,
                CoapOption::Observe(value) => set_once(&mut response.observe, *value, CoapOptionType::Observe)?,
                CoapOption::LocationPath(value) => response.location_path.push(value.clone()),
                CoapOption::Block2(value) => set_once(
                    &mut response.block2,
                    CoapBlockOption::from_raw(*value),
                    CoapOptionType::Block2,
                )?,
                CoapOption::Size2(value) => set_once(&mut response.size2, *value, CoapOptionType::Size2)?,
                CoapOption::UriHost(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::UriHost,
                    ))
                },
                CoapOption::UriPort(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::UriPort,
                    ))
                },
                CoapOption::UriPath(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::UriPath,
                    ))
                },
                CoapOption::UriQuery(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::UriQuery,
                    ))
                },
                CoapOption::Accept(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::Accept,
                    ))
                },
                other => additional_opts.push(other.clone()),
            }
        }
        pdu.clear_options();
        for opt in additional_opts {
            pdu.add_option(opt);
        }
        response.pdu = pdu;
        Ok(response)
    }

    /// Converts this response into a [CoapMessage] that can be encoded and sent.
    pub fn into_message(mut self) -> CoapMessage {
        if let Some(observe) = self.observe {
            self.pdu.add_option(CoapOption::Observe(observe));
        }
        if let Some(etag) = self.etag {
            self.pdu.add_option(CoapOption::ETag(etag));
        }
        for segment in self.location_path {
            self.pdu.add_option(CoapOption::LocationPath(segment));
        }
        if let Some(content_format) = self.content_format {
            self.pdu.add_option(CoapOption::ContentFormat(content_format));
        }
        if let Some(max_age) = self.max_age {
            self.pdu.add_option(CoapOption::MaxAge(max_age));
        }
        if let Some(block2) = self.block2 {
            self.pdu.add_option(CoapOption::Block2(block2.to_raw()));
        }
        if let Some(size2) = self.size2 {
            self.pdu.add_option(CoapOption::Size2(size2));
        }
        self.pdu
    }
}

impl CoapMessageCommon for CoapResponse {
    fn as_message(&self) -> &CoapMessage {
        &self.pdu
    }

    fn as_message_mut(&mut self) -> &mut CoapMessage {
        &mut self.pdu
    }
}
