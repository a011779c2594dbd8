// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * message/request.rs - Types wrapping messages into requests.
 */

use crate::{
    error::{MessageConversionError, MessageTypeError},
    message::{block::CoapBlockOption, CoapMessage, CoapMessageCommon, CoapOption},
    protocol::{CoapMessageCode, CoapMessageType, CoapOptionType, CoapRequestCode, ContentFormat, ETag, Observe},
};

/// Representation of a CoAP request message.
///
/// This struct wraps around the more direct [CoapMessage] and allows easier definition of typical
/// options used in requests.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CoapRequest {
    pdu: CoapMessage,
    method: CoapRequestCode,
    uri_host: Option<String>,
    uri_port: Option<u16>,
    path: Vec<String>,
    query: Vec<String>,
    accept: Option<ContentFormat>,
    content_format: Option<ContentFormat>,
    etag: Vec<ETag>,
    observe: Option<Observe>,
    block1: Option<CoapBlockOption>,
    block2: Option<CoapBlockOption>,
}

impl CoapRequest {
    /// Creates a new CoAP request with the given message type and code.
    ///
    /// Returns an error if the given message type is not allowed for CoAP requests (the only
    /// allowed message types are [CoapMessageType::Con] and [CoapMessageType::Non]).
    pub fn new(type_: CoapMessageType, code: CoapRequestCode) -> Result<CoapRequest, MessageTypeError> {
        match type_ {
            CoapMessageType::Con | CoapMessageType::Non => {},
            v => return Err(MessageTypeError::InvalidForMessageCode(v)),
        }
        Ok(CoapRequest {
            pdu: CoapMessage::new(type_, code.into()),
            method: code,
            uri_host: None,
            uri_port: None,
            path: Vec::new(),
            query: Vec::new(),
            accept: None,
            content_format: None,
            etag: Vec::new(),
            observe: None,
            block1: None,
            block2: None,
        })
    }

    /// Returns the request method.
    pub fn method(&self) -> CoapRequestCode {
        self.method
    }

    /// Returns the request path, i.e. the Uri-Path segments joined with `/`.
    pub fn path(&self) -> String {
        self.path.join("/")
    }

    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    /// Sets the request path, splitting it into Uri-Path segments.
    ///
    /// Empty segments (including a leading slash) are ignored.
    pub fn set_path(&mut self, path: &str) {
        self.path = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(String::from)
            .collect();
    }

    pub fn query(&self) -> &[String] {
        &self.query
    }

    /// Adds a Uri-Query segment (e.g. `"ep=node1"`).
    pub fn add_query(&mut self, query: impl Into<String>) {
        self.query.push(query.into());
    }

    pub fn uri_host(&self) -> Option<&str> {
        self.uri_host.as_deref()
    }

    pub fn set_uri_host(&mut self, host: Option<String>) {
        self.uri_host = host;
    }

    pub fn uri_port(&self) -> Option<u16> {
        self.uri_port
    }

    pub fn set_uri_port(&mut self, port: Option<u16>) {
        self.uri_port = port;
    }

    /// Returns the "Accept" option value for this request.
    pub fn accept(&self) -> Option<ContentFormat> {
        self.accept
    }

    /// Sets the "Accept" option value for this request.
    ///
    /// See [RFC 7252, Section 5.10.4](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10.4)
    /// for more information.
    pub fn set_accept(&mut self, accept: Option<ContentFormat>) {
        self.accept = accept
    }

    /// Returns the "Content-Format" option value for this request.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.content_format
    }

    pub fn set_content_format(&mut self, content_format: Option<ContentFormat>) {
        self.content_format = content_format;
    }

    /// Returns the "ETag" option values of this request.
    pub fn etag(&self) -> &[ETag] {
        &self.etag
    }

    pub fn set_etag(&mut self, etag: Vec<ETag>) {
        self.etag = etag
    }

    /// Returns the "Observe" option value for this request.
    pub fn observe(&self) -> Option<Observe> {
        self.observe
    }

    /// Sets the "Observe" option value for this request.
    ///
    /// This option is defined in [RFC 7641](https://datatracker.ietf.org/doc/html/rfc7641) and is
    /// not part of the main CoAP spec.
    pub fn set_observe(&mut self, observe: Option<Observe>) {
        self.observe = observe;
    }

    pub fn block1(&self) -> Option<CoapBlockOption> {
        self.block1
    }

    pub fn set_block1(&mut self, block1: Option<CoapBlockOption>) {
        self.block1 = block1;
    }

    /// Returns the "Block2" option of this request, i.e. the response block the client asks for.
    pub fn block2(&self) -> Option<CoapBlockOption> {
        self.block2
    }

    pub fn set_block2(&mut self, block2: Option<CoapBlockOption>) {
        self.block2 = block2;
    }

    /// Parses the given [CoapMessage] into a CoapRequest.
    ///
    /// Returns a [MessageConversionError] if the provided PDU cannot be parsed into a request.
    pub fn from_message(mut pdu: CoapMessage) -> Result<CoapRequest, MessageConversionError> {
        let method = match pdu.code() {
            CoapMessageCode::Request(method) => method,
            _ => return Err(crate::error::MessageCodeError::NotARequestCode.into()),
        };
        let mut request = CoapRequest::new(pdu.type_(), method)?;
        let mut additional_opts = Vec::new();
        for option in pdu.options_iter() {
            match option {
                CoapOption::UriHost(value) => {
                    set_once(&mut request.uri_host, value.clone(), CoapOptionType::UriHost)?
                },
                CoapOption::UriPort(value) => set_once(&mut request.uri_port, *value, CoapOptionType::UriPort)?,
                CoapOption::UriPath(value) => request.path.push(value.clone()),
                CoapOption::UriQuery(value) => request.query.push(value.clone()),
                CoapOption::ContentFormat(value) => {
                    set_once(&mut request.content_format, *value, CoapOptionType::ContentFormat)?
                },
                CoapOption::Accept(value) => set_once(&mut request.accept, *value, CoapOptionType::Accept)?,
                CoapOption::ETag(value) => request.etag.push(value.clone()),
                CoapOption::Observe(value) => set_once(&mut request.observe, *value, CoapOptionType::Observe)?,
                CoapOption::Block1(value) => set_once(
                    &mut request.block1,
                    CoapBlockOption::from_raw(*value),
                    CoapOptionType::Block1,
                )?,
                CoapOption::Block2(value) => set_once(
                    &mut request.block2,
                    CoapBlockOption::from_raw(*value),
                    CoapOptionType::Block2,
                )?,
                CoapOption::LocationPath(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::LocationPath,
                    ))
                },
                CoapOption::LocationQuery(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::LocationQuery,
                    ))
                },
                CoapOption::MaxAge(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::MaxAge,
                    ))
                },
                CoapOption::Size2(_) => {
                    return Err(MessageConversionError::InvalidOptionForMessageType(
                        CoapOptionType::Size2,
                    ))
                },
                other => additional_opts.push(other.clone()),
            }
        }
        pdu.clear_options();
        for opt in additional_opts {
            pdu.add_option(opt);
        }
        request.pdu = pdu;
        Ok(request)
    }

    /// Converts this request into a [CoapMessage] that can be encoded and sent.
    pub fn into_message(mut self) -> CoapMessage {
        if let Some(host) = self.uri_host {
            self.pdu.add_option(CoapOption::UriHost(host));
        }
        if let Some(port) = self.uri_port {
            self.pdu.add_option(CoapOption::UriPort(port));
        }
        for segment in self.path {
            self.pdu.add_option(CoapOption::UriPath(segment));
        }
        for query in self.query {
            self.pdu.add_option(CoapOption::UriQuery(query));
        }
        if let Some(accept) = self.accept {
            self.pdu.add_option(CoapOption::Accept(accept));
        }
        if let Some(content_format) = self.content_format {
            self.pdu.add_option(CoapOption::ContentFormat(content_format));
        }
        for etag in self.etag {
            self.pdu.add_option(CoapOption::ETag(etag));
        }
        if let Some(observe) = self.observe {
            self.pdu.add_option(CoapOption::Observe(observe));
        }
        if let Some(block1) = self.block1 {
            self.pdu.add_option(CoapOption::Block1(block1.to_raw()));
        }
        if let Some(block2) = self.block2 {
            self.pdu.add_option(CoapOption::Block2(block2.to_raw()));
        }
        self.pdu
    }
}

/// Stores the value of a non-repeatable option, failing if it was already set.
pub(super) fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    opt_type: CoapOptionType,
) -> Result<(), MessageConversionError> {
    if slot.is_some() {
        return Err(MessageConversionError::NonRepeatableOptionRepeated(opt_type));
    }
    *slot = Some(value);
    Ok(())
}

impl CoapMessageCommon for CoapRequest {
    fn as_message(&self) -> &CoapMessage {
        &self.pdu
    }

    fn as_message_mut(&mut self) -> &mut CoapMessage {
        &mut self.pdu
    }
}
