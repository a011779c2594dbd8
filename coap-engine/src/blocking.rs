// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * blocking.rs - Block-wise client requests.
 */

//! Block-wise client requests.
//!
//! A [BlockingRequest] retrieves a resource representation block by block
//! ([RFC 7959](https://datatracker.ietf.org/doc/html/rfc7959)), sending one request per block
//! through a [ReliableMessageLayer]. It is an explicit state machine: [resume()](BlockingRequest::resume())
//! is called once with [BlockingRequestEvent::Start] and then once for every response (or
//! timeout) of the transaction it is waiting for.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use coap_engine::{CoapConfig, CoapContext};
//! use coap_engine::message::{CoapRequest, CoapResponse, CoapMessageCommon};
//! use coap_engine::protocol::{CoapMessageType, CoapRequestCode};
//! use coap_engine::types::CoapEndpoint;
//!
//! let mut context = CoapContext::new(CoapConfig::default())?;
//! let endpoint: CoapEndpoint = "coap://[::1]".parse()?;
//! let mut request = CoapRequest::new(CoapMessageType::Con, CoapRequestCode::Get)?;
//! request.set_path("sensors/temperature");
//!
//! let mut body = Vec::new();
//! context.send_request(&endpoint, request, move |response: &CoapResponse| {
//!     body.extend_from_slice(response.data().unwrap_or_default());
//! })?;
//! while context.has_open_requests() {
//!     context.do_io(Some(Duration::from_secs(1)))?;
//! }
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```

use log::{debug, trace, warn};

use crate::{
    message::{CoapBlockOption, CoapMessage, CoapMessageCommon, CoapRequest, CoapResponse},
    protocol::{COAP_MAX_ATTEMPTS, REST_MAX_CHUNK_SIZE},
    transaction::ReliableMessageLayer,
    types::CoapEndpoint,
};

/// Reason a [BlockingRequest] failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlockingRequestFailure {
    /// No transaction slot was free to send the next block request.
    NoFreeTransaction,
    /// The server did not respond to a block request.
    NoResponse,
    /// The server sent the wrong block too often.
    TooManyMismatches,
    /// The block request could not be encoded or was rejected by the message layer.
    InvalidRequest,
}

/// State of a [BlockingRequest].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlockingRequestState {
    Init,
    AwaitResponse,
    Done,
    Failed(BlockingRequestFailure),
}

impl BlockingRequestState {
    /// Returns whether the request has terminated.
    pub fn is_finished(self) -> bool {
        matches!(self, BlockingRequestState::Done | BlockingRequestState::Failed(_))
    }
}

/// Input to [BlockingRequest::resume()].
#[derive(Debug, Copy, Clone)]
pub enum BlockingRequestEvent<'a, H> {
    /// Sends the first request.
    Start,
    /// The transaction `handle` completed, either with a response or without one (timeout or
    /// reset).
    Response {
        handle: H,
        response: Option<&'a CoapResponse>,
    },
}

/// Receiver for the blocks of a [BlockingRequest].
pub trait BlockResponseHandler {
    /// Called once for every block, in order.
    fn on_block(&mut self, response: &CoapResponse);

    /// Called once when the request terminates.
    #[allow(unused_variables)]
    fn on_finished(&mut self, outcome: Result<(), BlockingRequestFailure>) {}
}

impl<F: FnMut(&CoapResponse)> BlockResponseHandler for F {
    fn on_block(&mut self, response: &CoapResponse) {
        self(response)
    }
}

/// Client request retrieving a representation block by block.
#[derive(Debug)]
pub struct BlockingRequest<L: ReliableMessageLayer> {
    endpoint: CoapEndpoint,
    request: CoapRequest,
    chunk_size: u16,
    max_attempts: u8,
    block_num: u32,
    mismatches: u8,
    state: BlockingRequestState,
    transaction: Option<L::Handle>,
}

impl<L: ReliableMessageLayer> BlockingRequest<L> {
    /// Creates a request for `endpoint` using `request` as template for every block request.
    pub fn new(endpoint: CoapEndpoint, request: CoapRequest) -> BlockingRequest<L> {
        BlockingRequest {
            endpoint,
            request,
            chunk_size: REST_MAX_CHUNK_SIZE,
            max_attempts: COAP_MAX_ATTEMPTS,
            block_num: 0,
            mismatches: 0,
            state: BlockingRequestState::Init,
            transaction: None,
        }
    }

    /// Sets the block size requested from the server.
    pub fn with_chunk_size(mut self, chunk_size: u16) -> BlockingRequest<L> {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the number of wrong blocks tolerated before the request fails.
    pub fn with_max_attempts(mut self, max_attempts: u8) -> BlockingRequest<L> {
        self.max_attempts = max_attempts;
        self
    }

    pub fn state(&self) -> BlockingRequestState {
        self.state
    }

    pub fn endpoint(&self) -> &CoapEndpoint {
        &self.endpoint
    }

    /// Returns the number of the next expected block.
    pub fn block_num(&self) -> u32 {
        self.block_num
    }

    /// Returns the number of wrong blocks received so far.
    pub fn mismatches(&self) -> u8 {
        self.mismatches
    }

    /// Returns the transaction the request is currently waiting on.
    pub fn pending_transaction(&self) -> Option<L::Handle> {
        self.transaction
    }

    /// Advances the request.
    ///
    /// Events for other transactions than the pending one are ignored, as are events arriving
    /// after the request terminated.
    pub fn resume(
        &mut self,
        layer: &mut L,
        event: BlockingRequestEvent<'_, L::Handle>,
        handler: &mut dyn BlockResponseHandler,
    ) -> BlockingRequestState {
        match (self.state, event) {
            (BlockingRequestState::Init, BlockingRequestEvent::Start) => self.send_next(layer, handler),
            (BlockingRequestState::AwaitResponse, BlockingRequestEvent::Response { handle, response })
                if self.transaction == Some(handle) =>
            {
                self.transaction = None;
                self.evaluate(layer, response, handler)
            },
            (_, BlockingRequestEvent::Response { handle, .. }) => {
                trace!("ignoring event for stale transaction {:?}", handle);
                self.state
            },
            (_, BlockingRequestEvent::Start) => self.state,
        }
    }

    fn evaluate(
        &mut self,
        layer: &mut L,
        response: Option<&CoapResponse>,
        handler: &mut dyn BlockResponseHandler,
    ) -> BlockingRequestState {
        let Some(response) = response else {
            debug!("server {} not responding", self.endpoint);
            return self.finish(Err(BlockingRequestFailure::NoResponse), handler);
        };
        let (received, more) = response
            .block2()
            .map_or((0, false), |block| (block.num(), block.more()));
        if received == self.block_num {
            handler.on_block(response);
            self.block_num += 1;
        } else {
            debug!("wrong block {}/{} from {}", received, self.block_num, self.endpoint);
            self.mismatches = self.mismatches.saturating_add(1);
        }

        if !more {
            return self.finish(Ok(()), handler);
        }
        if self.mismatches >= self.max_attempts {
            return self.finish(Err(BlockingRequestFailure::TooManyMismatches), handler);
        }
        self.send_next(layer, handler)
    }

    fn send_next(&mut self, layer: &mut L, handler: &mut dyn BlockResponseHandler) -> BlockingRequestState {
        let mid = layer.next_message_id();
        let packet = match self.build_packet(mid) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("unable to build request for block {}: {}", self.block_num, e);
                return self.finish(Err(BlockingRequestFailure::InvalidRequest), handler);
            },
        };
        let Some(handle) = layer.new_transaction(mid, &self.endpoint) else {
            debug!("no free transaction for request to {}", self.endpoint);
            return self.finish(Err(BlockingRequestFailure::NoFreeTransaction), handler);
        };
        if let Err(e) = layer.submit(handle, packet) {
            warn!("unable to submit request for block {}: {}", self.block_num, e);
            return self.finish(Err(BlockingRequestFailure::InvalidRequest), handler);
        }
        trace!("requested block {} from {} (mid {})", self.block_num, self.endpoint, mid);
        self.transaction = Some(handle);
        self.state = BlockingRequestState::AwaitResponse;
        self.state
    }

    fn build_packet(&self, mid: u16) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let mut request = self.request.clone();
        request.set_mid(Some(mid));
        if self.block_num > 0 {
            request.set_block2(Some(CoapBlockOption::new(self.block_num, false, self.chunk_size)?));
        }
        Ok(CoapMessage::from(request).encode()?)
    }

    fn finish(
        &mut self,
        outcome: Result<(), BlockingRequestFailure>,
        handler: &mut dyn BlockResponseHandler,
    ) -> BlockingRequestState {
        self.transaction = None;
        self.state = match outcome {
            Ok(()) => BlockingRequestState::Done,
            Err(reason) => BlockingRequestState::Failed(reason),
        };
        handler.on_finished(outcome);
        self.state
    }
}
