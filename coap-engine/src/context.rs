// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * context.rs - CoAP context related code.
 */

//! Module containing context-internal types and traits.

use std::{
    fmt::{Debug, Formatter},
    io,
    net::SocketAddr,
    time::{Duration, Instant},
};

use log::{debug, info, trace, warn};

use crate::{
    blocking::{BlockResponseHandler, BlockingRequest, BlockingRequestEvent, BlockingRequestState},
    config::CoapConfig,
    crypto::psk::KeystoreResolver,
    error::{
        ContextConfigurationError, ContextCreationError, IoProcessError, ResourceRegistrationError, RngError,
        TransportError,
    },
    event::{dispatch_event, CoapEventHandler},
    message::{BlockCursor, CoapBlockOption, CoapMessage, CoapMessageCommon, CoapRequest, CoapResponse},
    periodic::PeriodicScheduler,
    prng::coap_prng_try_fill,
    protocol::{CoapMessageCode, CoapMessageType, CoapResponseCode},
    registry::{ObservationHandler, ResourceId, ResourceRegistry},
    resource::UntypedCoapResource,
    transaction::{ReliableMessageLayer, TransactionHandle, TransactionMatch, TransactionTable},
    transport::{DtlsBackend, TransportEvent, TransportRouter},
    types::CoapEndpoint,
};

/// Length of tokens generated for requests that do not carry one.
const DEFAULT_TOKEN_LENGTH: usize = 4;

struct ClientExchange {
    request: BlockingRequest<TransactionTable>,
    handler: Box<dyn BlockResponseHandler>,
}

impl Debug for ClientExchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientExchange")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// The CoAP context, i.e. the event loop tying resources, transports and client requests
/// together.
///
/// All processing happens in [do_io()](CoapContext::do_io()), which has to be called
/// repeatedly.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
///
/// use coap_engine::{CoapConfig, CoapContext};
/// use coap_engine::message::{BlockCursor, CoapRequest, CoapResponse};
/// use coap_engine::protocol::CoapRequestCode;
/// use coap_engine::resource::{CoapResource, ResourceFlags};
///
/// fn hello(_: &mut (), _: &CoapRequest, _: &mut CoapResponse, cursor: &mut BlockCursor<'_>) {
///     cursor.write_bytes(b"Hello World!");
/// }
///
/// let mut context = CoapContext::new(CoapConfig::default())?;
/// let mut resource = CoapResource::new(ResourceFlags::empty(), ());
/// resource.set_method_handler(CoapRequestCode::Get, Some(hello));
/// context.add_resource("hello", resource)?;
/// context.init();
/// loop {
///     context.do_io(Some(Duration::from_secs(1)))?;
/// }
/// # Result::<(), Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug)]
pub struct CoapContext {
    config: CoapConfig,
    transport: TransportRouter,
    registry: ResourceRegistry,
    periodic: PeriodicScheduler,
    transactions: TransactionTable,
    requests: Vec<ClientExchange>,
    event_handler: Option<Box<dyn CoapEventHandler>>,
}

impl CoapContext {
    /// Creates a new context and binds its sockets as configured in `config`.
    pub fn new(config: CoapConfig) -> Result<CoapContext, ContextCreationError> {
        let transport = TransportRouter::bind(config.bind_addr(), config.secure_bind_addr(), config.mtu())?;
        info!(
            "CoAP context listening on {:?} (secure: {:?})",
            transport.local_addr().ok(),
            transport.secure_local_addr().and_then(Result::ok)
        );
        Ok(CoapContext {
            transactions: TransactionTable::new(&config),
            config,
            transport,
            registry: ResourceRegistry::new(),
            periodic: PeriodicScheduler::new(),
            requests: Vec::new(),
            event_handler: None,
        })
    }

    pub fn config(&self) -> &CoapConfig {
        &self.config
    }

    /// Adds the given resource to the resource pool of this context under `path`.
    ///
    /// Periodic resources get their timer armed right away.
    pub fn add_resource<R: UntypedCoapResource>(
        &mut self,
        path: &str,
        resource: R,
    ) -> Result<ResourceId, ResourceRegistrationError> {
        let id = self.registry.register(path, resource)?;
        if let Some(resource) = self.registry.get(id) {
            self.periodic.arm(id, resource, Instant::now());
        }
        Ok(id)
    }

    /// Marks initialization as complete. Periodic handlers only run afterwards.
    pub fn init(&mut self) {
        self.registry.init();
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    pub fn set_observation_handler<H: ObservationHandler + 'static>(&mut self, handler: Option<H>) {
        self.registry
            .set_observation_handler(handler.map(|h| Box::new(h) as Box<dyn ObservationHandler>));
    }

    /// Sets the event handler for DTLS session events.
    pub fn set_event_handler<H: CoapEventHandler + 'static>(&mut self, handler: Option<H>) {
        self.event_handler = handler.map(|h| Box::new(h) as Box<dyn CoapEventHandler>);
    }

    /// Sets the DTLS implementation used for `coaps` endpoints.
    ///
    /// Requires a secure socket (see [CoapConfigBuilder::secure_bind_addr()](crate::config::CoapConfigBuilder::secure_bind_addr())).
    pub fn set_dtls_backend<B: DtlsBackend + 'static>(&mut self, backend: B) -> Result<(), ContextConfigurationError> {
        self.transport.set_dtls_backend(backend)
    }

    /// Returns the keystore queried for pre-shared keys.
    pub fn keystore_mut(&mut self) -> &mut KeystoreResolver {
        self.transport.keystore_mut()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn secure_local_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.transport.secure_local_addr()
    }

    pub fn connect(&mut self, endpoint: &CoapEndpoint) -> Result<(), TransportError> {
        self.transport.connect(endpoint)
    }

    pub fn disconnect(&mut self, endpoint: &CoapEndpoint) {
        self.transport.disconnect(endpoint)
    }

    pub fn is_connected(&self, endpoint: &CoapEndpoint) -> bool {
        self.transport.is_connected(endpoint)
    }

    /// Returns whether client requests are still in progress.
    pub fn has_open_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    /// Sends `request` to `endpoint`, retrieving the response block by block.
    ///
    /// `handler` receives every block and is notified once the request terminates. If the request
    /// has no token, a random one is generated. Returns the state of the request after sending
    /// the first block request.
    pub fn send_request<B: BlockResponseHandler + 'static>(
        &mut self,
        endpoint: &CoapEndpoint,
        mut request: CoapRequest,
        handler: B,
    ) -> Result<BlockingRequestState, RngError> {
        if request.token().map_or(true, <[u8]>::is_empty) {
            let mut token = [0u8; DEFAULT_TOKEN_LENGTH];
            coap_prng_try_fill(&mut token)?;
            request.set_token(Some(token.to_vec()));
        }
        let mut exchange = ClientExchange {
            request: BlockingRequest::new(*endpoint, request)
                .with_chunk_size(self.config.max_chunk_size())
                .with_max_attempts(self.config.max_attempts()),
            handler: Box::new(handler),
        };
        let state = exchange.request.resume(
            &mut self.transactions,
            BlockingRequestEvent::Start,
            exchange.handler.as_mut(),
        );
        if !state.is_finished() {
            self.requests.push(exchange);
        }
        self.flush_transmissions(Instant::now());
        Ok(state)
    }

    /// Performs a single iteration of the event loop.
    ///
    /// Waits for at most `timeout` (or indefinitely for `None`), but returns earlier when a
    /// periodic timer, retransmission or DTLS timer is due. Returns the time spent.
    pub fn do_io(&mut self, timeout: Option<Duration>) -> Result<Duration, IoProcessError> {
        let start = Instant::now();
        let mut poll_timeout = timeout;
        let deadlines = [
            self.periodic.next_deadline(),
            self.transactions.next_timeout(),
            self.transport.next_timeout(),
        ];
        for deadline in deadlines.into_iter().flatten() {
            let until = deadline.saturating_duration_since(start);
            poll_timeout = Some(poll_timeout.map_or(until, |t| t.min(until)));
        }

        for event in self.transport.poll(poll_timeout)? {
            match event {
                TransportEvent::Datagram(source, data) => self.handle_datagram(source, &data),
                event @ TransportEvent::Dtls(..) => {
                    if let Some(handler) = self.event_handler.as_mut() {
                        dispatch_event(handler.as_mut(), &event);
                    }
                },
            }
        }

        let now = Instant::now();
        let fired = self.periodic.fire_due(now, &mut self.registry);
        if fired > 0 {
            trace!("ran {} periodic handlers", fired);
        }
        for handle in self.transactions.take_expired(now) {
            self.complete_transaction(handle, None);
        }
        self.flush_transmissions(now);
        Ok(start.elapsed())
    }

    /// Processes I/O until all client requests have terminated or `exit_wait_timeout` has
    /// elapsed, then drops the context.
    pub fn shutdown(mut self, exit_wait_timeout: Option<Duration>) -> Result<(), IoProcessError> {
        let mut remaining_time = exit_wait_timeout;
        while self.has_open_requests() && remaining_time.map_or(true, |t| !t.is_zero()) {
            let spent_time = self.do_io(remaining_time)?;
            remaining_time = remaining_time.map(|v| v.saturating_sub(spent_time));
        }
        if self.has_open_requests() {
            warn!("shutting down with {} open requests", self.requests.len());
        }
        Ok(())
    }

    fn handle_datagram(&mut self, source: CoapEndpoint, data: &[u8]) {
        let message = match CoapMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping undecodable message from {}: {}", source, e);
                // Confirmable messages are rejected ([RFC 7252, Section 4.2]).
                if data.len() >= 4 && CoapMessageType::from_bits(data[0] >> 4) == CoapMessageType::Con {
                    let mid = u16::from_be_bytes([data[2], data[3]]);
                    self.send_message(&source, CoapMessage::new_empty(CoapMessageType::Rst, mid));
                }
                return;
            },
        };
        match message.code() {
            CoapMessageCode::Request(_) => self.handle_request(source, message),
            CoapMessageCode::Response(_) => self.handle_response(source, message),
            CoapMessageCode::Empty => self.handle_empty(source, message),
        }
    }

    fn handle_request(&mut self, source: CoapEndpoint, message: CoapMessage) {
        let (response_type, response_mid) = match message.type_() {
            CoapMessageType::Con => (CoapMessageType::Ack, message.mid()),
            CoapMessageType::Non => (CoapMessageType::Non, Some(self.transactions.next_message_id())),
            other => {
                debug!("ignoring request with message type {:?} from {}", other, source);
                return;
            },
        };
        let Ok(mut response) = CoapResponse::new(response_type, CoapResponseCode::Content) else {
            return;
        };
        response.set_mid(response_mid);
        response.set_token(message.token().map(Box::<[u8]>::from));

        match CoapRequest::from_message(message) {
            Ok(request) => self.serve(&source, &request, &mut response),
            Err(e) => {
                debug!("malformed request from {}: {}", source, e);
                response.set_response_code(CoapResponseCode::BadRequest);
            },
        }
        trace!("responding {} to {}", response.response_code(), source);
        self.send_message(&source, response.into_message());
    }

    /// Dispatches `request` and fits the resulting representation into one block.
    fn serve(&mut self, source: &CoapEndpoint, request: &CoapRequest, response: &mut CoapResponse) {
        let max_chunk_size = self.config.max_chunk_size();
        let requested = request.block2();
        let block_size = requested.map_or(max_chunk_size, |b| b.size().min(max_chunk_size));
        let offset = requested.map_or(0, CoapBlockOption::offset);
        let block_num = offset / u32::from(block_size);

        let mut buffer = vec![0u8; usize::from(block_size)];
        let mut cursor = BlockCursor::new(&mut buffer, offset);
        if !self.registry.dispatch(source, request, response, &mut cursor) {
            return;
        }
        if !cursor.is_empty() {
            response.set_data(Some(cursor.data()));
        }

        if cursor.is_chunked() {
            if requested.is_some() || cursor.next_offset().is_some() {
                let more = cursor.next_offset().is_some();
                set_block2(response, block_num, more, block_size);
            }
            return;
        }

        let data: Vec<u8> = response.data().unwrap_or_default().to_vec();
        let block_size = usize::from(block_size);
        let offset = offset as usize;
        if requested.is_none() && data.len() <= block_size {
            return;
        }
        if offset > 0 && offset >= data.len() {
            debug!("block {} out of scope for /{}", block_num, request.path());
            response.set_response_code(CoapResponseCode::BadOption);
            response.set_data(Some(&b"BlockOutOfScope"[..]));
            return;
        }
        let end = (offset + block_size).min(data.len());
        set_block2(response, block_num, end < data.len(), block_size as u16);
        response.set_data(Some(&data[offset..end]));
    }

    fn handle_response(&mut self, source: CoapEndpoint, message: CoapMessage) {
        let type_ = message.type_();
        let mid = message.mid();
        match self.transactions.match_message(&message, &source, Instant::now()) {
            Some(TransactionMatch::Response(handle)) => {
                if type_ == CoapMessageType::Con {
                    if let Some(mid) = mid {
                        self.send_message(&source, CoapMessage::new_empty(CoapMessageType::Ack, mid));
                    }
                }
                let response = match CoapResponse::from_message(message) {
                    Ok(response) => Some(response),
                    Err(e) => {
                        debug!("malformed response from {}: {}", source, e);
                        None
                    },
                };
                self.complete_transaction(handle, response.as_ref());
            },
            Some(TransactionMatch::Reset(handle)) => self.complete_transaction(handle, None),
            Some(TransactionMatch::Acknowledged(_)) => {},
            None => {
                debug!("unexpected response from {}", source);
                if let (CoapMessageType::Con | CoapMessageType::Non, Some(mid)) = (type_, mid) {
                    self.send_message(&source, CoapMessage::new_empty(CoapMessageType::Rst, mid));
                }
            },
        }
    }

    fn handle_empty(&mut self, source: CoapEndpoint, message: CoapMessage) {
        match message.type_() {
            CoapMessageType::Con => {
                trace!("answering ping from {}", source);
                if let Some(mid) = message.mid() {
                    self.send_message(&source, CoapMessage::new_empty(CoapMessageType::Rst, mid));
                }
            },
            CoapMessageType::Ack | CoapMessageType::Rst => {
                match self.transactions.match_message(&message, &source, Instant::now()) {
                    Some(TransactionMatch::Reset(handle)) => self.complete_transaction(handle, None),
                    Some(_) => {},
                    None => trace!("unmatched {:?} from {}", message.type_(), source),
                }
            },
            CoapMessageType::Non => trace!("ignoring empty NON from {}", source),
        }
    }

    /// Resumes the client request waiting on `handle`.
    fn complete_transaction(&mut self, handle: TransactionHandle, response: Option<&CoapResponse>) {
        let Some(pos) = self
            .requests
            .iter()
            .position(|r| r.request.pending_transaction() == Some(handle))
        else {
            trace!("no request waiting on transaction {:?}", handle);
            return;
        };
        let exchange = &mut self.requests[pos];
        let state = exchange.request.resume(
            &mut self.transactions,
            BlockingRequestEvent::Response { handle, response },
            exchange.handler.as_mut(),
        );
        if state.is_finished() {
            debug!("request to {} finished: {:?}", exchange.request.endpoint(), state);
            self.requests.remove(pos);
        }
    }

    fn flush_transmissions(&mut self, now: Instant) {
        for (endpoint, packet) in self.transactions.take_transmissions(now) {
            self.transport.send(Some(&endpoint), &packet);
        }
    }

    fn send_message(&mut self, endpoint: &CoapEndpoint, message: CoapMessage) {
        match message.encode() {
            Ok(bytes) => self.transport.send(Some(endpoint), &bytes),
            Err(e) => warn!("unable to encode message for {}: {}", endpoint, e),
        }
    }
}

fn set_block2(response: &mut CoapResponse, num: u32, more: bool, size: u16) {
    match CoapBlockOption::new(num, more, size) {
        Ok(block) => response.set_block2(Some(block)),
        Err(e) => warn!("unable to set Block2 option {}/{}/{}: {}", num, more, size, e),
    }
}
