// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * transport/mod.rs - Module file for CoAP transports.
 */

//! CoAP transports and the router multiplexing them.
//!
//! The [TransportRouter] owns a plaintext UDP socket and, optionally, a second socket for DTLS.
//! Datagrams on the plaintext socket are handed to the engine directly, datagrams on the secure
//! socket are passed through the [DtlsBackend] and only the decrypted application data reaches
//! the engine.

use std::{
    collections::HashMap,
    io,
    io::ErrorKind,
    net::SocketAddr,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use mio::{Events, Poll, Token};

pub use dtls::{DtlsBackend, DtlsEvent, DtlsIo, DtlsSessionState};
pub use udp::{CoapUdpEndpoint, COAP_DEFAULT_MTU};

use crate::{
    crypto::psk::KeystoreResolver,
    error::{ContextConfigurationError, ContextCreationError, TransportError},
    transport::dtls::DtlsOutput,
    types::CoapEndpoint,
};

mod dtls;
mod udp;

pub type EndpointMtu = usize;

const PLAIN_SOCKET: Token = Token(0);
const SECURE_SOCKET: Token = Token(1);
/// Upper bound of datagrams read from one socket per poll, so one busy socket cannot starve the
/// other.
const MAX_READS_PER_POLL: usize = 64;
const RECV_BUFFER_SIZE: usize = 1500;

/// Trait for functions common between all types of endpoints.
pub trait EndpointCommon {
    /// Returns the address the endpoint is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
    /// Returns the largest datagram size sent through this endpoint.
    fn mtu(&self) -> EndpointMtu;
    /// Sets the default MTU value of the endpoint.
    fn set_default_mtu(&mut self, mtu: EndpointMtu);
}

/// Something the router observed while polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A datagram (decrypted, for secure endpoints) arrived from the given peer.
    Datagram(CoapEndpoint, Vec<u8>),
    /// The DTLS session with the given peer changed state.
    Dtls(CoapEndpoint, DtlsEvent),
}

/// Plaintext/secure transport multiplexer.
#[derive(Debug)]
pub struct TransportRouter {
    poll: Poll,
    events: Events,
    plain: CoapUdpEndpoint,
    secure: Option<CoapUdpEndpoint>,
    dtls: Option<Box<dyn DtlsBackend>>,
    keystore: KeystoreResolver,
    /// Application data waiting for a DTLS session to be established.
    pending: HashMap<SocketAddr, Vec<Vec<u8>>>,
    deferred: Vec<TransportEvent>,
    all_sockets_drained: bool,
    recv_buf: Vec<u8>,
}

impl TransportRouter {
    /// Binds the plaintext socket to `bind_addr` and, if given, the secure socket to
    /// `secure_bind_addr`. Datagrams larger than `mtu` are not sent.
    pub fn bind(
        bind_addr: SocketAddr,
        secure_bind_addr: Option<SocketAddr>,
        mtu: EndpointMtu,
    ) -> Result<TransportRouter, ContextCreationError> {
        let poll = Poll::new().map_err(|e| ContextCreationError::Bind(e.kind()))?;
        let mut plain = CoapUdpEndpoint::bind(bind_addr).map_err(|e| ContextCreationError::Bind(e.kind()))?;
        plain
            .register(poll.registry(), PLAIN_SOCKET)
            .map_err(|e| ContextCreationError::Bind(e.kind()))?;
        plain.set_default_mtu(mtu);
        let secure = match secure_bind_addr {
            Some(addr) => {
                let mut secure = CoapUdpEndpoint::bind(addr).map_err(|e| ContextCreationError::Bind(e.kind()))?;
                secure
                    .register(poll.registry(), SECURE_SOCKET)
                    .map_err(|e| ContextCreationError::Bind(e.kind()))?;
                secure.set_default_mtu(mtu);
                Some(secure)
            },
            None => None,
        };
        Ok(TransportRouter {
            poll,
            events: Events::with_capacity(8),
            plain,
            secure,
            dtls: None,
            keystore: KeystoreResolver::new(),
            pending: HashMap::new(),
            deferred: Vec::new(),
            all_sockets_drained: true,
            recv_buf: vec![0; RECV_BUFFER_SIZE],
        })
    }

    /// Installs the DTLS implementation used for secure endpoints.
    ///
    /// Only one backend may be set per router.
    pub fn set_dtls_backend<B: DtlsBackend + 'static>(&mut self, backend: B) -> Result<(), ContextConfigurationError> {
        if self.secure.is_none() {
            return Err(ContextConfigurationError::NoSecureSocket);
        }
        if self.dtls.is_some() {
            return Err(ContextConfigurationError::CryptoContextAlreadySet);
        }
        self.dtls = Some(Box::new(backend));
        Ok(())
    }

    pub fn keystore(&self) -> &KeystoreResolver {
        &self.keystore
    }

    /// Returns the keystore queried for PSK credentials during DTLS handshakes.
    pub fn keystore_mut(&mut self) -> &mut KeystoreResolver {
        &mut self.keystore
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.plain.local_addr()
    }

    pub fn secure_local_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.secure.as_ref().map(|secure| secure.local_addr())
    }

    /// Returns whether data can be sent to `ep` right away.
    ///
    /// Plaintext endpoints are always connected, secure endpoints only once the DTLS handshake
    /// has completed.
    pub fn is_connected(&self, ep: &CoapEndpoint) -> bool {
        if !ep.is_secure() {
            return true;
        }
        self.session_state(ep) == Some(DtlsSessionState::Connected)
    }

    /// Returns the DTLS session state for a secure endpoint.
    pub fn session_state(&self, ep: &CoapEndpoint) -> Option<DtlsSessionState> {
        self.dtls.as_ref()?.session_state(ep.socket_addr())
    }

    /// Starts a DTLS handshake with a secure endpoint unless a session exists or is being
    /// established. Does nothing for plaintext endpoints.
    pub fn connect(&mut self, ep: &CoapEndpoint) -> Result<(), TransportError> {
        if !ep.is_secure() {
            return Ok(());
        }
        if self.dtls.is_none() {
            return Err(TransportError::NoSecureContext);
        }
        match self.session_state(ep) {
            Some(DtlsSessionState::Handshake) | Some(DtlsSessionState::Connected) => return Ok(()),
            Some(DtlsSessionState::Closed) | None => {},
        }
        debug!("starting DTLS handshake with {}", ep);
        let peer = ep.socket_addr();
        self.run_backend(|backend, io| backend.connect(peer, io))
            .unwrap_or(Err(crate::error::DtlsAlert::InternalError))
            .map_err(TransportError::Dtls)
    }

    /// Closes the DTLS session with a secure endpoint, discarding data queued for it.
    pub fn disconnect(&mut self, ep: &CoapEndpoint) {
        if !ep.is_secure() {
            return;
        }
        let peer = ep.socket_addr();
        self.pending.remove(&peer);
        if self.session_state(ep).is_some() {
            self.run_backend(|backend, io| backend.close(peer, io));
        }
    }

    /// Sends `data` to `ep`.
    ///
    /// Data for a secure endpoint without established session is queued and a handshake is
    /// started. A datagram is queued at most once. Data larger than the endpoint MTU is dropped.
    /// Failures are logged and not reported.
    pub fn send(&mut self, ep: Option<&CoapEndpoint>, data: &[u8]) {
        let ep = match ep {
            Some(ep) => ep,
            None => {
                trace!("dropping {} bytes sent to null endpoint", data.len());
                return;
            },
        };
        let mtu = match (ep.is_secure(), self.secure.as_ref()) {
            (true, Some(secure)) => secure.mtu(),
            _ => self.plain.mtu(),
        };
        if data.len() > mtu {
            warn!("dropping {} bytes for {}, exceeds MTU of {}", data.len(), ep, mtu);
            return;
        }
        if !ep.is_secure() {
            trace!("sending {} bytes to {}", data.len(), ep);
            if let Err(e) = self.plain.send_to(data, ep.socket_addr()) {
                warn!("unable to send to {}: {}", ep, e);
            }
            return;
        }
        if self.dtls.is_none() {
            warn!("dropping data for {}, no DTLS context available", ep);
            return;
        }
        let peer = ep.socket_addr();
        if self.is_connected(ep) {
            if let Some(Err(alert)) = self.run_backend(|backend, io| backend.write(peer, data, io)) {
                warn!("DTLS write to {} failed: {:?}", ep, alert);
            }
            return;
        }
        let queue = self.pending.entry(peer).or_default();
        // Retransmissions of a message that is still queued.
        if queue.iter().any(|queued| queued.as_slice() == data) {
            trace!("{} bytes for {} already queued", data.len(), ep);
        } else {
            trace!("queueing {} bytes for {} until DTLS session is established", data.len(), ep);
            queue.push(data.to_vec());
        }
        if let Err(e) = self.connect(ep) {
            warn!("unable to connect to {}: {}", ep, e);
            self.pending.remove(&peer);
        }
    }

    /// Returns the next time the DTLS backend needs to be serviced.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.dtls.as_ref()?.next_timeout()
    }

    /// Waits up to `timeout` for inbound datagrams and returns everything that happened.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<TransportEvent>> {
        let timeout = if self.deferred.is_empty() {
            timeout
        } else {
            Some(Duration::ZERO)
        };
        // Sockets are read until they would block, so only wait for readiness once all of them
        // were drained.
        if self.all_sockets_drained {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {},
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }

        let plain_drained = self.drain_plain();
        let secure_drained = self.drain_secure();
        self.all_sockets_drained = plain_drained && secure_drained;

        let now = Instant::now();
        if self.next_timeout().map_or(false, |t| t <= now) {
            self.run_backend(|backend, io| backend.handle_timeout(now, io));
        }
        Ok(std::mem::take(&mut self.deferred))
    }

    /// Reads pending datagrams from the plaintext socket. Returns whether the socket is drained.
    fn drain_plain(&mut self) -> bool {
        for _ in 0..MAX_READS_PER_POLL {
            match self.plain.recv_from(&mut self.recv_buf) {
                Ok((n, addr)) => {
                    trace!("received {} bytes from {}", n, addr);
                    self.deferred.push(TransportEvent::Datagram(
                        CoapEndpoint::from_socket_addr(addr, false),
                        self.recv_buf[..n].to_vec(),
                    ));
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) => {
                    warn!("error while receiving on plaintext socket: {}", e);
                    return true;
                },
            }
        }
        false
    }

    fn drain_secure(&mut self) -> bool {
        for _ in 0..MAX_READS_PER_POLL {
            let Some(secure) = self.secure.as_ref() else {
                return true;
            };
            let (n, addr) = match secure.recv_from(&mut self.recv_buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return true,
                Err(e) => {
                    warn!("error while receiving on secure socket: {}", e);
                    return true;
                },
            };
            trace!("received {} bytes of DTLS records from {}", n, addr);
            let record = self.recv_buf[..n].to_vec();
            if self
                .run_backend(|backend, io| backend.handle_record(addr, &record, io))
                .is_none()
            {
                trace!("dropping DTLS record from {}, no DTLS context available", addr);
            }
        }
        false
    }

    /// Runs `f` on the DTLS backend and processes its output. Returns `None` if no backend is set.
    fn run_backend<T>(&mut self, f: impl FnOnce(&mut dyn DtlsBackend, &mut DtlsIo<'_>) -> T) -> Option<T> {
        let backend = self.dtls.as_mut()?;
        let mut io = DtlsIo::new(&self.keystore);
        let result = f(backend.as_mut(), &mut io);
        let output = io.into_output();
        self.process_dtls_output(output);
        Some(result)
    }

    fn process_dtls_output(&mut self, output: DtlsOutput) {
        for (peer, record) in output.records {
            let Some(secure) = self.secure.as_ref() else {
                break;
            };
            if let Err(e) = secure.send_to(&record, peer) {
                warn!("unable to send DTLS record to {}: {}", peer, e);
            }
        }
        for (peer, data) in output.app_data {
            self.deferred
                .push(TransportEvent::Datagram(CoapEndpoint::from_socket_addr(peer, true), data));
        }
        for (peer, event) in output.events {
            let ep = CoapEndpoint::from_socket_addr(peer, true);
            debug!("DTLS event for {}: {:?}", ep, event);
            self.deferred.push(TransportEvent::Dtls(ep, event));
            match event {
                DtlsEvent::Connected => {
                    for data in self.pending.remove(&peer).unwrap_or_default() {
                        if let Some(Err(alert)) = self.run_backend(|backend, io| backend.write(peer, &data, io)) {
                            warn!("DTLS write to {} failed: {:?}", ep, alert);
                        }
                    }
                },
                DtlsEvent::Closed | DtlsEvent::Alert(_) => {
                    if let Some(dropped) = self.pending.remove(&peer) {
                        debug!("dropping {} queued messages for {}", dropped.len(), ep);
                    }
                },
            }
        }
    }
}
