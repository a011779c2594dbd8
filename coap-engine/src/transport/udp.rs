// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * transport/udp.rs - Non-blocking UDP endpoints.
 */

use std::{io, net::SocketAddr};

use mio::{net::UdpSocket, Interest, Registry, Token};

use crate::transport::{EndpointCommon, EndpointMtu};

/// Largest datagram the engine sends by default ([RFC 7252, Section 4.6](https://datatracker.ietf.org/doc/html/rfc7252#section-4.6)).
pub const COAP_DEFAULT_MTU: EndpointMtu = 1152;

/// A bound, non-blocking UDP socket.
#[derive(Debug)]
pub struct CoapUdpEndpoint {
    socket: UdpSocket,
    mtu: EndpointMtu,
}

impl CoapUdpEndpoint {
    /// Binds a new endpoint to `addr`.
    pub fn bind(addr: SocketAddr) -> io::Result<CoapUdpEndpoint> {
        Ok(CoapUdpEndpoint {
            socket: UdpSocket::bind(addr)?,
            mtu: COAP_DEFAULT_MTU,
        })
    }

    /// Registers this endpoint for read readiness with `registry`.
    pub(crate) fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.socket, token, Interest::READABLE)
    }

    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    /// Receives a single datagram, returning [io::ErrorKind::WouldBlock] once the socket is drained.
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }
}

impl EndpointCommon for CoapUdpEndpoint {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn mtu(&self) -> EndpointMtu {
        self.mtu
    }

    fn set_default_mtu(&mut self, mtu: EndpointMtu) {
        self.mtu = mtu;
    }
}
