// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * transport/dtls.rs - Interface between the transport router and a DTLS implementation.
 */

//! Interface between the transport router and a DTLS implementation.
//!
//! The engine does not implement the DTLS handshake or record layer itself. A [DtlsBackend]
//! encapsulates both and talks to the router exclusively through a [DtlsIo] handle, which
//! collects outgoing records, decrypted application data and session events, and answers PSK
//! queries from the router's [KeystoreResolver].

use std::{fmt::Debug, net::SocketAddr, time::Instant};

use log::debug;

use crate::{
    crypto::psk::{CredentialEntry, KeystoreResolver},
    error::DtlsAlert,
    types::CoapEndpoint,
};

/// State of the DTLS session with a peer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DtlsSessionState {
    Handshake,
    Connected,
    Closed,
}

/// Session events reported by a [DtlsBackend].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DtlsEvent {
    Connected,
    Closed,
    /// The session failed with a fatal alert.
    Alert(DtlsAlert),
}

/// A DTLS implementation driven by the transport router.
///
/// All methods are called from the event loop. Records to send, decrypted data and events are
/// reported through the supplied [DtlsIo].
pub trait DtlsBackend: Debug {
    /// Starts a client handshake with `peer`.
    fn connect(&mut self, peer: SocketAddr, io: &mut DtlsIo<'_>) -> Result<(), DtlsAlert>;
    /// Processes a datagram received from `peer` on the secure socket.
    fn handle_record(&mut self, peer: SocketAddr, record: &[u8], io: &mut DtlsIo<'_>);
    /// Encrypts application data for an established session.
    fn write(&mut self, peer: SocketAddr, data: &[u8], io: &mut DtlsIo<'_>) -> Result<(), DtlsAlert>;
    /// Closes the session with `peer`.
    fn close(&mut self, peer: SocketAddr, io: &mut DtlsIo<'_>);
    /// Returns the session state for `peer`, or `None` if there is no session.
    fn session_state(&self, peer: SocketAddr) -> Option<DtlsSessionState>;
    /// Returns the next point in time at which [handle_timeout()](DtlsBackend::handle_timeout())
    /// must be called, e.g. for handshake retransmissions.
    fn next_timeout(&self) -> Option<Instant>;
    fn handle_timeout(&mut self, now: Instant, io: &mut DtlsIo<'_>);
}

/// Output of a batch of [DtlsBackend] calls.
#[derive(Debug, Default)]
pub(crate) struct DtlsOutput {
    pub records: Vec<(SocketAddr, Vec<u8>)>,
    pub app_data: Vec<(SocketAddr, Vec<u8>)>,
    pub events: Vec<(SocketAddr, DtlsEvent)>,
}

/// Handle through which a [DtlsBackend] interacts with the router.
#[derive(Debug)]
pub struct DtlsIo<'a> {
    keystore: &'a KeystoreResolver,
    output: DtlsOutput,
}

impl<'a> DtlsIo<'a> {
    pub fn new(keystore: &'a KeystoreResolver) -> DtlsIo<'a> {
        DtlsIo {
            keystore,
            output: DtlsOutput::default(),
        }
    }

    /// Queues a record for transmission to `peer` on the secure socket.
    pub fn send_record(&mut self, peer: SocketAddr, record: Vec<u8>) {
        self.output.records.push((peer, record));
    }

    /// Hands decrypted application data from `peer` to the engine.
    pub fn deliver(&mut self, peer: SocketAddr, data: Vec<u8>) {
        self.output.app_data.push((peer, data));
    }

    pub fn event(&mut self, peer: SocketAddr, event: DtlsEvent) {
        self.output.events.push((peer, event));
    }

    /// Resolves the PSK identity to present to `peer`.
    ///
    /// Returns `Ok(None)` if no identity is known, which should abort the handshake without an
    /// alert, and an [InternalError](DtlsAlert::InternalError) alert if the identity is longer
    /// than `max_len`.
    pub fn psk_identity(
        &self,
        peer: SocketAddr,
        hint: Option<&[u8]>,
        max_len: usize,
    ) -> Result<Option<Box<[u8]>>, DtlsAlert> {
        let endpoint = CoapEndpoint::from_socket_addr(peer, true);
        if let Some(hint) = hint.filter(|h| !h.is_empty()) {
            debug!("got psk_identity_hint: '{}'", String::from_utf8_lossy(hint));
        }
        let mut entry = CredentialEntry::identity_query(hint);
        self.keystore.get_psk_info(&endpoint, &mut entry);
        let identity = match entry.identity().filter(|id| !id.is_empty()) {
            Some(identity) => identity,
            None => return Ok(None),
        };
        if identity.len() > max_len {
            debug!("cannot set psk_identity -- buffer too small");
            return Err(DtlsAlert::InternalError);
        }
        Ok(Some(identity.into()))
    }

    /// Resolves the key belonging to the PSK `identity` presented by `peer`.
    ///
    /// Returns an [IllegalParameter](DtlsAlert::IllegalParameter) alert if no key is known for
    /// the identity and an [InternalError](DtlsAlert::InternalError) alert if the key is longer
    /// than `max_len`.
    pub fn psk_key(&self, peer: SocketAddr, identity: &[u8], max_len: usize) -> Result<Box<[u8]>, DtlsAlert> {
        let endpoint = CoapEndpoint::from_socket_addr(peer, true);
        let mut entry = CredentialEntry::key_query(identity);
        self.keystore.get_psk_info(&endpoint, &mut entry);
        let key = match entry.key().filter(|key| !key.is_empty()) {
            Some(key) => key,
            None => {
                debug!("PSK for unknown id requested, exiting");
                return Err(DtlsAlert::IllegalParameter);
            },
        };
        if key.len() > max_len {
            debug!("cannot set psk -- buffer too small");
            return Err(DtlsAlert::InternalError);
        }
        Ok(key.into())
    }

    pub(crate) fn into_output(self) -> DtlsOutput {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::psk::{PskKey, StaticPskProvider};

    fn peer() -> SocketAddr {
        "[::1]:5684".parse().unwrap()
    }

    #[test]
    fn default_keystore_answers_queries() {
        let keystore = KeystoreResolver::new();
        let io = DtlsIo::new(&keystore);
        assert_eq!(
            io.psk_identity(peer(), None, 32).unwrap().as_deref(),
            Some(&b"Client_identity"[..])
        );
        assert_eq!(io.psk_key(peer(), b"Client_identity", 32).unwrap().as_ref(), b"secretPSK");
    }

    #[test]
    fn length_limits_and_unknown_identities_raise_alerts() {
        let keystore = KeystoreResolver::new();
        let io = DtlsIo::new(&keystore);
        assert_eq!(io.psk_identity(peer(), None, 4), Err(DtlsAlert::InternalError));
        assert_eq!(io.psk_key(peer(), b"Client_identity", 4), Err(DtlsAlert::InternalError));
        assert_eq!(io.psk_key(peer(), b"someone_else", 32), Err(DtlsAlert::IllegalParameter));
    }

    #[test]
    fn missing_identity_is_not_an_alert() {
        let mut keystore = KeystoreResolver::new();
        keystore.register(StaticPskProvider::new(vec![PskKey::new(None::<Vec<u8>>, "anonymous")]));
        let io = DtlsIo::new(&keystore);
        assert_eq!(io.psk_identity(peer(), Some(b"hint"), 32), Ok(None));
    }
}
