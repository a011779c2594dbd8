// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/common/dtls.rs - Toy PSK handshake backend for integration tests.
 */

//! A stand-in for a real DTLS implementation.
//!
//! It provides no security at all, but resolves credentials exactly like a PSK cipher suite
//! would: the client asks for the identity to present and the key belonging to it, the server
//! asks for the key of the identity presented by the client and both compare keys. Records are
//! a single type byte followed by the content:
//!
//! - `0x16 identity`: client hello carrying the PSK identity,
//! - `0x14 key`: server finished carrying the key (compared by the client),
//! - `0x15 alert`: fatal alert,
//! - `0x17 data`: application data.

use std::{cell::Cell, collections::HashMap, net::SocketAddr, rc::Rc, time::Instant};

use coap_engine::{
    error::DtlsAlert,
    transport::{DtlsBackend, DtlsEvent, DtlsIo, DtlsSessionState},
};

const CLIENT_HELLO: u8 = 0x16;
const FINISHED: u8 = 0x14;
const ALERT: u8 = 0x15;
const APPLICATION_DATA: u8 = 0x17;

const MAX_PSK_LEN: usize = 64;

#[derive(Debug)]
struct Session {
    state: DtlsSessionState,
    key: Box<[u8]>,
}

#[derive(Debug, Default)]
pub(crate) struct TestPskBackend {
    sessions: HashMap<SocketAddr, Session>,
    handshakes: Rc<Cell<usize>>,
}

fn alert_code(alert: DtlsAlert) -> u8 {
    match alert {
        DtlsAlert::InternalError => 80,
        DtlsAlert::IllegalParameter => 47,
        DtlsAlert::HandshakeFailure => 40,
        DtlsAlert::DecryptError => 51,
    }
}

fn alert_from_code(code: u8) -> DtlsAlert {
    match code {
        47 => DtlsAlert::IllegalParameter,
        40 => DtlsAlert::HandshakeFailure,
        51 => DtlsAlert::DecryptError,
        _ => DtlsAlert::InternalError,
    }
}

impl TestPskBackend {
    /// Returns a counter of the client handshakes started by this backend.
    pub(crate) fn handshake_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.handshakes)
    }

    fn fail(&mut self, peer: SocketAddr, alert: DtlsAlert, io: &mut DtlsIo<'_>) {
        io.send_record(peer, vec![ALERT, alert_code(alert)]);
        self.sessions.remove(&peer);
        io.event(peer, DtlsEvent::Alert(alert));
    }
}

impl DtlsBackend for TestPskBackend {
    fn connect(&mut self, peer: SocketAddr, io: &mut DtlsIo<'_>) -> Result<(), DtlsAlert> {
        self.handshakes.set(self.handshakes.get() + 1);
        let identity = io
            .psk_identity(peer, None, MAX_PSK_LEN)?
            .ok_or(DtlsAlert::HandshakeFailure)?;
        let key = io.psk_key(peer, &identity, MAX_PSK_LEN)?;
        self.sessions.insert(
            peer,
            Session {
                state: DtlsSessionState::Handshake,
                key,
            },
        );
        let mut hello = vec![CLIENT_HELLO];
        hello.extend_from_slice(&identity);
        io.send_record(peer, hello);
        Ok(())
    }

    fn handle_record(&mut self, peer: SocketAddr, record: &[u8], io: &mut DtlsIo<'_>) {
        let Some((&content_type, content)) = record.split_first() else {
            return;
        };
        match content_type {
            CLIENT_HELLO => match io.psk_key(peer, content, MAX_PSK_LEN) {
                Ok(key) => {
                    let mut finished = vec![FINISHED];
                    finished.extend_from_slice(&key);
                    io.send_record(peer, finished);
                    self.sessions.insert(
                        peer,
                        Session {
                            state: DtlsSessionState::Connected,
                            key,
                        },
                    );
                    io.event(peer, DtlsEvent::Connected);
                },
                Err(alert) => self.fail(peer, alert, io),
            },
            FINISHED => {
                let key_matches = match self.sessions.get_mut(&peer) {
                    Some(session) if session.state == DtlsSessionState::Handshake => {
                        let key_matches = &session.key[..] == content;
                        if key_matches {
                            session.state = DtlsSessionState::Connected;
                        }
                        Some(key_matches)
                    },
                    _ => None,
                };
                match key_matches {
                    Some(true) => io.event(peer, DtlsEvent::Connected),
                    Some(false) => self.fail(peer, DtlsAlert::DecryptError, io),
                    None => {},
                }
            },
            ALERT => {
                if self.sessions.remove(&peer).is_some() {
                    let alert = alert_from_code(content.first().copied().unwrap_or_default());
                    io.event(peer, DtlsEvent::Alert(alert));
                }
            },
            APPLICATION_DATA => {
                if self.session_state(peer) == Some(DtlsSessionState::Connected) {
                    io.deliver(peer, content.to_vec());
                }
            },
            _ => {},
        }
    }

    fn write(&mut self, peer: SocketAddr, data: &[u8], io: &mut DtlsIo<'_>) -> Result<(), DtlsAlert> {
        if self.session_state(peer) != Some(DtlsSessionState::Connected) {
            return Err(DtlsAlert::InternalError);
        }
        let mut record = vec![APPLICATION_DATA];
        record.extend_from_slice(data);
        io.send_record(peer, record);
        Ok(())
    }

    fn close(&mut self, peer: SocketAddr, io: &mut DtlsIo<'_>) {
        if self.sessions.remove(&peer).is_some() {
            io.event(peer, DtlsEvent::Closed);
        }
    }

    fn session_state(&self, peer: SocketAddr) -> Option<DtlsSessionState> {
        self.sessions.get(&peer).map(|s| s.state)
    }

    fn next_timeout(&self) -> Option<Instant> {
        None
    }

    fn handle_timeout(&mut self, _now: Instant, _io: &mut DtlsIo<'_>) {}
}
