// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/dtls_psk_client_server_test.rs - Tests for DTLS clients+servers with PSKs.
 */

use std::{cell::RefCell, net::SocketAddr, rc::Rc, time::Duration};

use coap_engine::{
    blocking::BlockingRequestFailure,
    crypto::psk::{PskKey, SecurityObject, SecurityObjectProvider, StaticPskProvider},
    error::{ContextConfigurationError, DtlsAlert, TransportError},
    message::CoapMessageCommon,
    protocol::CoapResponseCode,
    types::CoapEndpoint,
    CoapConfig, CoapContext, CoapEventHandler,
};

use common::dtls::TestPskBackend;

mod common;

#[derive(Debug, Clone, Default)]
struct SessionLog(Rc<RefCell<Vec<String>>>);

impl CoapEventHandler for SessionLog {
    fn handle_dtls_connected(&mut self, endpoint: &CoapEndpoint) {
        self.0.borrow_mut().push(format!("connected {}", endpoint));
    }

    fn handle_dtls_closed(&mut self, endpoint: &CoapEndpoint) {
        self.0.borrow_mut().push(format!("closed {}", endpoint));
    }

    fn handle_dtls_error(&mut self, endpoint: &CoapEndpoint, alert: DtlsAlert) {
        self.0.borrow_mut().push(format!("alert {:?} {}", alert, endpoint));
    }
}

/// Spawns a server accepting the PSK identity `node-1` on a secure socket, returning the server
/// and its secure address.
fn spawn_secure_server() -> (common::TestServer, SocketAddr) {
    let plain_address = common::get_unused_server_addr();
    let secure_address = common::get_unused_server_addr();
    let config = CoapConfig::builder()
        .bind_addr(plain_address)
        .secure_bind_addr(secure_address)
        .build()
        .unwrap();
    let server = common::spawn_test_server(config, |context| {
        context.set_dtls_backend(TestPskBackend::default()).unwrap();
        context
            .keystore_mut()
            .register(StaticPskProvider::new(vec![PskKey::new(Some("node-1"), "sekrit")]));
    });
    (server, secure_address)
}

fn secure_client(server: &CoapEndpoint, identity: &str, key: &str) -> (CoapContext, SessionLog) {
    let mut context = CoapContext::new(common::client_config(true)).unwrap();
    context.set_dtls_backend(TestPskBackend::default()).unwrap();
    let mut object = SecurityObject::new();
    object.add_server(&server.to_string(), identity.as_bytes(), key.as_bytes());
    context.keystore_mut().register(SecurityObjectProvider::new(object));
    let log = SessionLog::default();
    context.set_event_handler(Some(log.clone()));
    (context, log)
}

#[test]
pub fn dtls_psk_client_server_request() {
    let (server, secure_address) = spawn_secure_server();
    let endpoint = CoapEndpoint::from_socket_addr(secure_address, true);
    let (mut context, log) = secure_client(&endpoint, "node-1", "sekrit");

    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("test1"));
    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.blocks[0].response_code(), CoapResponseCode::Content);
    assert_eq!(result.body(), b"Hello World!");
    assert!(context.is_connected(&endpoint));
    assert_eq!(*log.0.borrow(), vec![format!("connected {}", endpoint)]);

    // The established session carries block-wise transfers as well.
    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("large"));
    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.body(), common::LARGE_PAYLOAD);

    context.disconnect(&endpoint);
    assert!(!context.is_connected(&endpoint));
    context.do_io(Some(Duration::ZERO)).unwrap();
    assert_eq!(log.0.borrow().last(), Some(&format!("closed {}", endpoint)));
    server.stop();
}

#[test]
pub fn dtls_psk_unknown_identity_fails() {
    let (server, secure_address) = spawn_secure_server();
    let endpoint = CoapEndpoint::from_socket_addr(secure_address, true);
    let (mut context, log) = secure_client(&endpoint, "intruder", "sekrit");

    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("test1"));
    assert!(result.blocks.is_empty());
    assert_eq!(result.outcome, Some(Err(BlockingRequestFailure::NoResponse)));
    assert!(!context.is_connected(&endpoint));
    assert!(log
        .0
        .borrow()
        .contains(&format!("alert {:?} {}", DtlsAlert::IllegalParameter, endpoint)));
    server.stop();
}

#[test]
pub fn secure_endpoint_requires_dtls_backend() {
    common::init_logging();
    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint: CoapEndpoint = "coaps://[127.0.0.1]:5684".parse().unwrap();
    assert!(matches!(context.connect(&endpoint), Err(TransportError::NoSecureContext)));
    assert!(!context.is_connected(&endpoint));
    assert_eq!(
        context.set_dtls_backend(TestPskBackend::default()),
        Err(ContextConfigurationError::NoSecureSocket)
    );

    // Plaintext endpoints need no session.
    let plain: CoapEndpoint = "coap://[127.0.0.1]:5683".parse().unwrap();
    assert!(context.connect(&plain).is_ok());
    assert!(context.is_connected(&plain));
}
