// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * lib.rs - Main library entry point for the CoAP engine.
 */

//! A RESTful CoAP engine for constrained nodes.
//!
//! The engine serves local resources, routes messages over plaintext UDP and DTLS, retrieves
//! remote representations block by block and resolves pre-shared keys for DTLS handshakes.
//!
//! # Feature support
//! coap-engine currently supports the following feature set:
//! - [x] Basic CoAP client
//! - [x] Basic CoAP server
//! - [ ] Transports:
//!     - [x] UDP
//!     - [x] DTLS (through a pluggable [DtlsBackend](transport::DtlsBackend))
//!         - [x] DTLS using PSK
//!         - [ ] DTLS using PKI/RPK
//!     - [ ] TCP
//! - [x] Blockwise Transfer
//!     - [x] Receiving large messages (Block2, client side)
//!     - [x] Sending large messages (Block2, server side)
//!     - [ ] Block1
//! - [ ] Resource observation
//!     - [ ] Observing resources as a client
//!     - [x] Hook for observable resources on the server side
//!
//! # Using cryptography
//! The engine does not implement DTLS itself. A DTLS implementation is plugged in as a
//! [DtlsBackend](transport::DtlsBackend), which obtains its pre-shared keys from the context's
//! [KeystoreResolver](crypto::psk::KeystoreResolver). See the documentation of the [`crypto`]
//! module for more information.
//!
//! # Examples
//!
//! ## Client
//! This example requests `coap://[::1]:5683/hello_world` and collects the payload of all blocks.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use coap_engine::{
//!     CoapConfig, CoapContext,
//!     blocking::{BlockResponseHandler, BlockingRequestFailure},
//!     message::{CoapMessageCommon, CoapRequest, CoapResponse},
//!     protocol::{CoapMessageType, CoapRequestCode},
//!     types::CoapEndpoint,
//! };
//!
//! #[derive(Default)]
//! struct Collector {
//!     body: Vec<u8>,
//! }
//!
//! impl BlockResponseHandler for Collector {
//!     fn on_block(&mut self, response: &CoapResponse) {
//!         self.body.extend_from_slice(response.data().unwrap_or_default());
//!     }
//!
//!     fn on_finished(&mut self, outcome: Result<(), BlockingRequestFailure>) {
//!         println!("{:?}: {}", outcome, String::from_utf8_lossy(&self.body));
//!     }
//! }
//!
//! let mut context = CoapContext::new(CoapConfig::default()).expect("Failed to create CoAP context");
//! let endpoint: CoapEndpoint = "coap://[::1]:5683".parse().unwrap();
//!
//! let mut request = CoapRequest::new(CoapMessageType::Con, CoapRequestCode::Get).unwrap();
//! request.set_path("hello_world");
//! context.send_request(&endpoint, request, Collector::default()).expect("Unable to send request");
//! while context.has_open_requests() {
//!     context.do_io(Some(Duration::from_secs(10))).expect("error during IO");
//! }
//! ```
//!
//! ## Server
//! This example runs a simple CoAP server that provides a resource under the URI path
//! `/hello_world` with `Hello World!` as the response payload.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use coap_engine::{
//!     CoapConfig, CoapContext, CoapRequestHandler, CoapResource,
//!     message::{BlockCursor, CoapRequest, CoapResponse},
//!     protocol::{CoapRequestCode, CoapResponseCode},
//!     resource::ResourceFlags,
//! };
//!
//! let config = CoapConfig::builder()
//!     .bind_addr("[::1]:5683".parse().unwrap())
//!     .build()
//!     .unwrap();
//! let mut context = CoapContext::new(config).expect("Failed to create CoAP context");
//!
//! // The provided CoapResponse already carries the token and message ID of the request.
//! // The payload is written into the block cursor, which is sized to one block.
//! fn hello_world(_: &mut (), _: &CoapRequest, response: &mut CoapResponse, cursor: &mut BlockCursor<'_>) {
//!     cursor.write_bytes(b"Hello World!");
//!     response.set_response_code(CoapResponseCode::Content);
//! }
//!
//! // The second argument can be used to provide any kind of user-specific data, which will
//! // then be passed to the handler function.
//! let mut resource = CoapResource::new(ResourceFlags::empty(), ());
//! resource.set_method_handler(CoapRequestCode::Get, Some(CoapRequestHandler::new(hello_world)));
//!
//! context.add_resource("hello_world", resource).unwrap();
//! context.init();
//! loop {
//!     // process IO in a loop...
//!     if let Err(e) = context.do_io(Some(Duration::from_secs(1))) {
//!         break;
//!     }
//!     // ...until we want to shut down.
//! }
//! // Properly shut down, completing outstanding client requests.
//! context.shutdown(Some(Duration::from_secs(0))).unwrap();
//! ```

pub use config::{CoapConfig, CoapConfigBuilder};
pub use context::CoapContext;
pub use event::CoapEventHandler;
pub use resource::{CoapRequestHandler, CoapResource};

pub mod blocking;
pub mod config;
mod context;
pub mod crypto;
pub mod error;
mod event;
pub mod message;
pub mod periodic;
pub mod prng;
pub mod protocol;
pub mod registry;
pub mod resource;
pub mod transaction;
pub mod transport;
pub mod types;
