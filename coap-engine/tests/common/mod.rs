// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/common/mod.rs - Common code for integration tests.
 */

#![allow(dead_code)]

pub mod dtls;

use std::{
    cell::RefCell,
    net::{SocketAddr, UdpSocket},
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use coap_engine::{
    blocking::{BlockResponseHandler, BlockingRequestFailure},
    error::TransactionError,
    message::{BlockCursor, CoapMessage, CoapMessageCommon, CoapRequest, CoapResponse},
    protocol::{CoapMessageType, CoapRequestCode},
    resource::ResourceFlags,
    transaction::ReliableMessageLayer,
    types::{CoapEndpoint, CoapMessageId},
    CoapConfig, CoapContext, CoapResource,
};

/// Representation served by the `large` resource of the test server.
pub(crate) const LARGE_PAYLOAD: &[u8] = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod tempor \
incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud exercitation ullamco.";

pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn get_unused_server_addr() -> SocketAddr {
    // This will give us a SocketAddress with a port in the local port range automatically
    // assigned by the operating system.
    // Because the UdpSocket goes out of scope, the port will be free for usage by the engine.
    // It is assumed here that after unbinding the temporary socket, the OS will not reassign
    // this port until we bind it again.
    UdpSocket::bind("127.0.0.1:0")
        .expect("Failed to bind server socket")
        .local_addr()
        .expect("Failed to get server socket address")
}

/// Configuration for client contexts, bound to ephemeral ports and with short timeouts.
pub(crate) fn client_config(secure: bool) -> CoapConfig {
    let mut builder = CoapConfig::builder()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .ack_timeout(Duration::from_millis(200))
        .max_retransmit(2);
    if secure {
        builder = builder.secure_bind_addr("127.0.0.1:0".parse().unwrap());
    }
    builder.build().unwrap()
}

/// Handle of a test server running in its own thread.
pub(crate) struct TestServer {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl TestServer {
    /// Stops the server and waits for its thread, propagating panics.
    pub(crate) fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Err(e) = self.handle.join() {
            std::panic::resume_unwind(e);
        }
    }
}

/// Spawns a test server in a new thread and waits for context_configurator to complete before
/// returning.
/// As the server binds its sockets before the configurator is called, this can be used to spawn a
/// test server and wait for it to be ready to accept requests before returning.
pub(crate) fn spawn_test_server<F: FnOnce(&mut CoapContext) + Send + 'static>(
    config: CoapConfig,
    context_configurator: F,
) -> TestServer {
    let ready_condition = Arc::new((Mutex::new(false), Condvar::new()));
    let ready_condition2 = Arc::clone(&ready_condition);
    let stop = Arc::new(AtomicBool::new(false));
    let stop2 = Arc::clone(&stop);

    let server_handle = std::thread::Builder::new()
        .name(String::from("test server"))
        .spawn(move || {
            let (ready_var, ready_cond) = &*ready_condition2;
            run_test_server(config, stop2, |context| {
                context_configurator(context);
                let mut ready_var = ready_var.lock().expect("ready condition mutex is poisoned");
                *ready_var = true;
                ready_cond.notify_all();
            });
        })
        .expect("unable to spawn test server thread");

    let (ready_var, ready_cond) = &*ready_condition;
    {
        let (_guard, timeout_result) = ready_cond
            .wait_timeout_while(
                ready_var.lock().expect("ready condition mutex is poisoned"),
                Duration::from_secs(10),
                |ready| !*ready,
            )
            .expect("ready condition mutex is poisoned");
        if timeout_result.timed_out() && server_handle.is_finished() {
            if let Err(e) = server_handle.join() {
                std::panic::resume_unwind(e);
            }
            panic!("Test server thread is dead and has not reported readiness after 10 seconds, but has also not panicked.")
        }

        if timeout_result.timed_out() {
            panic!("Test server thread has not reported readiness after 10 seconds, but has also not died (deadlock?).")
        }
    }
    TestServer {
        handle: server_handle,
        stop,
    }
}

fn hello_world(_: &mut (), _: &CoapRequest, _: &mut CoapResponse, cursor: &mut BlockCursor<'_>) {
    cursor.write_bytes(b"Hello World!");
}

fn large(_: &mut (), _: &CoapRequest, _: &mut CoapResponse, cursor: &mut BlockCursor<'_>) {
    cursor.write_block_of(LARGE_PAYLOAD);
}

/// Configures and runs a test server in the current thread until `stop` is set.
///
/// The server provides `test1` (responding with `Hello World!`) and `large` (serving
/// [LARGE_PAYLOAD] block-wise).
pub(crate) fn run_test_server<F: FnOnce(&mut CoapContext)>(
    config: CoapConfig,
    stop: Arc<AtomicBool>,
    context_configurator: F,
) {
    init_logging();
    let mut context = CoapContext::new(config).unwrap();

    let mut test1 = CoapResource::new(ResourceFlags::empty(), ());
    test1.set_method_handler(CoapRequestCode::Get, Some(hello_world));
    context.add_resource("test1", test1).unwrap();
    let mut large_resource = CoapResource::new(ResourceFlags::empty(), ());
    large_resource.set_method_handler(CoapRequestCode::Get, Some(large));
    context.add_resource("large", large_resource).unwrap();
    context.init();

    context_configurator(&mut context);
    let started = Instant::now();
    while !stop.load(Ordering::Relaxed) {
        assert!(
            started.elapsed() < Duration::from_secs(30),
            "test server was not stopped within 30 seconds"
        );
        context.do_io(Some(Duration::from_millis(50))).unwrap();
    }
    context.shutdown(Some(Duration::from_secs(0))).unwrap();
}

pub(crate) fn gen_test_request(path: &str) -> CoapRequest {
    let mut request = CoapRequest::new(CoapMessageType::Con, CoapRequestCode::Get).unwrap();
    request.set_path(path);
    request
}

/// Collected blocks and outcome of a client request.
#[derive(Debug, Default)]
pub(crate) struct CollectedResponse {
    pub blocks: Vec<CoapResponse>,
    pub outcome: Option<Result<(), BlockingRequestFailure>>,
}

impl CollectedResponse {
    pub(crate) fn body(&self) -> Vec<u8> {
        self.blocks
            .iter()
            .flat_map(|b| b.data().unwrap_or_default().iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Collector(pub Rc<RefCell<CollectedResponse>>);

impl BlockResponseHandler for Collector {
    fn on_block(&mut self, response: &CoapResponse) {
        self.0.borrow_mut().blocks.push(response.clone());
    }

    fn on_finished(&mut self, outcome: Result<(), BlockingRequestFailure>) {
        let previous = self.0.borrow_mut().outcome.replace(outcome);
        assert!(previous.is_none(), "on_finished called twice");
    }
}

/// Sends `request` and runs the client context until the request terminates.
pub(crate) fn perform_request(
    context: &mut CoapContext,
    endpoint: &CoapEndpoint,
    request: CoapRequest,
) -> CollectedResponse {
    let collector = Collector::default();
    context.send_request(endpoint, request, collector.clone()).unwrap();
    let started = Instant::now();
    while context.has_open_requests() {
        assert!(
            started.elapsed() < Duration::from_secs(20),
            "client request did not terminate within 20 seconds"
        );
        context.do_io(Some(Duration::from_millis(100))).unwrap();
    }
    collector.0.take()
}

/// In-memory [ReliableMessageLayer] recording submitted requests.
#[derive(Debug)]
pub(crate) struct SimulatedLayer {
    next_mid: CoapMessageId,
    next_handle: u32,
    pub capacity: usize,
    pub open: Vec<(u32, CoapMessageId, CoapEndpoint)>,
    pub submitted: Vec<(u32, CoapMessage)>,
}

impl SimulatedLayer {
    pub(crate) fn new(capacity: usize) -> SimulatedLayer {
        SimulatedLayer {
            next_mid: 100,
            next_handle: 0,
            capacity,
            open: Vec::new(),
            submitted: Vec::new(),
        }
    }

    /// Returns the handle and decoded request of the latest submission, closing its transaction.
    pub(crate) fn take_last(&mut self) -> (u32, CoapRequest) {
        let (handle, message) = self.submitted.last().cloned().expect("no request submitted");
        self.open.retain(|(h, _, _)| *h != handle);
        (handle, CoapRequest::from_message(message).unwrap())
    }
}

impl ReliableMessageLayer for SimulatedLayer {
    type Handle = u32;

    fn next_message_id(&mut self) -> CoapMessageId {
        let mid = self.next_mid;
        self.next_mid = self.next_mid.wrapping_add(1);
        mid
    }

    fn new_transaction(&mut self, mid: CoapMessageId, endpoint: &CoapEndpoint) -> Option<u32> {
        if self.open.len() >= self.capacity {
            return None;
        }
        self.next_handle += 1;
        self.open.push((self.next_handle, mid, *endpoint));
        Some(self.next_handle)
    }

    fn submit(&mut self, handle: u32, packet: Vec<u8>) -> Result<(), TransactionError> {
        if !self.open.iter().any(|(h, _, _)| *h == handle) {
            return Err(TransactionError::UnknownHandle);
        }
        self.submitted.push((handle, CoapMessage::decode(&packet).unwrap()));
        Ok(())
    }
}
