// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/udp_client_server_test.rs - Tests for UDP clients+servers.
 */

use std::{net::UdpSocket, time::Duration};

use coap_engine::{
    blocking::BlockingRequestFailure,
    message::{BlockCursor, CoapMessage, CoapMessageCommon, CoapRequest, CoapResponse},
    protocol::{CoapMessageType, CoapRequestCode, CoapResponseCode},
    resource::ResourceFlags,
    types::CoapEndpoint,
    CoapConfig, CoapContext, CoapResource,
};

mod common;

fn server_config(addr: std::net::SocketAddr) -> CoapConfig {
    CoapConfig::builder().bind_addr(addr).build().unwrap()
}

fn sliced(_: &mut (), _: &CoapRequest, response: &mut CoapResponse, _: &mut BlockCursor<'_>) {
    response.set_data(Some(common::LARGE_PAYLOAD));
}

#[test]
pub fn basic_client_server_request() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |_| {});

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(server_address, false);
    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("test1"));

    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.blocks.len(), 1);
    assert_eq!(result.blocks[0].response_code(), CoapResponseCode::Content);
    assert_eq!(result.blocks[0].type_(), CoapMessageType::Ack);
    assert_eq!(result.body(), b"Hello World!");
    server.stop();
}

#[test]
pub fn non_confirmable_request() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |_| {});

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(server_address, false);
    let mut request = CoapRequest::new(CoapMessageType::Non, CoapRequestCode::Get).unwrap();
    request.set_path("test1");
    let result = common::perform_request(&mut context, &endpoint, request);

    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.blocks[0].type_(), CoapMessageType::Non);
    assert_eq!(result.body(), b"Hello World!");
    server.stop();
}

#[test]
pub fn blockwise_request() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |_| {});

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(server_address, false);
    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("large"));

    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.blocks.len(), (common::LARGE_PAYLOAD.len() + 63) / 64);
    for (num, block) in result.blocks.iter().enumerate() {
        let block2 = block.block2().expect("block without Block2 option");
        assert_eq!(block2.num() as usize, num);
        assert_eq!(block2.size(), 64);
        assert_eq!(block2.more(), num + 1 < result.blocks.len());
    }
    assert_eq!(result.body(), common::LARGE_PAYLOAD);
    server.stop();
}

#[test]
pub fn oversized_payload_is_sliced_by_server() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |context| {
        let mut resource = CoapResource::new(ResourceFlags::empty(), ());
        resource.set_method_handler(CoapRequestCode::Get, Some(sliced));
        context.add_resource("sliced", resource).unwrap();
    });

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(server_address, false);
    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("sliced"));

    assert_eq!(result.outcome, Some(Ok(())));
    assert!(result.blocks.len() > 1);
    assert_eq!(result.body(), common::LARGE_PAYLOAD);
    server.stop();
}

#[test]
pub fn unknown_resource_and_method() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |_| {});

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(server_address, false);

    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("missing"));
    assert_eq!(result.outcome, Some(Ok(())));
    assert_eq!(result.blocks[0].response_code(), CoapResponseCode::NotFound);

    let mut request = CoapRequest::new(CoapMessageType::Con, CoapRequestCode::Delete).unwrap();
    request.set_path("test1");
    let result = common::perform_request(&mut context, &endpoint, request);
    assert_eq!(result.blocks[0].response_code(), CoapResponseCode::NotAllowed);
    server.stop();
}

#[test]
pub fn unreachable_server_fails_without_callback() {
    common::init_logging();
    let unused_address = common::get_unused_server_addr();

    let mut context = CoapContext::new(common::client_config(false)).unwrap();
    let endpoint = CoapEndpoint::from_socket_addr(unused_address, false);
    let result = common::perform_request(&mut context, &endpoint, common::gen_test_request("test1"));

    assert!(result.blocks.is_empty());
    assert_eq!(result.outcome, Some(Err(BlockingRequestFailure::NoResponse)));
}

#[test]
pub fn undecodable_confirmable_message_is_reset() {
    let server_address = common::get_unused_server_addr();
    let server = common::spawn_test_server(server_config(server_address), |_| {});

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 64];

    // Version 0 is not CoAP version 1.
    socket.send_to(&[0x00, 0x01, 0x12, 0x34], server_address).unwrap();
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    let reset = CoapMessage::decode(&buf[..len]).unwrap();
    assert_eq!(reset.type_(), CoapMessageType::Rst);
    assert_eq!(reset.mid(), Some(0x1234));

    // Empty confirmable message ("CoAP ping").
    socket.send_to(&[0x40, 0x00, 0x00, 0x07], server_address).unwrap();
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    let pong = CoapMessage::decode(&buf[..len]).unwrap();
    assert_eq!(pong.type_(), CoapMessageType::Rst);
    assert_eq!(pong.mid(), Some(7));
    server.stop();
}
