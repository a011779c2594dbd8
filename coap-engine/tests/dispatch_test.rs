// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/dispatch_test.rs - Tests for resource registration and request dispatch.
 */

use std::{cell::RefCell, rc::Rc};

use coap_engine::{
    error::ResourceRegistrationError,
    message::{BlockCursor, CoapRequest, CoapResponse},
    protocol::{CoapMessageType, CoapRequestCode, CoapResponseCode},
    registry::{ObservationHandler, ResourceRegistry},
    resource::{ResourceFlags, UntypedCoapResource},
    types::CoapEndpoint,
    CoapResource,
};

mod common;

fn write_marker(marker: &mut u8, _: &CoapRequest, _: &mut CoapResponse, cursor: &mut BlockCursor<'_>) {
    cursor.write_bytes(&[*marker]);
}

fn count_calls(calls: &mut u32, _: &CoapRequest, response: &mut CoapResponse, _: &mut BlockCursor<'_>) {
    *calls += 1;
    response.set_response_code(CoapResponseCode::Changed);
}

fn marker_resource(flags: ResourceFlags, marker: u8) -> CoapResource<u8> {
    let mut resource = CoapResource::new(flags, marker);
    resource.set_method_handler(CoapRequestCode::Get, Some(write_marker));
    resource
}

fn source() -> CoapEndpoint {
    "coap://[::1]:61616".parse().unwrap()
}

struct Dispatched {
    handled: bool,
    code: CoapResponseCode,
    data: Vec<u8>,
}

fn dispatch(registry: &mut ResourceRegistry, method: CoapRequestCode, path: &str) -> Dispatched {
    let mut request = CoapRequest::new(CoapMessageType::Con, method).unwrap();
    request.set_path(path);
    let mut response = CoapResponse::new(CoapMessageType::Ack, CoapResponseCode::Content).unwrap();
    let mut buffer = [0u8; 64];
    let mut cursor = BlockCursor::new(&mut buffer, 0);
    let handled = registry.dispatch(&source(), &request, &mut response, &mut cursor);
    Dispatched {
        handled,
        code: response.response_code(),
        data: cursor.data().to_vec(),
    }
}

#[derive(Debug, Default)]
struct RecordingObserver {
    calls: Rc<RefCell<Vec<(String, CoapEndpoint, CoapResponseCode)>>>,
}

impl ObservationHandler for RecordingObserver {
    fn on_observable_request(
        &mut self,
        resource: &dyn UntypedCoapResource,
        source: &CoapEndpoint,
        _request: &CoapRequest,
        response: &mut CoapResponse,
    ) {
        self.calls
            .borrow_mut()
            .push((resource.uri_path().to_string(), *source, response.response_code()));
    }
}

#[test]
pub fn first_registered_resource_wins() {
    common::init_logging();
    let mut registry = ResourceRegistry::new();
    registry.register("dup", marker_resource(ResourceFlags::empty(), 1)).unwrap();
    registry.register("/dup", marker_resource(ResourceFlags::empty(), 2)).unwrap();

    let result = dispatch(&mut registry, CoapRequestCode::Get, "dup");
    assert!(result.handled);
    assert_eq!(result.code, CoapResponseCode::Content);
    assert_eq!(result.data, vec![1]);
    assert_eq!(registry.len(), 2);
}

#[test]
pub fn sub_resources_require_flag() {
    let mut registry = ResourceRegistry::new();
    registry
        .register("sensors", marker_resource(ResourceFlags::HAS_SUB_RESOURCES, 1))
        .unwrap();
    registry.register("actuators", marker_resource(ResourceFlags::empty(), 2)).unwrap();

    assert_eq!(dispatch(&mut registry, CoapRequestCode::Get, "sensors").data, vec![1]);
    assert_eq!(dispatch(&mut registry, CoapRequestCode::Get, "sensors/temp/0").data, vec![1]);

    let result = dispatch(&mut registry, CoapRequestCode::Get, "actuators/led");
    assert!(!result.handled);
    assert_eq!(result.code, CoapResponseCode::NotFound);

    // Only whole path segments match.
    let result = dispatch(&mut registry, CoapRequestCode::Get, "sensorsX");
    assert!(!result.handled);
    assert_eq!(result.code, CoapResponseCode::NotFound);
}

#[test]
pub fn missing_method_handler_is_not_allowed() {
    let mut registry = ResourceRegistry::new();
    let led = registry.register("led", marker_resource(ResourceFlags::empty(), 1)).unwrap();
    registry.register("led", CoapResource::new(ResourceFlags::empty(), 0u32)).unwrap();
    let resource = registry.get(led).unwrap();
    assert!(resource.has_handler(CoapRequestCode::Get));
    assert!(!resource.has_handler(CoapRequestCode::Post));

    // The first match decides, even though it has no POST handler.
    let result = dispatch(&mut registry, CoapRequestCode::Post, "led");
    assert!(!result.handled);
    assert_eq!(result.code, CoapResponseCode::NotAllowed);
    assert!(result.data.is_empty());
}

#[test]
pub fn observation_hook_runs_after_handled_requests() {
    let mut registry = ResourceRegistry::new();
    let observer = RecordingObserver::default();
    let calls = Rc::clone(&observer.calls);
    registry.set_observation_handler(Some(Box::new(observer)));

    let mut observable = CoapResource::new(ResourceFlags::IS_OBSERVABLE, 0u32);
    observable.set_method_handler(CoapRequestCode::Put, Some(count_calls));
    let observable_id = registry.register("temp", observable).unwrap();
    registry.register("plain", marker_resource(ResourceFlags::empty(), 1)).unwrap();

    assert!(dispatch(&mut registry, CoapRequestCode::Put, "temp").handled);
    assert!(!dispatch(&mut registry, CoapRequestCode::Get, "temp").handled);
    assert!(dispatch(&mut registry, CoapRequestCode::Get, "plain").handled);

    assert_eq!(
        *calls.borrow(),
        vec![("temp".to_string(), source(), CoapResponseCode::Changed)]
    );
    assert_eq!(registry.resource::<u32>(observable_id).map(|r| *r.user_data()), Some(1));
}

#[test]
pub fn typed_resource_access() {
    let mut registry = ResourceRegistry::new();
    let id = registry.register("counter", CoapResource::new(ResourceFlags::empty(), 5u32)).unwrap();

    assert!(registry.resource::<u8>(id).is_none());
    *registry.resource_mut::<u32>(id).unwrap().user_data_mut() += 1;
    assert_eq!(*registry.resource::<u32>(id).unwrap().user_data(), 6);
    assert_eq!(registry.find("counter"), Some(id));
    assert_eq!(registry.get(id).map(|r| r.uri_path().to_string()), Some("counter".to_string()));

    let paths: Vec<_> = registry.resources().map(|(_, r)| r.uri_path().to_string()).collect();
    assert_eq!(paths, vec!["counter".to_string()]);
}

#[test]
pub fn invalid_paths_are_rejected() {
    let mut registry = ResourceRegistry::new();
    assert_eq!(
        registry.register("", marker_resource(ResourceFlags::empty(), 1)),
        Err(ResourceRegistrationError::InvalidPath)
    );
    assert_eq!(
        registry.register("sensors/", marker_resource(ResourceFlags::empty(), 1)),
        Err(ResourceRegistrationError::InvalidPath)
    );
    assert!(registry.is_empty());
}

#[test]
pub fn repeated_init_has_no_effect() {
    let mut registry = ResourceRegistry::new();
    assert!(!registry.is_initialized());
    registry.init();
    registry.init();
    assert!(registry.is_initialized());
}
