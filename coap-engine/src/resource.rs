// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * resource.rs - Types relating to CoAP resource management.
 */

//! Resources served by the engine.
//!
//! A [CoapResource] bundles the request handlers for each method, an optional periodic handler
//! and typed application data. Resources are registered with a
//! [ResourceRegistry](crate::registry::ResourceRegistry), which assigns their path.

use std::{
    any::Any,
    fmt::{Debug, Formatter},
    time::Duration,
};

use bitflags::bitflags;

use crate::{
    message::{BlockCursor, CoapRequest, CoapResponse},
    protocol::CoapRequestCode,
};

bitflags! {
    /// Capabilities of a resource.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u8 {
        const METHOD_GET = 0x01;
        const METHOD_POST = 0x02;
        const METHOD_PUT = 0x04;
        const METHOD_DELETE = 0x08;
        /// Requests for `path/<anything>` are also routed to this resource.
        const HAS_SUB_RESOURCES = 0x10;
        /// The periodic handler is invoked on a timer.
        const IS_PERIODIC = 0x20;
        /// Successful requests are reported to the observation handler.
        const IS_OBSERVABLE = 0x40;
    }
}

impl ResourceFlags {
    /// Returns the method flag for a request code, if there is one.
    pub fn for_method(code: CoapRequestCode) -> Option<ResourceFlags> {
        match code {
            CoapRequestCode::Get => Some(ResourceFlags::METHOD_GET),
            CoapRequestCode::Post => Some(ResourceFlags::METHOD_POST),
            CoapRequestCode::Put => Some(ResourceFlags::METHOD_PUT),
            CoapRequestCode::Delete => Some(ResourceFlags::METHOD_DELETE),
            _ => None,
        }
    }
}

/// Trait with functions relating to [CoapResource]s with an unknown data type.
pub trait UntypedCoapResource: Any + Debug {
    /// Returns the uri_path this resource responds to.
    fn uri_path(&self) -> &str;
    /// Sets the uri_path, called by the registry on registration.
    fn set_uri_path(&mut self, uri_path: String);
    fn flags(&self) -> ResourceFlags;
    /// Returns whether a handler is set for the given method.
    fn has_handler(&self, code: CoapRequestCode) -> bool;
    /// Invokes the handler for the request method.
    ///
    /// Returns `false` without touching the response if no handler is set for the method.
    fn handle_request(&mut self, request: &CoapRequest, response: &mut CoapResponse, cursor: &mut BlockCursor<'_>)
        -> bool;
    /// Returns the period of the periodic handler, if one is set.
    fn period(&self) -> Option<Duration>;
    /// Invokes the periodic handler, returning `false` if there is none.
    fn run_periodic(&mut self) -> bool;
    /// Provides a reference to this resource as an [Any] trait object.
    ///
    /// You can use the resulting [Any] reference to downcast the resource to its appropriate
    /// concrete type (if you wish to e.g. change the application data).
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Container for resource handlers for various CoAP methods.
#[derive(Debug)]
struct CoapResourceHandlers<D: Any + Debug> {
    get: Option<CoapRequestHandler<D>>,
    put: Option<CoapRequestHandler<D>>,
    delete: Option<CoapRequestHandler<D>>,
    post: Option<CoapRequestHandler<D>>,
    fetch: Option<CoapRequestHandler<D>>,
    ipatch: Option<CoapRequestHandler<D>>,
    patch: Option<CoapRequestHandler<D>>,
}

impl<D: Any + Debug> Default for CoapResourceHandlers<D> {
    fn default() -> Self {
        CoapResourceHandlers {
            get: None,
            put: None,
            delete: None,
            post: None,
            fetch: None,
            ipatch: None,
            patch: None,
        }
    }
}

impl<D: Any + Debug> CoapResourceHandlers<D> {
    #[inline]
    fn handler_mut(&mut self, code: CoapRequestCode) -> Option<&mut CoapRequestHandler<D>> {
        self.handler_ref_mut(code).as_mut()
    }

    #[inline]
    fn handler_ref(&self, code: CoapRequestCode) -> &Option<CoapRequestHandler<D>> {
        match code {
            CoapRequestCode::Get => &self.get,
            CoapRequestCode::Put => &self.put,
            CoapRequestCode::Delete => &self.delete,
            CoapRequestCode::Post => &self.post,
            CoapRequestCode::Fetch => &self.fetch,
            CoapRequestCode::IPatch => &self.ipatch,
            CoapRequestCode::Patch => &self.patch,
        }
    }

    #[inline]
    fn handler_ref_mut(&mut self, code: CoapRequestCode) -> &mut Option<CoapRequestHandler<D>> {
        match code {
            CoapRequestCode::Get => &mut self.get,
            CoapRequestCode::Put => &mut self.put,
            CoapRequestCode::Delete => &mut self.delete,
            CoapRequestCode::Post => &mut self.post,
            CoapRequestCode::Fetch => &mut self.fetch,
            CoapRequestCode::IPatch => &mut self.ipatch,
            CoapRequestCode::Patch => &mut self.patch,
        }
    }
}

/// Representation of a CoapResource that can be requested from a server.
///
/// # Example
/// ```
/// use coap_engine::message::{BlockCursor, CoapRequest, CoapResponse};
/// use coap_engine::protocol::{CoapRequestCode, CoapResponseCode};
/// use coap_engine::resource::{CoapResource, ResourceFlags, UntypedCoapResource};
///
/// fn get_temperature(temp: &mut u32, _req: &CoapRequest, rsp: &mut CoapResponse, out: &mut BlockCursor) {
///     rsp.set_response_code(CoapResponseCode::Content);
///     out.write_bytes(temp.to_string().as_bytes());
/// }
///
/// let mut resource = CoapResource::new(ResourceFlags::empty(), 21u32);
/// resource.set_method_handler(CoapRequestCode::Get, Some(get_temperature));
/// assert!(resource.flags().contains(ResourceFlags::METHOD_GET));
/// ```
#[derive(Debug)]
pub struct CoapResource<D: Any + Debug> {
    url: String,
    flags: ResourceFlags,
    user_data: D,
    handlers: CoapResourceHandlers<D>,
    periodic: Option<CoapPeriodicHandler<D>>,
}

impl<D: Any + Debug> CoapResource<D> {
    /// Creates a new resource with the given flags and application data.
    ///
    /// The path is assigned when the resource is registered.
    pub fn new(flags: ResourceFlags, user_data: D) -> CoapResource<D> {
        CoapResource {
            url: String::new(),
            flags,
            user_data,
            handlers: CoapResourceHandlers::default(),
            periodic: None,
        }
    }

    pub fn user_data(&self) -> &D {
        &self.user_data
    }

    pub fn user_data_mut(&mut self) -> &mut D {
        &mut self.user_data
    }

    /// Sets the handler function for a given method code.
    ///
    /// Setting a handler also sets the corresponding method flag, removing it clears the flag.
    pub fn set_method_handler<H: Into<CoapRequestHandler<D>>>(&mut self, code: CoapRequestCode, handler: Option<H>) {
        let handler = handler.map(Into::into);
        if let Some(flag) = ResourceFlags::for_method(code) {
            self.flags.set(flag, handler.is_some());
        }
        *self.handlers.handler_ref_mut(code) = handler;
    }

    /// Sets the handler invoked every `period` once the resource is armed.
    ///
    /// The handler only runs if the resource also has [ResourceFlags::IS_PERIODIC] set.
    pub fn set_periodic_handler<F: 'static + FnMut(&mut D)>(&mut self, period: Duration, handler: F) {
        self.periodic = Some(CoapPeriodicHandler {
            period,
            function: Box::new(handler),
        });
    }
}

impl<D: Any + Debug> UntypedCoapResource for CoapResource<D> {
    fn uri_path(&self) -> &str {
        &self.url
    }

    fn set_uri_path(&mut self, uri_path: String) {
        self.url = uri_path;
    }

    fn flags(&self) -> ResourceFlags {
        self.flags
    }

    fn has_handler(&self, code: CoapRequestCode) -> bool {
        self.handlers.handler_ref(code).is_some()
    }

    fn handle_request(
        &mut self,
        request: &CoapRequest,
        response: &mut CoapResponse,
        cursor: &mut BlockCursor<'_>,
    ) -> bool {
        match self.handlers.handler_mut(request.method()) {
            Some(handler) => {
                (handler.function)(&mut self.user_data, request, response, cursor);
                true
            },
            None => false,
        }
    }

    fn period(&self) -> Option<Duration> {
        self.periodic.as_ref().map(|p| p.period)
    }

    fn run_periodic(&mut self) -> bool {
        match self.periodic.as_mut() {
            Some(periodic) => {
                (periodic.function)(&mut self.user_data);
                true
            },
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self as &(dyn Any)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self as &mut (dyn Any)
    }
}

/// Boxed request handler of a [CoapResource] with data type `D`.
pub struct CoapRequestHandler<D: Any + Debug> {
    function: Box<dyn FnMut(&mut D, &CoapRequest, &mut CoapResponse, &mut BlockCursor<'_>)>,
}

impl<D: 'static + Debug> CoapRequestHandler<D> {
    /// Creates a new CoapRequestHandler with the given function as the handler function to call.
    pub fn new<F: 'static + FnMut(&mut D, &CoapRequest, &mut CoapResponse, &mut BlockCursor<'_>)>(
        handler: F,
    ) -> CoapRequestHandler<D> {
        CoapRequestHandler {
            function: Box::new(handler),
        }
    }
}

impl<D: 'static + Debug, F: 'static + FnMut(&mut D, &CoapRequest, &mut CoapResponse, &mut BlockCursor<'_>)> From<F>
    for CoapRequestHandler<D>
{
    fn from(f: F) -> Self {
        CoapRequestHandler::new(f)
    }
}

impl<D: 'static + Debug> Debug for CoapRequestHandler<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoapRequestHandler").finish()
    }
}

struct CoapPeriodicHandler<D> {
    period: Duration,
    function: Box<dyn FnMut(&mut D)>,
}

impl<D> Debug for CoapPeriodicHandler<D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoapPeriodicHandler")
            .field("period", &self.period)
            .finish()
    }
}
