// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * registry.rs - Resource registration and request dispatch.
 */

//! Resource registration and request dispatch.

use std::{any::Any, fmt::Debug};

use log::{debug, trace, warn};

use crate::{
    error::ResourceRegistrationError,
    message::{BlockCursor, CoapRequest, CoapResponse},
    protocol::CoapResponseCode,
    resource::{CoapResource, ResourceFlags, UntypedCoapResource},
    types::CoapEndpoint,
};

/// Handle to a registered resource, i.e. its position in registration order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(usize);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Hook invoked after a handler of an [observable](ResourceFlags::IS_OBSERVABLE) resource ran.
pub trait ObservationHandler: Debug {
    /// Called with the resource, the requesting peer and the request/response pair after the
    /// resource handler produced the response.
    fn on_observable_request(
        &mut self,
        resource: &dyn UntypedCoapResource,
        source: &CoapEndpoint,
        request: &CoapRequest,
        response: &mut CoapResponse,
    );
}

/// Ordered list of resources and the dispatcher routing requests to them.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Box<dyn UntypedCoapResource>>,
    observation_handler: Option<Box<dyn ObservationHandler>>,
    initialized: bool,
}

impl ResourceRegistry {
    pub fn new() -> ResourceRegistry {
        ResourceRegistry::default()
    }

    /// Marks initialization as complete. Periodic handlers only run afterwards.
    ///
    /// Calling this more than once has no effect.
    pub fn init(&mut self) {
        if self.initialized {
            warn!("REST engine already initialized - double initialization?");
            return;
        }
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Registers `resource` under `path` and returns its id.
    ///
    /// One leading slash is stripped. Paths that are empty or end with a slash are rejected.
    /// Registering the same path twice is allowed, requests are served by the resource that was
    /// registered first.
    pub fn register<R: UntypedCoapResource>(
        &mut self,
        path: &str,
        mut resource: R,
    ) -> Result<ResourceId, ResourceRegistrationError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() || path.ends_with('/') {
            return Err(ResourceRegistrationError::InvalidPath);
        }
        debug!("activating resource /{}", path);
        resource.set_uri_path(path.to_string());
        self.resources.push(Box::new(resource));
        Ok(ResourceId(self.resources.len() - 1))
    }

    pub fn set_observation_handler(&mut self, handler: Option<Box<dyn ObservationHandler>>) {
        self.observation_handler = handler;
    }

    /// Iterates over the registered resources in registration order.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &dyn UntypedCoapResource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(idx, res)| (ResourceId(idx), res.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, id: ResourceId) -> Option<&dyn UntypedCoapResource> {
        self.resources.get(id.0).map(AsRef::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: ResourceId) -> Option<&mut dyn UntypedCoapResource> {
        self.resources.get_mut(id.0).map(AsMut::as_mut)
    }

    /// Returns the typed resource with the given id, if it has user data of type `D`.
    pub fn resource<D: Any + Debug>(&self, id: ResourceId) -> Option<&CoapResource<D>> {
        self.get(id)?.as_any().downcast_ref()
    }

    pub fn resource_mut<D: Any + Debug>(&mut self, id: ResourceId) -> Option<&mut CoapResource<D>> {
        self.resources.get_mut(id.0)?.as_any_mut().downcast_mut()
    }

    /// Finds the first resource serving `path`.
    pub fn find(&self, path: &str) -> Option<ResourceId> {
        self.resources
            .iter()
            .position(|res| path_matches(res.as_ref(), path))
            .map(ResourceId)
    }

    /// Routes `request` to the first matching resource.
    ///
    /// Sets 4.04 if no resource matches and 4.05 if the matching resource has no handler for the
    /// request method. Returns whether a handler ran.
    pub fn dispatch(
        &mut self,
        source: &CoapEndpoint,
        request: &CoapRequest,
        response: &mut CoapResponse,
        cursor: &mut BlockCursor<'_>,
    ) -> bool {
        let path = request.path();
        let id = match self.find(&path) {
            Some(id) => id,
            None => {
                trace!("no resource for /{}", path);
                response.set_response_code(CoapResponseCode::NotFound);
                return false;
            },
        };
        let resource = &mut self.resources[id.0];
        trace!(
            "/{}, method {:?}, flags {:?}",
            resource.uri_path(),
            request.method(),
            resource.flags()
        );
        if !resource.has_handler(request.method()) {
            trace!("/{} has no handler for {:?}", resource.uri_path(), request.method());
            response.set_response_code(CoapResponseCode::NotAllowed);
            return false;
        }
        resource.handle_request(request, response, cursor);
        if resource.flags().contains(ResourceFlags::IS_OBSERVABLE) {
            if let Some(handler) = self.observation_handler.as_mut() {
                handler.on_observable_request(resource.as_ref(), source, request, response);
            }
        }
        true
    }
}

fn path_matches(resource: &dyn UntypedCoapResource, path: &str) -> bool {
    let url = resource.uri_path();
    match path.strip_prefix(url) {
        Some("") => true,
        Some(rest) => resource.flags().contains(ResourceFlags::HAS_SUB_RESOURCES) && rest.starts_with('/'),
        None => false,
    }
}
