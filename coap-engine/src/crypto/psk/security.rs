// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * crypto/psk/security.rs - PSK lookup backed by LwM2M security object instances.
 */

use std::{cell::RefCell, fmt::Debug, rc::Rc};

use log::trace;

use crate::{
    crypto::psk::{CredentialEntry, PskProvider},
    types::CoapEndpoint,
};

/// Security mode resource of an LwM2M security object instance.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SecurityMode {
    Psk = 0,
    RawPublicKey = 1,
    Certificate = 2,
    NoSec = 3,
}

/// One instance of the LwM2M security object (object 0), reduced to what PSK lookup needs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SecurityInstance {
    pub server_uri: String,
    pub security_mode: SecurityMode,
    /// PSK identity in PSK mode.
    pub public_key_or_identity: Box<[u8]>,
    pub secret_key: Box<[u8]>,
}

impl SecurityInstance {
    /// Creates a PSK mode instance for the server at `server_uri`.
    pub fn psk<I: Into<Box<[u8]>>, K: Into<Box<[u8]>>>(server_uri: &str, identity: I, key: K) -> SecurityInstance {
        SecurityInstance {
            server_uri: server_uri.to_string(),
            security_mode: SecurityMode::Psk,
            public_key_or_identity: identity.into(),
            secret_key: key.into(),
        }
    }
}

/// Lookup interface of an object store holding security object instances.
pub trait SecurityObjectStore: Debug {
    /// Returns the instances in the order they should be searched.
    fn security_instances(&self) -> Vec<SecurityInstance>;
}

impl SecurityObjectStore for Vec<SecurityInstance> {
    fn security_instances(&self) -> Vec<SecurityInstance> {
        self.clone()
    }
}

impl<S: SecurityObjectStore> SecurityObjectStore for Rc<RefCell<S>> {
    fn security_instances(&self) -> Vec<SecurityInstance> {
        self.borrow().security_instances()
    }
}

/// Minimal security object holding instances added at runtime.
#[derive(Debug, Clone, Default)]
pub struct SecurityObject {
    instances: Vec<SecurityInstance>,
}

impl SecurityObject {
    pub fn new() -> SecurityObject {
        SecurityObject::default()
    }

    /// Adds a PSK mode instance for the server at `server_uri`, or updates the credentials of the
    /// existing instance for that server.
    pub fn add_server<I: Into<Box<[u8]>>, K: Into<Box<[u8]>>>(&mut self, server_uri: &str, identity: I, key: K) {
        let instance = SecurityInstance::psk(server_uri, identity, key);
        match self.instances.iter_mut().find(|i| i.server_uri == server_uri) {
            Some(existing) => *existing = instance,
            None => self.instances.push(instance),
        }
    }

    pub fn instances_mut(&mut self) -> &mut Vec<SecurityInstance> {
        &mut self.instances
    }
}

impl SecurityObjectStore for SecurityObject {
    fn security_instances(&self) -> Vec<SecurityInstance> {
        self.instances.clone()
    }
}

/// [PskProvider] that looks up credentials in security object instances by server URI.
#[derive(Debug)]
pub struct SecurityObjectProvider<S: SecurityObjectStore> {
    store: S,
}

impl<S: SecurityObjectStore> SecurityObjectProvider<S> {
    pub fn new(store: S) -> SecurityObjectProvider<S> {
        SecurityObjectProvider { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: SecurityObjectStore> PskProvider for SecurityObjectProvider<S> {
    fn get_psk_info(&self, endpoint: &CoapEndpoint, entry: &mut CredentialEntry) -> bool {
        let identity_query = entry.is_identity_query();
        let instances = self.store.security_instances();
        let found = instances.iter().find(|instance| {
            if instance.server_uri.is_empty() || instance.security_mode != SecurityMode::Psk {
                return false;
            }
            let server = match CoapEndpoint::parse(&instance.server_uri) {
                Ok(server) => server,
                Err(e) => {
                    trace!("lwm2m-sec: failed to parse server URI {}: {}", instance.server_uri, e);
                    return false;
                },
            };
            if server != *endpoint {
                trace!("lwm2m-sec: wrong server {} != {}", endpoint, server);
                return false;
            }
            if !identity_query && entry.identity() != Some(&instance.public_key_or_identity[..]) {
                trace!("lwm2m-sec: identity not matching");
                return false;
            }
            true
        });

        let Some(instance) = found else {
            return false;
        };
        if identity_query {
            entry.set_identity(&instance.public_key_or_identity);
            return true;
        }
        if instance.secret_key.is_empty() {
            return false;
        }
        entry.set_key(&instance.secret_key);
        true
    }
}
