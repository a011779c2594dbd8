// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * crypto/psk/mod.rs - Interfaces and types for PSK support.
 */

//! Types and traits related to support for DTLS with pre-shared keys for CoAP.
//!
//! During a handshake, the DTLS backend asks for credentials in two shapes:
//! - an *identity query*, asking which identity to present to a peer (optionally guided by an
//!   identity hint the peer sent), and
//! - a *key query*, asking for the key belonging to an identity the peer presented.
//!
//! Both are answered by [PskProvider]s through a [KeystoreResolver]. If no provider is
//! registered, the resolver falls back to a default key with identity `Client_identity` and key
//! `secretPSK`.
//!
//! # Example
//!
//! ```
//! use coap_engine::crypto::psk::{CredentialEntry, KeystoreResolver, PskKey, StaticPskProvider};
//! use coap_engine::types::CoapEndpoint;
//!
//! let mut resolver = KeystoreResolver::new();
//! resolver.register(StaticPskProvider::new(vec![PskKey::new(Some("node-1"), "node-1-key")]));
//!
//! let peer: CoapEndpoint = "coaps://[fd00::1]".parse()?;
//! let mut query = CredentialEntry::identity_query(None);
//! assert!(resolver.get_psk_info(&peer, &mut query));
//! assert_eq!(query.identity(), Some(&b"node-1"[..]));
//! # Result::<(), coap_engine::error::EndpointParseError>::Ok(())
//! ```

use std::fmt::Debug;

use log::{debug, trace};

pub use key::PskKey;
pub use security::{SecurityInstance, SecurityMode, SecurityObject, SecurityObjectProvider, SecurityObjectStore};

use crate::types::CoapEndpoint;

mod key;
mod security;

/// Identity used by the default key.
pub const PSK_DEFAULT_IDENTITY: &str = "Client_identity";
/// Key data of the default key.
pub const PSK_DEFAULT_KEY: &str = "secretPSK";

/// A credential lookup in progress.
///
/// An entry without identity (or with an empty one) is an identity query, any other entry is a
/// key query for that identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialEntry {
    identity_hint: Option<Box<[u8]>>,
    identity: Option<Box<[u8]>>,
    key: Option<Box<[u8]>>,
}

impl CredentialEntry {
    /// Creates an identity query, optionally carrying the hint sent by the peer.
    pub fn identity_query(hint: Option<&[u8]>) -> CredentialEntry {
        CredentialEntry {
            identity_hint: hint.filter(|h| !h.is_empty()).map(Into::into),
            ..Default::default()
        }
    }

    /// Creates a key query for the given identity.
    pub fn key_query(identity: &[u8]) -> CredentialEntry {
        CredentialEntry {
            identity: Some(identity.into()),
            ..Default::default()
        }
    }

    pub fn is_identity_query(&self) -> bool {
        self.identity.as_ref().map_or(true, |id| id.is_empty())
    }

    pub fn identity_hint(&self) -> Option<&[u8]> {
        self.identity_hint.as_deref()
    }

    pub fn identity(&self) -> Option<&[u8]> {
        self.identity.as_deref()
    }

    pub fn set_identity(&mut self, identity: &[u8]) {
        self.identity = Some(identity.into());
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn set_key(&mut self, key: &[u8]) {
        self.key = Some(key.into());
    }
}

/// Source of pre-shared keys.
pub trait PskProvider: Debug {
    /// Answers an identity or key query for the peer `endpoint`.
    ///
    /// For an identity query, fills in the identity to present to the peer. For a key query,
    /// fills in the key for the identity in `entry`. Returns `false` if this provider has no
    /// matching credentials.
    fn get_psk_info(&self, endpoint: &CoapEndpoint, entry: &mut CredentialEntry) -> bool;
}

/// Endpoint-agnostic list of keys.
///
/// An identity query yields the key whose identity equals the identity hint, or the first key
/// with an identity if there is no such key. A key query yields the key whose identity matches.
#[derive(Debug, Clone)]
pub struct StaticPskProvider {
    keys: Vec<PskKey>,
}

impl StaticPskProvider {
    pub fn new(keys: Vec<PskKey>) -> StaticPskProvider {
        StaticPskProvider { keys }
    }

    pub fn keys(&self) -> &[PskKey] {
        &self.keys
    }
}

impl Default for StaticPskProvider {
    fn default() -> Self {
        StaticPskProvider::new(vec![PskKey::new(Some(PSK_DEFAULT_IDENTITY), PSK_DEFAULT_KEY)])
    }
}

impl PskProvider for StaticPskProvider {
    fn get_psk_info(&self, _endpoint: &CoapEndpoint, entry: &mut CredentialEntry) -> bool {
        if entry.is_identity_query() {
            let hinted = entry
                .identity_hint()
                .and_then(|hint| self.keys.iter().find(|k| k.has_identity(hint)));
            let key = hinted.or_else(|| self.keys.iter().find(|k| k.identity().is_some()));
            return match key.and_then(PskKey::identity) {
                Some(identity) => {
                    entry.set_identity(identity);
                    true
                },
                None => false,
            };
        }
        let identity = entry.identity().unwrap_or_default();
        match self.keys.iter().find(|k| k.has_identity(identity)) {
            Some(key) => {
                entry.set_key(key.data());
                true
            },
            None => false,
        }
    }
}

/// Ordered set of [PskProvider]s queried by the DTLS backend.
#[derive(Debug, Default)]
pub struct KeystoreResolver {
    providers: Vec<Box<dyn PskProvider>>,
    fallback: StaticPskProvider,
}

impl KeystoreResolver {
    pub fn new() -> KeystoreResolver {
        KeystoreResolver::default()
    }

    /// Appends a provider. Providers are queried in registration order.
    pub fn register<P: PskProvider + 'static>(&mut self, provider: P) {
        self.providers.push(Box::new(provider));
    }

    /// Removes all registered providers, reverting to the default key.
    pub fn clear(&mut self) {
        self.providers.clear();
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Resolves a query, returning `true` on the first provider that answers it.
    ///
    /// Uses the default key if no provider is registered.
    pub fn get_psk_info(&self, endpoint: &CoapEndpoint, entry: &mut CredentialEntry) -> bool {
        if self.providers.is_empty() {
            trace!("no keystore registered, using default PSK");
            return self.fallback.get_psk_info(endpoint, entry);
        }
        let found = self.providers.iter().any(|p| p.get_psk_info(endpoint, entry));
        if !found {
            debug!(
                "no PSK {} for {}",
                if entry.is_identity_query() { "identity" } else { "key" },
                endpoint
            );
        }
        found
    }
}
