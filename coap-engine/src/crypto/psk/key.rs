// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * crypto/psk/key.rs - Interfaces and types for PSK keys.
 */

use std::borrow::Cow;

/// A pre-shared DTLS key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PskKey {
    /// Identity of this key (or None if no identity is known).
    identity: Option<Box<[u8]>>,
    /// Actual key data (the key bytes).
    data: Box<[u8]>,
}

impl PskKey {
    /// Creates a new key object with the given `identity` and the actual key bytes given in `data`.
    pub fn new<T: Into<Vec<u8>>, U: Into<Vec<u8>>>(identity: Option<T>, data: U) -> PskKey {
        PskKey {
            identity: identity.map(Into::into).map(|v| v.into_boxed_slice()),
            data: data.into().into_boxed_slice(),
        }
    }

    /// Returns the key's identity or `None` if no key identity was set.
    pub fn identity(&self) -> Option<&[u8]> {
        self.identity.as_ref().map(|v| v.as_ref())
    }

    /// Returns the key data bytes as an immutable slice.
    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Returns whether this key has exactly the given identity.
    pub(crate) fn has_identity(&self, identity: &[u8]) -> bool {
        self.identity() == Some(identity)
    }
}

impl From<Box<[u8]>> for PskKey {
    fn from(value: Box<[u8]>) -> Self {
        PskKey {
            identity: None,
            data: value,
        }
    }
}

impl From<&[u8]> for PskKey {
    fn from(value: &[u8]) -> Self {
        PskKey {
            identity: None,
            data: value.into(),
        }
    }
}

impl<'a> From<Cow<'a, [u8]>> for PskKey {
    fn from(value: Cow<'a, [u8]>) -> Self {
        PskKey {
            identity: None,
            data: value.into(),
        }
    }
}

impl<T: Into<Box<[u8]>>, U: Into<Box<[u8]>>> From<(T, U)> for PskKey {
    fn from(value: (T, U)) -> Self {
        PskKey {
            identity: Some(value.0.into()),
            data: value.1.into(),
        }
    }
}

impl AsRef<PskKey> for PskKey {
    fn as_ref(&self) -> &PskKey {
        self
    }
}
