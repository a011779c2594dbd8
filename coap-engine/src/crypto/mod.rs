// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * crypto/mod.rs - CoAP cryptography provider interfaces and types.
 */

//! Cryptography interfaces and types.
//!
//! The engine secures CoAP with DTLS using pre-shared keys (PSK, see
//! [RFC 4279](https://datatracker.ietf.org/doc/html/rfc4279)). The handshake and record protocol
//! are provided by a [DtlsBackend](crate::transport::DtlsBackend), this module provides the
//! credential side: the [PskProvider](psk::PskProvider) trait that credential stores implement
//! and the [KeystoreResolver](psk::KeystoreResolver) the DTLS backend queries during handshakes.

pub mod psk;
