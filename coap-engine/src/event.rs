// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * event.rs - Event handling traits and logic for the CoAP engine.
 */

//! Event handling-related code

use std::fmt::Debug;

use crate::{
    error::DtlsAlert,
    transport::{DtlsEvent, TransportEvent},
    types::CoapEndpoint,
};

/// Trait for CoAP event handlers.
///
/// Implementations of this trait can be provided to a [CoapContext](crate::CoapContext) to handle
/// various events relating to DTLS sessions.
pub trait CoapEventHandler: Debug {
    /// Handle a DTLS connected event.
    ///
    /// This event is triggered when a DTLS session switches to the connected state.
    #[allow(unused_variables)]
    fn handle_dtls_connected(&mut self, endpoint: &CoapEndpoint) {}

    /// Handle a DTLS closed event.
    ///
    /// This event is triggered when a DTLS session is closed.
    #[allow(unused_variables)]
    fn handle_dtls_closed(&mut self, endpoint: &CoapEndpoint) {}

    /// Handle a DTLS error event.
    ///
    /// This event is triggered when a DTLS session fails with a fatal alert.
    #[allow(unused_variables)]
    fn handle_dtls_error(&mut self, endpoint: &CoapEndpoint, alert: DtlsAlert) {}
}

/// Passes a transport event on to the corresponding handler function. Returns `false` if the
/// event is not a session event.
pub(crate) fn dispatch_event(handler: &mut dyn CoapEventHandler, event: &TransportEvent) -> bool {
    let TransportEvent::Dtls(endpoint, event) = event else {
        return false;
    };
    match event {
        DtlsEvent::Connected => handler.handle_dtls_connected(endpoint),
        DtlsEvent::Closed => handler.handle_dtls_closed(endpoint),
        DtlsEvent::Alert(alert) => handler.handle_dtls_error(endpoint, *alert),
    }
    true
}
