// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * transaction.rs - Reliable message layer for outgoing requests.
 */

//! Reliable message layer for outgoing requests.
//!
//! A transaction is an outstanding exchange with a peer. It is created for a message ID and
//! endpoint, gets the encoded request through [submit()](ReliableMessageLayer::submit()) and
//! lives until the response arrives or it expires. Confirmable requests are retransmitted with
//! exponential back-off ([RFC 7252, Section 4.2](https://datatracker.ietf.org/doc/html/rfc7252#section-4.2)).

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};
use rand::Rng;

use crate::{
    config::{CoapConfig, MAX_TRANSMIT_WAIT_LIMIT},
    error::TransactionError,
    message::{CoapMessage, CoapMessageCommon},
    prng::with_coap_prng,
    protocol::{CoapMessageCode, CoapMessageType},
    transport::EndpointMtu,
    types::{CoapEndpoint, CoapMessageId},
};

/// Interface of the message layer used by block-wise requests.
pub trait ReliableMessageLayer {
    /// Identifies an open transaction.
    type Handle: Copy + Eq + Debug;

    /// Returns a fresh message ID.
    fn next_message_id(&mut self) -> CoapMessageId;

    /// Opens a transaction for `mid` with `endpoint`. Returns `None` if no slot is free.
    fn new_transaction(&mut self, mid: CoapMessageId, endpoint: &CoapEndpoint) -> Option<Self::Handle>;

    /// Hands the encoded request of an open transaction to the layer for (re)transmission.
    fn submit(&mut self, handle: Self::Handle, packet: Vec<u8>) -> Result<(), TransactionError>;
}

/// Handle of a transaction in a [TransactionTable].
///
/// Handles of released transactions never compare equal to handles of transactions opened
/// later on in the same slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TransactionHandle {
    slot: usize,
    generation: u32,
}

/// Outcome of matching an inbound message against the open transactions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TransactionMatch {
    /// The message is the response for this transaction, which has been released.
    Response(TransactionHandle),
    /// The peer acknowledged the request and will send a separate response later.
    Acknowledged(TransactionHandle),
    /// The peer rejected the request, the transaction has been released.
    Reset(TransactionHandle),
}

#[derive(Debug)]
struct Transaction {
    handle: TransactionHandle,
    mid: CoapMessageId,
    endpoint: CoapEndpoint,
    token: Box<[u8]>,
    packet: Option<Vec<u8>>,
    confirmable: bool,
    acknowledged: bool,
    send_pending: bool,
    retransmissions: u8,
    timeout: Duration,
    deadline: Option<Instant>,
}

/// Fixed-size table of open transactions.
#[derive(Debug)]
pub struct TransactionTable {
    slots: Vec<Option<Transaction>>,
    next_mid: CoapMessageId,
    generation: u32,
    ack_timeout: Duration,
    ack_random_factor: f32,
    max_retransmit: u8,
    response_wait: Duration,
    mtu: EndpointMtu,
}

impl TransactionTable {
    /// Creates a table with the limits and timing parameters of `config`.
    ///
    /// Message IDs start at a random value taken from the engine PRNG.
    pub fn new(config: &CoapConfig) -> TransactionTable {
        let next_mid = with_coap_prng(|rng| rng.gen::<u16>()).unwrap_or_else(|e| {
            warn!("unable to randomize initial message ID: {}", e);
            0
        });
        TransactionTable {
            slots: (0..config.max_open_transactions()).map(|_| None).collect(),
            next_mid,
            generation: 0,
            ack_timeout: config.ack_timeout(),
            ack_random_factor: config.ack_random_factor(),
            max_retransmit: config.max_retransmit(),
            response_wait: config.max_transmit_wait().unwrap_or(MAX_TRANSMIT_WAIT_LIMIT),
            mtu: config.mtu(),
        }
    }

    /// Returns the number of open transactions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn is_open(&self, handle: TransactionHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Closes a transaction. Does nothing if it was already released.
    pub fn release(&mut self, handle: TransactionHandle) {
        if let Some(slot) = self.slots.get_mut(handle.slot) {
            if slot.as_ref().map_or(false, |t| t.handle == handle) {
                *slot = None;
            }
        }
    }

    /// Matches an inbound response or empty ACK/RST from `endpoint`.
    ///
    /// Piggy-backed responses, empty ACKs and RSTs are matched by message ID, separate responses
    /// by token.
    pub fn match_message(
        &mut self,
        message: &CoapMessage,
        endpoint: &CoapEndpoint,
        now: Instant,
    ) -> Option<TransactionMatch> {
        let by_mid = matches!(message.type_(), CoapMessageType::Ack | CoapMessageType::Rst);
        let response_wait = self.response_wait;
        let transaction = self.slots.iter_mut().flatten().find(|t| {
            if t.endpoint != *endpoint {
                return false;
            }
            if by_mid {
                Some(t.mid) == message.mid()
            } else {
                message.token().unwrap_or_default() == &t.token[..]
            }
        })?;
        let handle = transaction.handle;
        match message.type_() {
            CoapMessageType::Rst => {
                debug!("request {} rejected by {}", transaction.mid, endpoint);
                self.release(handle);
                Some(TransactionMatch::Reset(handle))
            },
            CoapMessageType::Ack if message.code() == CoapMessageCode::Empty => {
                trace!("request {} acknowledged by {}", transaction.mid, endpoint);
                transaction.acknowledged = true;
                transaction.deadline = Some(now + response_wait);
                Some(TransactionMatch::Acknowledged(handle))
            },
            _ => {
                self.release(handle);
                Some(TransactionMatch::Response(handle))
            },
        }
    }

    /// Returns the packets that need to be (re)transmitted now.
    pub fn take_transmissions(&mut self, now: Instant) -> Vec<(CoapEndpoint, Vec<u8>)> {
        let response_wait = self.response_wait;
        let max_retransmit = self.max_retransmit;
        let mut transmissions = Vec::new();
        for transaction in self.slots.iter_mut().flatten() {
            let Some(packet) = transaction.packet.as_ref() else {
                continue;
            };
            if transaction.send_pending {
                transaction.send_pending = false;
                transaction.deadline = Some(if transaction.confirmable {
                    now + transaction.timeout
                } else {
                    now + response_wait
                });
                transmissions.push((transaction.endpoint, packet.clone()));
                continue;
            }
            let due = transaction.deadline.map_or(false, |d| d <= now);
            if due && transaction.retransmittable(max_retransmit) {
                transaction.retransmissions += 1;
                transaction.timeout *= 2;
                transaction.deadline = Some(now + transaction.timeout);
                debug!(
                    "retransmitting request {} to {} ({}/{})",
                    transaction.mid, transaction.endpoint, transaction.retransmissions, max_retransmit
                );
                transmissions.push((transaction.endpoint, packet.clone()));
            }
        }
        transmissions
    }

    /// Releases all transactions that timed out without response and returns their handles.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TransactionHandle> {
        let max_retransmit = self.max_retransmit;
        let mut expired = Vec::new();
        for slot in self.slots.iter_mut() {
            let is_expired = slot.as_ref().map_or(false, |t| {
                !t.send_pending && t.deadline.map_or(false, |d| d <= now) && !t.retransmittable(max_retransmit)
            });
            if is_expired {
                if let Some(transaction) = slot.take() {
                    debug!("request {} to {} timed out", transaction.mid, transaction.endpoint);
                    expired.push(transaction.handle);
                }
            }
        }
        expired
    }

    /// Returns the next point in time at which a transaction needs attention.
    pub fn next_timeout(&self) -> Option<Instant> {
        let now = Instant::now();
        self.slots
            .iter()
            .flatten()
            .filter(|t| t.packet.is_some())
            .filter_map(|t| if t.send_pending { Some(now) } else { t.deadline })
            .min()
    }

    fn get(&self, handle: TransactionHandle) -> Option<&Transaction> {
        self.slots
            .get(handle.slot)?
            .as_ref()
            .filter(|t| t.handle == handle)
    }

    fn get_mut(&mut self, handle: TransactionHandle) -> Option<&mut Transaction> {
        self.slots
            .get_mut(handle.slot)?
            .as_mut()
            .filter(|t| t.handle == handle)
    }

    fn initial_timeout(&self) -> Duration {
        let factor = with_coap_prng(|rng| rng.gen_range(1.0..=self.ack_random_factor)).unwrap_or(1.0);
        self.ack_timeout.mul_f32(factor)
    }

}

impl Transaction {
    fn retransmittable(&self, max_retransmit: u8) -> bool {
        self.confirmable && !self.acknowledged && self.retransmissions < max_retransmit
    }
}

impl ReliableMessageLayer for TransactionTable {
    type Handle = TransactionHandle;

    fn next_message_id(&mut self) -> CoapMessageId {
        let mid = self.next_mid;
        self.next_mid = self.next_mid.wrapping_add(1);
        mid
    }

    fn new_transaction(&mut self, mid: CoapMessageId, endpoint: &CoapEndpoint) -> Option<TransactionHandle> {
        let timeout = self.initial_timeout();
        let slot = self.slots.iter().position(Option::is_none)?;
        self.generation = self.generation.wrapping_add(1);
        let handle = TransactionHandle {
            slot,
            generation: self.generation,
        };
        self.slots[slot] = Some(Transaction {
            handle,
            mid,
            endpoint: *endpoint,
            token: Box::default(),
            packet: None,
            confirmable: false,
            acknowledged: false,
            send_pending: false,
            retransmissions: 0,
            timeout,
            deadline: None,
        });
        Some(handle)
    }

    fn submit(&mut self, handle: TransactionHandle, packet: Vec<u8>) -> Result<(), TransactionError> {
        if packet.len() > self.mtu {
            self.release(handle);
            return Err(TransactionError::PacketTooLarge(packet.len()));
        }
        let transaction = self.get_mut(handle).ok_or(TransactionError::UnknownHandle)?;
        let header = packet.first().copied().unwrap_or_default();
        let token_len = usize::from(header & 0x0f);
        transaction.confirmable = CoapMessageType::from_bits(header >> 4) == CoapMessageType::Con;
        transaction.token = packet.get(4..4 + token_len).unwrap_or_default().into();
        transaction.packet = Some(packet);
        transaction.send_pending = true;
        Ok(())
    }
}
