// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * config.rs - Engine configuration.
 */

//! Engine configuration.
//!
//! [CoapConfig] bundles socket addresses, block-wise transfer limits and the transmission
//! parameters of [RFC 7252, Section 4.8](https://datatracker.ietf.org/doc/html/rfc7252#section-4.8).
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use coap_engine::config::CoapConfig;
//!
//! let config = CoapConfig::builder()
//!     .bind_addr("127.0.0.1:0".parse().unwrap())
//!     .max_chunk_size(32)
//!     .ack_timeout(Duration::from_millis(500))
//!     .build()?;
//! assert_eq!(config.max_chunk_size(), 32);
//! # Result::<(), coap_engine::error::ContextConfigurationError>::Ok(())
//! ```

use std::{
    net::{IpAddr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use crate::{
    error::ContextConfigurationError,
    message::block::szx_for_size,
    protocol::{
        COAP_DEFAULT_ACK_RANDOM_FACTOR, COAP_DEFAULT_ACK_TIMEOUT_MS, COAP_DEFAULT_MAX_RETRANSMIT, COAP_DEFAULT_PORT,
        COAP_MAX_ATTEMPTS, COAP_MAX_OPEN_TRANSACTIONS, REST_MAX_CHUNK_SIZE,
    },
    transport::{EndpointMtu, COAP_DEFAULT_MTU},
};

/// Upper bound for [CoapConfig::max_transmit_wait].
pub const MAX_TRANSMIT_WAIT_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Validated configuration of a [CoapContext](crate::CoapContext).
#[derive(Clone, Debug, PartialEq)]
pub struct CoapConfig {
    bind_addr: SocketAddr,
    secure_bind_addr: Option<SocketAddr>,
    max_chunk_size: u16,
    max_attempts: u8,
    max_open_transactions: usize,
    ack_timeout: Duration,
    ack_random_factor: f32,
    max_retransmit: u8,
    mtu: EndpointMtu,
}

impl Default for CoapConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), COAP_DEFAULT_PORT),
            secure_bind_addr: None,
            max_chunk_size: REST_MAX_CHUNK_SIZE,
            max_attempts: COAP_MAX_ATTEMPTS,
            max_open_transactions: COAP_MAX_OPEN_TRANSACTIONS,
            ack_timeout: Duration::from_millis(COAP_DEFAULT_ACK_TIMEOUT_MS),
            ack_random_factor: COAP_DEFAULT_ACK_RANDOM_FACTOR,
            max_retransmit: COAP_DEFAULT_MAX_RETRANSMIT,
            mtu: COAP_DEFAULT_MTU,
        }
    }
}

impl CoapConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> CoapConfigBuilder {
        CoapConfigBuilder {
            config: CoapConfig::default(),
        }
    }

    /// Address of the plaintext socket.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Address of the DTLS socket, if one should be opened.
    pub fn secure_bind_addr(&self) -> Option<SocketAddr> {
        self.secure_bind_addr
    }

    /// Block size for block-wise transfers and size of the handler output buffer.
    pub fn max_chunk_size(&self) -> u16 {
        self.max_chunk_size
    }

    /// Number of mismatching blocks a block-wise request tolerates.
    pub fn max_attempts(&self) -> u8 {
        self.max_attempts
    }

    pub fn max_open_transactions(&self) -> usize {
        self.max_open_transactions
    }

    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    pub fn ack_random_factor(&self) -> f32 {
        self.ack_random_factor
    }

    pub fn max_retransmit(&self) -> u8 {
        self.max_retransmit
    }

    /// Largest datagram sent through the sockets.
    pub fn mtu(&self) -> EndpointMtu {
        self.mtu
    }

    /// Longest time a confirmable exchange may stay open, i.e.
    /// `ack_timeout * ack_random_factor * 2^max_retransmit`.
    ///
    /// Returns `None` if the value is not representable.
    pub fn max_transmit_wait(&self) -> Option<Duration> {
        let initial = Duration::try_from_secs_f32(self.ack_timeout.as_secs_f32() * self.ack_random_factor).ok()?;
        initial.checked_mul(1u32.checked_shl(u32::from(self.max_retransmit))?)
    }
}

/// Builder for [`CoapConfig`].
#[derive(Clone, Debug)]
pub struct CoapConfigBuilder {
    config: CoapConfig,
}

impl CoapConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Open a second socket for DTLS traffic at `addr`.
    pub fn secure_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.secure_bind_addr = Some(addr);
        self
    }

    pub fn max_chunk_size(mut self, size: u16) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    pub fn max_attempts(mut self, attempts: u8) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn max_open_transactions(mut self, count: usize) -> Self {
        self.config.max_open_transactions = count;
        self
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    pub fn ack_random_factor(mut self, factor: f32) -> Self {
        self.config.ack_random_factor = factor;
        self
    }

    pub fn max_retransmit(mut self, count: u8) -> Self {
        self.config.max_retransmit = count;
        self
    }

    pub fn mtu(mut self, mtu: EndpointMtu) -> Self {
        self.config.mtu = mtu;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk size is not a power of two between 16 and 1024, if a limit
    /// is zero, if the ACK random factor is below 1.0 or not finite, or if the resulting
    /// [maximum transmit wait](CoapConfig::max_transmit_wait) exceeds [MAX_TRANSMIT_WAIT_LIMIT].
    pub fn build(self) -> Result<CoapConfig, ContextConfigurationError> {
        let config = self.config;
        if szx_for_size(config.max_chunk_size).is_none() {
            return Err(ContextConfigurationError::InvalidBlockSize(config.max_chunk_size));
        }
        if config.max_attempts == 0 {
            return Err(ContextConfigurationError::ZeroLimit("max_attempts"));
        }
        if config.max_open_transactions == 0 {
            return Err(ContextConfigurationError::ZeroLimit("max_open_transactions"));
        }
        if config.mtu == 0 {
            return Err(ContextConfigurationError::ZeroLimit("mtu"));
        }
        if config.ack_timeout.is_zero() {
            return Err(ContextConfigurationError::ZeroLimit("ack_timeout"));
        }
        if !(config.ack_random_factor >= 1.0 && config.ack_random_factor.is_finite()) {
            return Err(ContextConfigurationError::InvalidRandomFactor);
        }
        match config.max_transmit_wait() {
            Some(wait) if wait <= MAX_TRANSMIT_WAIT_LIMIT => {},
            _ => return Err(ContextConfigurationError::TransmitWaitOutOfRange),
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CoapConfig::builder().build().unwrap();
        assert_eq!(config, CoapConfig::default());
        assert_eq!(config.bind_addr().port(), 5683);
        assert_eq!(config.secure_bind_addr(), None);
        assert_eq!(config.max_chunk_size(), 64);
        assert_eq!(config.max_attempts(), 4);
        assert_eq!(config.mtu(), COAP_DEFAULT_MTU);
    }

    #[test]
    fn rejects_invalid_values() {
        assert_eq!(
            CoapConfig::builder().max_chunk_size(48).build(),
            Err(ContextConfigurationError::InvalidBlockSize(48))
        );
        assert_eq!(
            CoapConfig::builder().max_open_transactions(0).build(),
            Err(ContextConfigurationError::ZeroLimit("max_open_transactions"))
        );
        assert_eq!(
            CoapConfig::builder().mtu(0).build(),
            Err(ContextConfigurationError::ZeroLimit("mtu"))
        );
        assert_eq!(
            CoapConfig::builder().ack_random_factor(0.5).build(),
            Err(ContextConfigurationError::InvalidRandomFactor)
        );
    }

    #[test]
    fn rejects_unbounded_transmission_parameters() {
        for factor in [f32::INFINITY, f32::NAN, f32::NEG_INFINITY] {
            assert_eq!(
                CoapConfig::builder().ack_random_factor(factor).build(),
                Err(ContextConfigurationError::InvalidRandomFactor)
            );
        }
        assert_eq!(
            CoapConfig::builder().ack_random_factor(f32::MAX).build(),
            Err(ContextConfigurationError::TransmitWaitOutOfRange)
        );
        assert_eq!(
            CoapConfig::builder().ack_timeout(Duration::MAX).build(),
            Err(ContextConfigurationError::TransmitWaitOutOfRange)
        );
        assert_eq!(
            CoapConfig::builder().max_retransmit(40).build(),
            Err(ContextConfigurationError::TransmitWaitOutOfRange)
        );
        assert_eq!(
            CoapConfig::builder()
                .ack_timeout(Duration::from_secs(60 * 60))
                .max_retransmit(10)
                .build(),
            Err(ContextConfigurationError::TransmitWaitOutOfRange)
        );
    }

    #[test]
    fn default_transmit_wait() {
        // 2 s * 1.5 * 2^4
        let wait = CoapConfig::default().max_transmit_wait().unwrap();
        assert!(wait > Duration::from_millis(47_990) && wait < Duration::from_millis(48_010));
    }
}
