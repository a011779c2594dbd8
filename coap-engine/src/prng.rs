// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * prng.rs - Engine-wide pseudo-random number generator.
 */

//! Module containing methods for accessing or configuring the engine-wide PRNG.
//!
//! The PRNG is used for initial message IDs, request tokens and retransmission jitter. By default,
//! it is a [StdRng] seeded from the operating system on first use.

use std::sync::Mutex;

use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};

use crate::error::RngError;

static COAP_RNG: Mutex<Option<Box<dyn RngCore + Send>>> = Mutex::new(None);

/// Runs `f` with exclusive access to the engine-wide PRNG.
pub(crate) fn with_coap_prng<T>(f: impl FnOnce(&mut dyn RngCore) -> T) -> Result<T, RngError> {
    let mut guard = COAP_RNG.lock()?;
    let rng = guard.get_or_insert_with(|| Box::new(StdRng::from_entropy()));
    Ok(f(rng.as_mut()))
}

/// Attempts to fill `dest` with random bytes using the engine PRNG.
///
/// # Errors
///
/// Will return an error if the PRNG fails or the underlying mutex was poisoned by a panic in
/// another thread.
///
/// # Example
///
/// ```
/// use coap_engine::error::RngError;
/// use coap_engine::prng::coap_prng_try_fill;
///
/// let mut token = [0u8; 8];
/// coap_prng_try_fill(&mut token)?;
///
/// # Result::<(), RngError>::Ok(())
/// ```
pub fn coap_prng_try_fill(dest: &mut [u8]) -> Result<(), RngError> {
    with_coap_prng(|rng| rng.try_fill_bytes(dest))?.map_err(RngError::from)
}

/// Replaces the engine PRNG with a [StdRng] seeded from `seed`, making subsequent message IDs and
/// tokens reproducible.
pub fn seed_coap_prng(seed: u64) -> Result<(), RngError> {
    let mut guard = COAP_RNG.lock()?;
    *guard = Some(Box::new(StdRng::seed_from_u64(seed)));
    Ok(())
}

/// Configures the engine to use the provided `rng` for pseudo-random number generation instead of
/// its default PRNG.
///
/// The provided PRNG will be used globally across all contexts.
///
/// # Example
///
/// ```
/// use rand_core::{CryptoRng, Error, RngCore};
/// use coap_engine::error::RngError;
/// use coap_engine::prng::{coap_prng_try_fill, set_coap_prng};
///
/// pub struct NullRng {}
///
/// impl RngCore for NullRng {
///     fn next_u32(&mut self) -> u32 {
///         0
///     }
///
///     fn next_u64(&mut self) -> u64 {
///         0
///     }
///
///     fn fill_bytes(&mut self, dest: &mut [u8]) {
///         dest.fill(0);
///     }
///
///     fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
///         dest.fill(0);
///         Ok(())
///     }
/// }
///
/// // Obviously, this is just for demonstration purposes and should not actually be done.
/// impl CryptoRng for NullRng {}
///
/// set_coap_prng(NullRng{})?;
/// let mut token = [1u8; 8];
/// coap_prng_try_fill(&mut token)?;
///
/// assert_eq!(&token, &[0u8; 8]);
///
/// # Result::<(), RngError>::Ok(())
/// ```
pub fn set_coap_prng<RNG: RngCore + CryptoRng + Send + 'static>(rng: RNG) -> Result<(), RngError> {
    let mut guard = COAP_RNG.lock()?;
    *guard = Some(Box::new(rng));
    Ok(())
}
