// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * periodic.rs - Timers driving periodic resources.
 */

//! Timers driving periodic resources.

use std::time::{Duration, Instant};

use log::trace;

use crate::{
    registry::{ResourceId, ResourceRegistry},
    resource::{ResourceFlags, UntypedCoapResource},
};

#[derive(Debug, Clone, Copy)]
struct PeriodicTimer {
    resource: ResourceId,
    period: Duration,
    deadline: Instant,
}

/// Deadlines of all armed periodic resources.
#[derive(Debug, Default)]
pub struct PeriodicScheduler {
    timers: Vec<PeriodicTimer>,
}

impl PeriodicScheduler {
    pub fn new() -> PeriodicScheduler {
        PeriodicScheduler::default()
    }

    /// Arms a timer for the resource if it is eligible, i.e. has [ResourceFlags::IS_PERIODIC]
    /// set and a periodic handler with a non-zero period. The first deadline is `now + period`.
    ///
    /// Returns whether a timer was armed.
    pub fn arm(&mut self, id: ResourceId, resource: &dyn UntypedCoapResource, now: Instant) -> bool {
        let period = match periodic_period(resource) {
            Some(period) => period,
            None => return false,
        };
        trace!("periodic resource /{} armed, period {:?}", resource.uri_path(), period);
        self.timers.retain(|t| t.resource != id);
        self.timers.push(PeriodicTimer {
            resource: id,
            period,
            deadline: now + period,
        });
        true
    }

    /// Fires all timers whose deadline has passed and re-arms them to `now + period`.
    ///
    /// Before the registry is initialized, fires are swallowed but timers are still re-armed.
    /// Timers of resources that are gone or no longer periodic are dropped when they expire.
    /// Returns the number of periodic handlers that ran.
    pub fn fire_due(&mut self, now: Instant, registry: &mut ResourceRegistry) -> usize {
        let initialized = registry.is_initialized();
        let mut fired = 0;
        self.timers.retain_mut(|timer| {
            if timer.deadline > now {
                return true;
            }
            let Some(resource) = registry.get_mut(timer.resource) else {
                return false;
            };
            if periodic_period(resource).is_none() {
                trace!("periodic resource /{} is no longer periodic, timer dropped", resource.uri_path());
                return false;
            }
            trace!(
                "periodic: timer expired for /{} (period: {:?})",
                resource.uri_path(),
                timer.period
            );
            if initialized && resource.run_periodic() {
                fired += 1;
            }
            timer.deadline = now + timer.period;
            true
        });
        fired
    }

    /// Returns the earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|t| t.deadline).min()
    }

    /// Returns the deadline of the resource's timer, if it is armed.
    pub fn deadline_of(&self, id: ResourceId) -> Option<Instant> {
        self.timers.iter().find(|t| t.resource == id).map(|t| t.deadline)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

fn periodic_period(resource: &dyn UntypedCoapResource) -> Option<Duration> {
    if !resource.flags().contains(ResourceFlags::IS_PERIODIC) {
        return None;
    }
    resource.period().filter(|period| !period.is_zero())
}
