// SPDX-License-Identifier: BSD-2-Clause
/*
 * Copyright © The coap-engine Contributors, all rights reserved.
 * This file is part of the coap-engine project, see the README file for
 * general information on this project and the NOTICE.md and LICENSE files
 * for information regarding copyright ownership and terms of use.
 *
 * tests/periodic_test.rs - Tests for periodic resource timers.
 */

use std::time::{Duration, Instant};

use coap_engine::{
    periodic::PeriodicScheduler,
    registry::{ResourceId, ResourceRegistry},
    resource::ResourceFlags,
    CoapResource,
};

const PERIOD: Duration = Duration::from_secs(10);

fn tick(count: &mut u32) {
    *count += 1;
}

fn periodic_resource(flags: ResourceFlags, period: Duration) -> CoapResource<u32> {
    let mut resource = CoapResource::new(flags, 0u32);
    resource.set_periodic_handler(period, tick);
    resource
}

fn armed(
    registry: &mut ResourceRegistry,
    scheduler: &mut PeriodicScheduler,
    path: &str,
    resource: CoapResource<u32>,
    now: Instant,
) -> (ResourceId, bool) {
    let id = registry.register(path, resource).unwrap();
    let armed = scheduler.arm(id, registry.get(id).unwrap(), now);
    (id, armed)
}

fn ticks(registry: &ResourceRegistry, id: ResourceId) -> u32 {
    *registry.resource::<u32>(id).unwrap().user_data()
}

#[test]
pub fn only_eligible_resources_are_armed() {
    let now = Instant::now();
    let mut registry = ResourceRegistry::new();
    let mut scheduler = PeriodicScheduler::new();

    let (periodic, ok) = armed(
        &mut registry,
        &mut scheduler,
        "periodic",
        periodic_resource(ResourceFlags::IS_PERIODIC, PERIOD),
        now,
    );
    assert!(ok);
    assert_eq!(scheduler.deadline_of(periodic), Some(now + PERIOD));

    let (unflagged, ok) = armed(
        &mut registry,
        &mut scheduler,
        "unflagged",
        periodic_resource(ResourceFlags::empty(), PERIOD),
        now,
    );
    assert!(!ok);
    assert_eq!(scheduler.deadline_of(unflagged), None);

    let (zero, ok) = armed(
        &mut registry,
        &mut scheduler,
        "zero",
        periodic_resource(ResourceFlags::IS_PERIODIC, Duration::ZERO),
        now,
    );
    assert!(!ok);
    assert_eq!(scheduler.deadline_of(zero), None);

    let (handlerless, ok) = armed(
        &mut registry,
        &mut scheduler,
        "handlerless",
        CoapResource::new(ResourceFlags::IS_PERIODIC, 0u32),
        now,
    );
    assert!(!ok);
    assert_eq!(scheduler.deadline_of(handlerless), None);

    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.next_deadline(), Some(now + PERIOD));
}

#[test]
pub fn timers_fire_and_rearm() {
    let now = Instant::now();
    let mut registry = ResourceRegistry::new();
    let mut scheduler = PeriodicScheduler::new();
    let (id, _) = armed(
        &mut registry,
        &mut scheduler,
        "periodic",
        periodic_resource(ResourceFlags::IS_PERIODIC, PERIOD),
        now,
    );
    registry.init();

    assert_eq!(scheduler.fire_due(now + PERIOD / 2, &mut registry), 0);
    assert_eq!(ticks(&registry, id), 0);

    // Late fire, the next deadline is relative to the fire time.
    let late = now + PERIOD + Duration::from_secs(3);
    assert_eq!(scheduler.fire_due(late, &mut registry), 1);
    assert_eq!(ticks(&registry, id), 1);
    assert_eq!(scheduler.deadline_of(id), Some(late + PERIOD));

    assert_eq!(scheduler.fire_due(late + PERIOD, &mut registry), 1);
    assert_eq!(ticks(&registry, id), 2);
}

#[test]
pub fn fires_before_init_are_swallowed() {
    let now = Instant::now();
    let mut registry = ResourceRegistry::new();
    let mut scheduler = PeriodicScheduler::new();
    let (id, _) = armed(
        &mut registry,
        &mut scheduler,
        "periodic",
        periodic_resource(ResourceFlags::IS_PERIODIC, PERIOD),
        now,
    );

    assert_eq!(scheduler.fire_due(now + PERIOD, &mut registry), 0);
    assert_eq!(ticks(&registry, id), 0);
    assert_eq!(scheduler.deadline_of(id), Some(now + 2 * PERIOD));

    registry.init();
    assert_eq!(scheduler.fire_due(now + 2 * PERIOD, &mut registry), 1);
    assert_eq!(ticks(&registry, id), 1);
}

#[test]
pub fn rearming_replaces_timer() {
    let now = Instant::now();
    let mut registry = ResourceRegistry::new();
    let mut scheduler = PeriodicScheduler::new();
    let (id, _) = armed(
        &mut registry,
        &mut scheduler,
        "periodic",
        periodic_resource(ResourceFlags::IS_PERIODIC, PERIOD),
        now,
    );

    let later = now + Duration::from_secs(1);
    assert!(scheduler.arm(id, registry.get(id).unwrap(), later));
    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.deadline_of(id), Some(later + PERIOD));
}

#[test]
pub fn timers_of_resources_no_longer_periodic_are_dropped() {
    let now = Instant::now();
    let mut registry = ResourceRegistry::new();
    let mut scheduler = PeriodicScheduler::new();
    let (id, _) = armed(
        &mut registry,
        &mut scheduler,
        "periodic",
        periodic_resource(ResourceFlags::IS_PERIODIC, PERIOD),
        now,
    );
    let (other, _) = armed(
        &mut registry,
        &mut scheduler,
        "other",
        periodic_resource(ResourceFlags::IS_PERIODIC, 3 * PERIOD),
        now,
    );
    registry.init();
    registry
        .resource_mut::<u32>(id)
        .unwrap()
        .set_periodic_handler(Duration::ZERO, tick);

    let late = now + Duration::from_secs(60);
    assert_eq!(scheduler.fire_due(late, &mut registry), 1);
    assert_eq!(ticks(&registry, id), 0);
    assert_eq!(scheduler.deadline_of(id), None);
    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.next_deadline(), Some(late + 3 * PERIOD));
    assert_eq!(ticks(&registry, other), 1);
}
