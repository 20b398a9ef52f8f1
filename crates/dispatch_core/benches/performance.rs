//! Performance benchmarks for dispatch_core using Criterion.rs.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::clock::ManualClock;
use dispatch_core::geo::GeoPoint;
use dispatch_core::presence::{GeoPresenceStore, InMemoryPresenceStore};
use dispatch_core::test_helpers::{TestHarness, TEST_PICKUP, TEST_START_MS};
use dispatch_core::{DispatchConfig, DispatchOutcome, DriverId, RideId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scatter `count` drivers within roughly 15 km of the test pickup.
fn scatter(store: &dyn GeoPresenceStore, count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..count {
        let driver = DriverId::new(format!("D{i}"));
        let position = GeoPoint::new(
            TEST_PICKUP.lng + rng.gen_range(-0.15..0.15),
            TEST_PICKUP.lat + rng.gen_range(-0.13..0.13),
        );
        store.update_location(&driver, position).expect("location");
        store
            .set_availability(&driver, rng.gen_bool(0.7))
            .expect("availability");
    }
}

fn bench_query_nearby(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_nearby");
    for fleet in [100, 1_000, 10_000] {
        let clock = Arc::new(ManualClock::new(TEST_START_MS));
        let store = InMemoryPresenceStore::new(&DispatchConfig::default(), clock);
        scatter(&store, fleet, 42);
        group.bench_with_input(BenchmarkId::from_parameter(fleet), &fleet, |b, _| {
            b.iter(|| black_box(store.query_nearby(TEST_PICKUP, 10.0, 10).expect("query")));
        });
    }
    group.finish();
}

fn bench_offer_cycle(c: &mut Criterion) {
    let harness = TestHarness::new();
    scatter(harness.dispatcher.ports().presence.as_ref(), 1_000, 7);
    let mut ride_seq = 0u64;

    c.bench_function("start_reject_cancel_1000_drivers", |b| {
        b.iter(|| {
            ride_seq += 1;
            let ride = RideId::new(format!("ride{ride_seq}"));
            let outcome = harness
                .dispatcher
                .start_dispatch(&ride, TEST_PICKUP, None)
                .expect("dispatch");
            if let DispatchOutcome::Offered { driver_id, .. } = outcome {
                // Reject keeps the driver available for the next iteration.
                black_box(
                    harness
                        .dispatcher
                        .respond_to_offer(&ride, &driver_id, false)
                        .expect("respond"),
                );
                harness.dispatcher.cancel_dispatch(&ride).ok();
            }
            harness.events.take();
        });
    });
}

criterion_group!(benches, bench_query_nearby, bench_offer_cycle);
criterion_main!(benches);
