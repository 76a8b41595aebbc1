//! Criterion benchmarks for the interval sweep and mutual slot search.
//!
//! Calendars are synthetic: each user has a working week of meetings with
//! staggered starts so the sets overlap partially.

use std::collections::BTreeMap;
use std::hint::black_box;

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use freetime_engine::interval::{complement, intersect_all, Interval};
use freetime_engine::{find_mutual_free_slots, AvailabilityQuery, Event, UserId};

fn week_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 16, 0, 0, 0).unwrap()
}

fn week() -> Interval {
    Interval::new(week_start(), week_start() + Duration::days(7)).unwrap()
}

/// `per_day` meetings a day for seven days, shifted by `seed` minutes.
fn meetings(seed: i64, per_day: i64) -> Vec<Event> {
    (0..7)
        .flat_map(|day| (0..per_day).map(move |slot| (day, slot)))
        .map(|(day, slot)| {
            let start = week_start()
                + Duration::days(day)
                + Duration::hours(8)
                + Duration::minutes(slot * 50 + (seed * 7) % 45);
            Event::new(
                format!("m{}-{}-{}", seed, day, slot),
                start,
                start + Duration::minutes(30 + (seed % 3) * 15),
            )
        })
        .collect()
}

fn calendars(users: i64, per_day: i64) -> BTreeMap<UserId, Vec<Event>> {
    (0..users)
        .map(|seed| (format!("user{}", seed), meetings(seed, per_day)))
        .collect()
}

fn bench_intersect_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("intersect_all");
    for users in [2i64, 8, 32] {
        let free_sets: Vec<Vec<Interval>> = calendars(users, 10)
            .values()
            .map(|events| {
                let busy: Vec<Interval> = events.iter().filter_map(|e| e.interval().ok()).collect();
                complement(&busy, week(), Duration::zero())
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(users), &free_sets, |b, sets| {
            b.iter(|| intersect_all(black_box(sets)));
        });
    }
    group.finish();
}

fn bench_mutual_free_slots(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_mutual_free_slots");
    for users in [2i64, 8, 32] {
        let per_user = calendars(users, 10);
        let query = AvailabilityQuery::new(per_user.keys().cloned(), week().start(), week().end())
            .with_excluded_hours(22, 7);

        group.bench_with_input(
            BenchmarkId::from_parameter(users),
            &(query, per_user),
            |b, (query, per_user)| {
                b.iter(|| find_mutual_free_slots(black_box(query), black_box(per_user)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_intersect_all, bench_mutual_free_slots);
criterion_main!(benches);
