//! Roster benchmarks.
//!
//! Lookups are linear in roster size, so each operation runs against a few sizes.

use buddy_bench::{peer_id, roster};
use buddy_protocol::SessionInfo;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

const SIZES: [usize; 3] = [10, 100, 1000];

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("roster_connect");

    for size in SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| roster(black_box(size)));
        });
    }

    group.finish();
}

fn bench_invite_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("roster_invite_cycle");
    let session = SessionInfo::new("key", "chat-1");

    for size in SIZES {
        let mut list = roster(size);
        let last = peer_id(size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                list.sent_invite(black_box(&last), session.clone(), "token");
                let token = list.token_for_invitation_sent_to(&last).map(str::len);
                list.clear_invite(&last);
                token
            });
        });
    }

    group.finish();
}

fn bench_invitations(c: &mut Criterion) {
    let mut group = c.benchmark_group("roster_invitations");
    let session = SessionInfo::new("key", "chat-1");

    for size in SIZES {
        let mut list = roster(size);
        for n in (0..size).step_by(10) {
            list.received_invite(&peer_id(n), session.clone());
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(&list).invitations().len());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_connect, bench_invite_cycle, bench_invitations);
criterion_main!(benches);
