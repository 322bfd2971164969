//! Benchmarks for the per-packet hot path

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fire_core::filter::{Denylist, ListFetcher};
use fire_core::packet::DnsQueryBuilder;
use fire_core::rules::{DomainRule, RuleStore};
use fire_core::store::{MemoryStore, SnapshotWriter};
use fire_core::{DnsInterceptor, Error, Result};
use std::io::BufRead;
use std::sync::Arc;

struct Offline;

impl ListFetcher for Offline {
    fn fetch(&self, url: &str) -> Result<Box<dyn BufRead + Send>> {
        Err(Error::fetch(url, "offline"))
    }
}

fn interceptor(denylist_size: usize) -> DnsInterceptor {
    let writer = Arc::new(SnapshotWriter::new(Arc::new(MemoryStore::new()), 64).unwrap());
    let rules = Arc::new(RuleStore::new(Arc::clone(&writer)));
    rules.add_domain_rule(DomainRule::new("*.tracker.net", true));

    let hosts: String = (0..denylist_size)
        .map(|i| format!("0.0.0.0 ads{i}.example.com\n"))
        .collect();
    let denylist = Arc::new(Denylist::new(writer, Arc::new(Offline)));
    denylist.load_from_reader(hosts.as_bytes()).unwrap();

    DnsInterceptor::new(rules, denylist)
}

fn bench_blocked_query(c: &mut Criterion) {
    let query = DnsQueryBuilder::new("cdn.ads42.example.com")
        .with_udp_checksum()
        .build();

    let mut group = c.benchmark_group("dns_intercept/blocked");
    group.throughput(Throughput::Bytes(query.len() as u64));
    for size in [100, 10_000, 100_000] {
        let interceptor = interceptor(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &query, |b, query| {
            b.iter(|| interceptor.process(black_box(query)));
        });
    }
    group.finish();
}

fn bench_allowed_query(c: &mut Criterion) {
    let interceptor = interceptor(10_000);
    let query = DnsQueryBuilder::new("www.example.org").build();

    c.bench_function("dns_intercept/allowed", |b| {
        b.iter(|| interceptor.process(black_box(&query)));
    });
}

criterion_group!(benches, bench_blocked_query, bench_allowed_query);
criterion_main!(benches);
