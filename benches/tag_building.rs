//! Benchmarks for ad tag construction
//!
//! Tests the work done between the auction closing and the ad request:
//! picking the winning bid, price bucketing, and encoding the ad server URL.
//! It runs once per play action, inside the auction timeout budget.

use bidplay::auction::tag::price_bucket;
use bidplay::auction::{Bid, BidRequest, BidResult, TagParams, build_video_url};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::collections::BTreeMap;

/// Auction result with `bidder_count` bids at increasing prices
fn generate_result(bidder_count: usize) -> BidResult {
    let bids: BTreeMap<String, Bid> = (0..bidder_count)
        .map(|i| {
            let bidder = format!("bidder{:02}", i);
            let bid = Bid {
                bidder: bidder.clone(),
                cpm: 0.5 + i as f64 * 0.37,
                ad_id: format!("ad-{}", i),
                cache_id: Some(format!("cache-{:08x}", i * 7919)),
                vast_url: None,
                width: 640,
                height: 480,
            };
            (bidder, bid)
        })
        .collect();

    BidResult::Success {
        bids,
        auction_id: "bench-auction".to_string(),
    }
}

/// Publisher params with `extra` additional key-values
fn generate_params(extra: usize) -> TagParams {
    let mut params = TagParams::default();
    for i in 0..extra {
        params
            .cust_params
            .insert(format!("section{}", i), format!("news & sport/{}", i));
    }
    params
}

/// Benchmark tag building by auction size
fn bench_build_video_url(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_video_url");
    let ad_unit = BidRequest::default_video_unit();
    let params = TagParams::default();

    for bidder_count in [0, 1, 5, 20] {
        let result = generate_result(bidder_count);
        group.bench_with_input(
            BenchmarkId::new("bidders", bidder_count),
            &result,
            |b, result| {
                b.iter(|| {
                    build_video_url(black_box(&ad_unit), black_box(&params), black_box(result))
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

/// Benchmark the cust_params encoding by publisher key-value count
fn bench_cust_params(c: &mut Criterion) {
    let mut group = c.benchmark_group("cust_params");
    let ad_unit = BidRequest::default_video_unit();
    let result = generate_result(3);

    for extra in [0, 10, 50] {
        let params = generate_params(extra);
        group.bench_with_input(
            BenchmarkId::new("key_values", extra),
            &params,
            |b, params| {
                b.iter(|| {
                    build_video_url(black_box(&ad_unit), black_box(params), black_box(&result))
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

fn bench_price_bucket(c: &mut Criterion) {
    c.bench_function("price_bucket", |b| {
        b.iter(|| {
            for cpm in [0.0, 0.3, 1.234, 7.89, 25.0] {
                black_box(price_bucket(black_box(cpm)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_build_video_url,
    bench_cust_params,
    bench_price_bucket
);
criterion_main!(benches);
