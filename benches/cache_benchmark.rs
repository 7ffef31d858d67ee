use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{seq::SliceRandom, thread_rng, Rng};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use travel_gateway::hash_code::HashCodeBuilder;
use travel_gateway::ttl_cache::TtlCache;

// Concurrent offer-route lookups against the TTL cache, 30% writes and 70% reads
pub fn ttl_cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer_route_cache");

    for key_count in [100, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(key_count),
            key_count,
            |b, &key_count| {
                let offer_keys = (0..key_count)
                    .map(|i| format!("offer-{}", i))
                    .collect::<Vec<_>>();
                let providers = ["aa", "ua", "af", "lh"];

                b.iter(|| {
                    let cache = Arc::new(TtlCache::new(Duration::from_secs(1800)));

                    let mut handles = vec![];
                    for _ in 0..4 {
                        let cache = Arc::clone(&cache);
                        let offer_keys = offer_keys.clone();

                        let handle = thread::spawn(move || {
                            let mut rng = thread_rng();
                            for _ in 0..250 {
                                let key = offer_keys.choose(&mut rng).unwrap();
                                if rng.gen_bool(0.3) {
                                    let provider = providers.choose(&mut rng).unwrap();
                                    cache.put(key.clone(), provider.to_string());
                                } else {
                                    let _ = cache.get(key);
                                }
                            }
                        });

                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    black_box(cache.stats())
                });
            },
        );
    }

    group.finish();
}

pub fn hash_code_benchmark(c: &mut Criterion) {
    let mut rng = thread_rng();
    let amounts = (0..1_000)
        .map(|_| rng.gen_range(1.0..500.0))
        .collect::<Vec<f64>>();

    c.bench_function("option_code_hash", |b| {
        b.iter(|| {
            for amount in &amounts {
                black_box(
                    HashCodeBuilder::new()
                        .add("EXTRA LEGROOM")
                        .add("EUR")
                        .add(*amount)
                        .compute(),
                );
            }
        })
    });
}

criterion_group!(benches, ttl_cache_benchmark, hash_code_benchmark);
criterion_main!(benches);
