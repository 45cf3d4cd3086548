use criterion::{criterion_group, criterion_main, Criterion, BenchmarkId, Throughput};
use task_pool::{join_all, Config as PoolConfig, ThreadPool};
use std::hint::black_box;
use std::time::Duration;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: Submit overhead
fn bench_submit_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_overhead");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        // blocking wait
        group.bench_with_input(
            BenchmarkId::new("wait", size),
            &size,
            |b, &size| {
                let pool = ThreadPool::with_config(PoolConfig::default()).unwrap();

                b.iter(|| {
                    let handles: Vec<_> = (0..size)
                        .map(|i| pool.submit(move |_| black_box(i)))
                        .collect();

                    for handle in handles {
                        black_box(handle.wait().unwrap());
                    }
                });
            },
        );

        // async await
        group.bench_with_input(
            BenchmarkId::new("await", size),
            &size,
            |b, &size| {
                let rt = create_runtime();
                let pool = ThreadPool::with_config(PoolConfig::io_bound()).unwrap();
                let pool = &pool;

                b.to_async(&rt).iter(|| async move {
                    let handles: Vec<_> = (0..size)
                        .map(|i| pool.submit(move |_| black_box(i)))
                        .collect();
                    black_box(join_all(handles).await);
                });
            },
        );
    }

    group.finish();
}

// Benchmark 2: Масштабирование по числу воркеров
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.throughput(Throughput::Elements(1000));

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                let pool = ThreadPool::new(threads).unwrap();

                b.iter(|| {
                    let handles: Vec<_> = (0..1000u64)
                        .map(|i| {
                            pool.submit(move |_| {
                                let mut acc = i;
                                for _ in 0..1_000 {
                                    acc = black_box(acc.wrapping_mul(31).wrapping_add(7));
                                }
                                acc
                            })
                        })
                        .collect();

                    for handle in handles {
                        black_box(handle.wait().unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 3: Backpressure при маленькой очереди
fn bench_queue_capacity(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_capacity");
    group.throughput(Throughput::Elements(1000));

    for capacity in [1, 16, 1024] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let pool = ThreadPool::with_config(PoolConfig {
                    num_threads: 4,
                    queue_capacity: Some(capacity),
                    ..Default::default()
                })
                .unwrap();

                b.iter(|| {
                    let handles: Vec<_> = (0..1000)
                        .map(|i| pool.submit(move |_| black_box(i)))
                        .collect();

                    for handle in handles {
                        black_box(handle.wait().unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 4: Блокирующие задачи
fn bench_blocking_tasks(c: &mut Criterion) {
    let mut group = c.benchmark_group("blocking_tasks");
    group.sample_size(10);

    group.bench_function("100_tasks_1ms", |b| {
        let pool = ThreadPool::new(16).unwrap();

        b.iter(|| {
            let handles: Vec<_> = (0..100)
                .map(|i| {
                    pool.submit(move |_| {
                        std::thread::sleep(Duration::from_millis(1));
                        i
                    })
                })
                .collect();

            for handle in handles {
                black_box(handle.wait().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_overhead,
    bench_thread_scaling,
    bench_queue_capacity,
    bench_blocking_tasks,
);

criterion_main!(benches);
