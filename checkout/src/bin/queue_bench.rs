//! Bounded queue throughput and handoff latency benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     QUEUE_CAPACITY=64  Belt capacity (default: 64)
//!     ITERATIONS=1000000 Items per run (default: 1 << 20)

use std::env;
use std::sync::Arc;
use std::thread;

use minstant::Instant;

use checkout::queue::BoundedQueue;

type Payload = u64;

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn bench_throughput(producers: usize, capacity: usize, iterations: usize) {
    let queue = Arc::new(BoundedQueue::<Payload>::new(capacity).unwrap());
    let per_producer = iterations / producers;
    let total = per_producer * producers;

    let consumer = {
        let queue = queue.clone();
        thread::spawn(move || {
            let mut last = vec![None::<Payload>; producers];
            for _ in 0..total {
                let (value, _) = queue.dequeue_blocking().unwrap();
                let producer = (value >> 32) as usize;
                let seq = value & 0xffff_ffff;
                // Items of one producer must come out in the order it put them in.
                if let Some(prev) = last[producer] {
                    assert!(seq > prev, "reordered: producer {producer} {prev} then {seq}");
                }
                last[producer] = Some(seq);
            }
        })
    };

    let start = Instant::now();

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..per_producer as Payload {
                    queue.enqueue_blocking(((p as Payload) << 32) | seq).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    consumer.join().unwrap();
    let elapsed = start.elapsed();

    let ops_per_ms = total as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    println!("{producers} producer(s), capacity {capacity}: {ops_per_ms} ops/ms");
}

fn bench_rtt(iterations: usize) {
    let ping = Arc::new(BoundedQueue::<Payload>::new(1).unwrap());
    let pong = Arc::new(BoundedQueue::<Payload>::new(1).unwrap());

    let responder = {
        let ping = ping.clone();
        let pong = pong.clone();
        thread::spawn(move || {
            for _ in 0..iterations {
                let (value, _) = ping.dequeue_blocking().unwrap();
                pong.enqueue_blocking(value).unwrap();
            }
        })
    };

    let start = Instant::now();
    for i in 0..iterations as Payload {
        ping.enqueue_blocking(i).unwrap();
        let (value, _) = pong.dequeue_blocking().unwrap();
        assert_eq!(value, i);
    }
    let elapsed = start.elapsed();
    responder.join().unwrap();

    let rtt_ns = elapsed.as_nanos() / iterations.max(1) as u128;
    println!("round trip: {rtt_ns} ns");
}

fn main() {
    let capacity = env_or("QUEUE_CAPACITY", 64);
    let iterations = env_or("ITERATIONS", 1 << 20);

    println!("capacity={capacity} iterations={iterations}");

    bench_throughput(1, capacity, iterations);
    bench_throughput(4, capacity, iterations);
    bench_rtt(iterations / 16);
}
