//! Compares `conflux::stream::pipe` against `crossbeam_channel::bounded`
//! directly and `std::sync::mpsc::sync_channel`, at a few buffer sizes, for
//! a single producer thread handing off to a single consumer thread.
//!
//! Run with: cargo bench --bench spsc

use criterion::{Criterion, criterion_group, criterion_main};

use conflux::stream::pipe;

const TOTAL_MESSAGES: usize = 10_000;

fn conflux_pipe(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_conflux_pipe");
    for capacity in [1usize, 64, 1024] {
        group.bench_function(format!("capacity_{capacity}"), |b| {
            b.iter(|| {
                let (tx, rx) = pipe::<usize>(capacity);
                let producer = std::thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i);
                    }
                    tx.close();
                });
                let mut count = 0usize;
                while !rx.recv().unwrap().is_eof() {
                    count += 1;
                }
                producer.join().unwrap();
                count
            })
        });
    }
    group.finish();
}

fn crossbeam_bounded(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_crossbeam_bounded");
    for capacity in [1usize, 64, 1024] {
        group.bench_function(format!("capacity_{capacity}"), |b| {
            b.iter(|| {
                let (tx, rx) = crossbeam_channel::bounded::<usize>(capacity);
                let producer = std::thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                });
                let mut count = 0usize;
                while rx.recv().is_ok() {
                    count += 1;
                }
                producer.join().unwrap();
                count
            })
        });
    }
    group.finish();
}

fn std_sync_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("spsc_std_sync_channel");
    for capacity in [1usize, 64, 1024] {
        group.bench_function(format!("capacity_{capacity}"), |b| {
            b.iter(|| {
                let (tx, rx) = std::sync::mpsc::sync_channel::<usize>(capacity);
                let producer = std::thread::spawn(move || {
                    for i in 0..TOTAL_MESSAGES {
                        tx.send(i).unwrap();
                    }
                });
                let mut count = 0usize;
                while rx.recv().is_ok() {
                    count += 1;
                }
                producer.join().unwrap();
                count
            })
        });
    }
    group.finish();
}

criterion_group!(spsc, conflux_pipe, crossbeam_bounded, std_sync_channel);
criterion_main!(spsc);
