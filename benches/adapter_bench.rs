//! ZDBKV - Performance Benchmarks
//! Measures the reply codec and the iteration/batch paths using Criterion.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use zdbkv::client::memory::MemoryTransport;
use zdbkv::client::resp::{encode_command, Reply};
use zdbkv::client::Client;
use zdbkv::engine::ZdbStore;

fn scan_reply(keys: usize) -> BytesMut {
    let entries = (0..keys)
        .map(|i| {
            Reply::Array(vec![
                Reply::Bulk(format!("key_{:06}", i).into()),
                Reply::Integer(12),
                Reply::Integer(1_700_000_000),
            ])
        })
        .collect();
    let reply = Reply::Array(vec![Reply::Bulk("cursor".into()), Reply::Array(entries)]);
    let mut buf = BytesMut::new();
    reply.encode(&mut buf);
    buf
}

fn seeded_store(size: usize, page_size: usize) -> ZdbStore<MemoryTransport> {
    let transport = MemoryTransport::new().with_page_size(page_size);
    for i in 0..size {
        let key = format!("key_{:06}", i);
        let value = format!("value_{:06}", i);
        transport.insert(key.as_bytes(), value.as_bytes());
    }
    ZdbStore::new(Client::new(transport))
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("resp");

    group.bench_function("encode_set", |b| {
        let mut buf = BytesMut::with_capacity(64);
        b.iter(|| {
            buf.clear();
            let args = [black_box(b"key_000001".as_slice()), b"value_000001".as_slice()];
            encode_command(&mut buf, "SET", &args);
        });
    });

    for keys in [1, 16, 256].iter() {
        let raw = scan_reply(*keys);
        group.bench_with_input(BenchmarkId::new("decode_scan_page", keys), &raw, |b, raw| {
            b.iter(|| {
                let mut buf = raw.clone();
                black_box(Reply::decode(&mut buf).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterator");

    for page_size in [1, 8, 64].iter() {
        let store = seeded_store(500, *page_size);
        group.bench_with_input(
            BenchmarkId::new("forward_500", page_size),
            &store,
            |b, store| {
                b.iter(|| {
                    let mut it = store.iterator(None, None).unwrap();
                    while it.valid() {
                        black_box(it.key().unwrap());
                        it.next().unwrap();
                    }
                });
            },
        );
    }

    let store = seeded_store(500, 8);
    group.bench_function("reverse_with_values_500", |b| {
        b.iter(|| {
            for entry in store.reverse_iterator(None, None).unwrap().entries() {
                black_box(entry.unwrap());
            }
        });
    });

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");

    group.bench_function("write_1000", |b| {
        let store = seeded_store(0, 8);
        b.iter(|| {
            let batch = store.new_batch();
            for i in 0..1000 {
                let key = format!("key_{:06}", i).into_bytes();
                batch.set(black_box(&key), b"value").unwrap();
            }
            batch.write().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_iteration, bench_batch);
criterion_main!(benches);
