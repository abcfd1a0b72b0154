use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cluster_link::protocol::dictionary::{ReceiveDictionary, SendDictionary};

fn handler_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("app.stream.handler-{i}")).collect()
}

fn bench_send_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_dictionary");

    for count in [8usize, 64, 1024] {
        let names = handler_names(count);
        let mut dictionary = SendDictionary::new();
        for name in &names {
            dictionary.resolve(name);
        }

        group.bench_function(format!("resolve_known_{count}"), |b| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % names.len();
                black_box(dictionary.resolve(&names[i]))
            })
        });

        group.bench_function(format!("fill_{count}"), |b| {
            b.iter(|| {
                let mut fresh = SendDictionary::new();
                for name in &names {
                    fresh.resolve(name);
                }
                black_box(fresh.len())
            })
        });
    }
    group.finish();
}

fn bench_receive_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("receive_dictionary");
    let mut dictionary = ReceiveDictionary::new();
    for name in handler_names(1024) {
        dictionary.register(name);
    }

    group.bench_function("lookup_1024", |b| {
        let mut reference = 0u32;
        b.iter(|| {
            reference = reference % 1024 + 1;
            black_box(dictionary.lookup(reference))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_send_resolve, bench_receive_lookup);
criterion_main!(benches);
