use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use query::QueryCompiler;

fn bench_compile(c: &mut Criterion) {
    let compiler = QueryCompiler::default();
    let mut group = c.benchmark_group("compile");

    for terms in [1usize, 8, 64, 512].iter() {
        let search = (0..*terms)
            .map(|i| match i % 4 {
                0 => format!("status{i}:A"),
                1 => format!("weight{}>={i}", i % 7),
                2 => format!("name{i}!:John"),
                _ => format!("price{}<{i}.5", i % 5),
            })
            .collect::<Vec<_>>()
            .join(" ");
        group.throughput(Throughput::Bytes(search.len() as u64));
        group.bench_function(format!("terms_{terms}"), |b| {
            b.iter(|| compiler.compile(black_box(&search)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile);
criterion_main!(benches);
