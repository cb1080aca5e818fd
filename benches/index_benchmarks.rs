use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::Point;
use geocell::{GeoCellIndex, Geometry, GisOp};

fn point_wkb(x: f64, y: f64) -> Bytes {
    Geometry::from_geo(geo::Geometry::Point(Point::new(x, y)))
        .unwrap()
        .wkb_bytes()
}

/// Deterministic grid of points spread over a few degrees.
fn grid_rows(n: usize) -> Vec<Bytes> {
    (0..n)
        .map(|i| {
            let x = -74.0 + (i % 100) as f64 * 0.01;
            let y = 40.0 + (i / 100) as f64 * 0.01;
            point_wkb(x, y)
        })
        .collect()
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for n in [1_000, 10_000] {
        let rows = grid_rows(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| {
                let mut index = GeoCellIndex::in_memory(9).unwrap();
                index.build(black_box(rows)).unwrap();
                index
            })
        });
    }

    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    let rows = grid_rows(10_000);
    let mut index = GeoCellIndex::in_memory(9).unwrap();
    index.build(&rows).unwrap();
    let query = vec![point_wkb(-74.0, 40.0)];

    group.bench_function("is_in", |b| {
        b.iter(|| index.is_in(black_box(&query)).unwrap())
    });

    group.bench_function("exec_equals", |b| {
        b.iter(|| {
            index
                .exec_geo_relations(black_box(&query), GisOp::Equals)
                .unwrap()
        })
    });

    group.bench_function("serialize", |b| b.iter(|| index.serialize().unwrap()));

    group.finish();
}

criterion_group!(benches, benchmark_build, benchmark_queries);
criterion_main!(benches);
