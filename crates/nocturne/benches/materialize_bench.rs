use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use nocturne::nocturne_sql::memory::MemoryCursor;
use nocturne::nocturne_sql::{Column, SqlType, SqlValue};
use nocturne::params;
use nocturne::{Session, Shape};

#[derive(Debug, Default, Shape)]
pub struct BenchUser {
    pub id: i32,
    pub name: String,
    pub age: i32,
    pub score: Option<f64>,
}

fn cursor(count: i32) -> MemoryCursor {
    MemoryCursor::new(
        vec![
            Column::new("ID", SqlType::Integer),
            Column::new("NAME", SqlType::Varchar),
            Column::new("AGE", SqlType::Integer),
            Column::new("SCORE", SqlType::Double),
        ],
        (0..count)
            .map(|i| {
                vec![
                    SqlValue::Int(i),
                    SqlValue::Text(format!("User {}", i)),
                    SqlValue::Int(i % 90),
                    if i % 3 == 0 {
                        SqlValue::Null
                    } else {
                        SqlValue::Double(i as f64 / 10.0)
                    },
                ]
            })
            .collect(),
    )
}

fn bench_materialize(c: &mut Criterion) {
    let session = Session::default();
    let mut group = c.benchmark_group("materialize");

    for &count in &[1_000, 100_000] {
        group.bench_with_input(BenchmarkId::new("shape", count), &count, |b, &count| {
            b.iter_batched(
                || cursor(count),
                |cursor| {
                    let users = session
                        .extractor::<BenchUser, _>(cursor)
                        .unwrap()
                        .extract_all()
                        .unwrap();
                    black_box(users)
                },
                criterion::BatchSize::LargeInput,
            )
        });

        group.bench_with_input(BenchmarkId::new("maps", count), &count, |b, &count| {
            b.iter_batched(
                || cursor(count),
                |cursor| black_box(session.map_extractor(cursor).extract_all().unwrap()),
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_parse(c: &mut Criterion) {
    let sql = "SELECT * FROM users WHERE id = :id AND (name = :name OR alias = :name) \
               AND note <> ':not_a_param' AND age BETWEEN :min_age AND :max_age";
    let session = Session::default();

    c.bench_function("extract_parameters", |b| {
        b.iter(|| black_box(params::extract(black_box(sql)).unwrap()))
    });
    c.bench_function("prepare_cached", |b| {
        b.iter(|| black_box(session.prepare(black_box(sql)).unwrap()))
    });
}

criterion_group!(benches, bench_materialize, bench_parse);
criterion_main!(benches);
