//! Statement cache benchmarks
//!
//! Compares repeated execution with the cache enabled against a
//! pass-through cache (every execution prepares and finalizes).
//!
//! ```bash
//! cargo bench --bench statement_cache_bench
//! cargo bench --bench statement_cache_bench -- "point_select"
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stmtcache::{ConnectionConfig, SqliteConnection, Value};

const ROWS: i64 = 1_000;

fn setup(config: ConnectionConfig) -> SqliteConnection {
    let conn = SqliteConnection::open_in_memory_with_config(config).unwrap();
    conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, score REAL)", ())
        .unwrap();
    conn.execute_many(
        "INSERT INTO users VALUES (?, ?, ?)",
        (0..ROWS).map(|i| vec![Value::from(i), Value::from(format!("user{}", i)), Value::from(i as f64 * 0.1)]),
    )
    .unwrap();
    conn
}

fn configs() -> [(&'static str, ConnectionConfig); 2] {
    [
        ("cached", ConnectionConfig::default()),
        ("uncached", ConnectionConfig::no_cache()),
    ]
}

fn bench_point_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_select");
    group.throughput(Throughput::Elements(1));

    for (name, config) in configs() {
        let conn = setup(config);
        let mut id = 0i64;
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                id = (id + 7) % ROWS;
                let rows = conn
                    .execute("SELECT name, score FROM users WHERE id = ?", [id])
                    .unwrap()
                    .fetch_all()
                    .unwrap();
                black_box(rows)
            })
        });
    }
    group.finish();
}

fn bench_execute_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_many");
    let batch = 100u64;
    group.throughput(Throughput::Elements(batch));

    for (name, config) in configs() {
        let conn = setup(config);
        conn.execute("CREATE TABLE events (n INTEGER)", ()).unwrap();
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                conn.execute_many("INSERT INTO events VALUES (?)", (0..batch as i64).map(|n| [n]))
                    .unwrap();
            })
        });
    }
    group.finish();
}

fn bench_multi_statement(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_statement");

    for (name, config) in configs() {
        let conn = setup(config);
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| {
                let rows = conn
                    .execute(
                        "SELECT count(*) FROM users; SELECT max(score) FROM users; SELECT name FROM users WHERE id = ?",
                        [42],
                    )
                    .unwrap()
                    .fetch_all()
                    .unwrap();
                black_box(rows)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_point_select, bench_execute_many, bench_multi_statement);
criterion_main!(benches);
