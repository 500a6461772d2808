use std::hint::black_box;

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use isc_binding::charset::Charset;
use isc_binding::decode::decode_var;
use isc_binding::ibase::Xsqlvar;
use isc_binding::memory::{ColumnDef, MemoryServer};
use isc_binding::params::bind_value;
use isc_binding::prelude::*;

const CURRENCIES: &[&str] = &["CdnDlr", "FFranc", "Lira", "Yen", "Real", "Euro"];

// Deterministic rows so runs are comparable
fn generate_rows(count: usize) -> Vec<Vec<Value>> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let day = NaiveDate::from_ymd_opt(
                rng.random_range(1990..=2025),
                rng.random_range(1..=12),
                rng.random_range(1..=28),
            )
            .unwrap();
            vec![
                Value::from("Dollar"),
                Value::from(CURRENCIES[rng.random_range(0..CURRENCIES.len())]),
                Value::Float(rng.random_range(0.0..2000.0)),
                if rng.random_bool(0.1) {
                    Value::Null
                } else {
                    Value::Date(day)
                },
            ]
        })
        .collect()
}

fn encoded_slots(row: &[Value]) -> Vec<Xsqlvar> {
    row.iter()
        .map(|value| {
            let mut var = Xsqlvar::default();
            bind_value(&mut var, value, &Charset::UTF8).unwrap();
            var
        })
        .collect()
}

fn benchmark_decode(c: &mut Criterion) {
    let rows: Vec<Vec<Xsqlvar>> = generate_rows(1_000).iter().map(|r| encoded_slots(r)).collect();

    let mut group = c.benchmark_group("decode");
    group.bench_function(BenchmarkId::new("decode_var", "1k_rows"), |b| {
        b.iter(|| {
            for slots in &rows {
                for var in slots {
                    black_box(decode_var(black_box(var), &Charset::UTF8).unwrap());
                }
            }
        });
    });
    group.finish();
}

fn benchmark_memory_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_query");
    for count in [100usize, 10_000] {
        let server = MemoryServer::new();
        server.create_database("bench");
        server
            .create_table(
                "bench",
                "cross_rate",
                vec![
                    ColumnDef::varchar("from_currency", 10),
                    ColumnDef::varchar("to_currency", 10),
                    ColumnDef::double("conv_rate"),
                    ColumnDef::date("update_date"),
                ],
            )
            .unwrap();

        let opts = ConnectionOptions::new("bench", "SYSDBA", "masterkey");
        let mut conn = Connection::open(server.client(), &opts).unwrap();
        {
            let mut tr = conn.begin().unwrap();
            for row in generate_rows(count) {
                tr.execute("insert into cross_rate values (?, ?, ?, ?)", &row)
                    .unwrap();
            }
            tr.commit().unwrap();
        }

        group.bench_function(BenchmarkId::new("fetch_all", count), |b| {
            b.iter(|| {
                let mut tr = conn.begin().unwrap();
                let rows = tr.query("select * from cross_rate", &[]).unwrap();
                tr.commit().unwrap();
                black_box(rows.len())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_decode, benchmark_memory_query);
criterion_main!(benches);
