//! Benchmarks for the compilation pipeline:
//! - provider tree → command text per dialect
//! - post-compile rendering of cached results
//! - DOM optimization and cloning
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use sqldom::ast::{
    CloneContext, Optimizer, QueryParameter, SqlAggregateType, SqlBinaryOperator, SqlColumn,
    SqlRef, SqlSelect, SqlType, VariantKey,
};
use sqldom::driver::{ConnectionInfo, Dialect, Driver, DriverFactory, ServerVersion};
use sqldom::postcompile::SqlPostCompilerConfiguration;
use sqldom::query::{AggregateColumn, Expr, JoinType, OrderItem, Provider};
use sqldom::schema::{TableBuilder, TableDef};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn users() -> Arc<TableDef> {
    Arc::new(
        TableBuilder::new("users")
            .schema("app")
            .column("id", SqlType::Int32)
            .column("name", SqlType::VarChar { length: Some(100) })
            .column("age", SqlType::Int16)
            .nullable_column("email", SqlType::VarChar { length: Some(200) })
            .key("id")
            .build()
            .unwrap(),
    )
}

fn orders() -> Arc<TableDef> {
    Arc::new(
        TableBuilder::new("orders")
            .schema("app")
            .column("id", SqlType::Int32)
            .column("user_id", SqlType::Int32)
            .column(
                "total",
                SqlType::Decimal {
                    precision: 18,
                    scale: 2,
                },
            )
            .key("id")
            .build()
            .unwrap(),
    )
}

fn cases(name: &QueryParameter) -> Vec<(&'static str, Provider)> {
    let scan = Provider::index(users());
    let filtered = scan
        .clone()
        .filter(Expr::eq(Expr::column(1), Expr::parameter(name)));
    let joined = scan.clone().join(Provider::index(orders()), JoinType::Inner, vec![(0, 1)]);
    let grouped = joined.clone().aggregate(
        vec![1],
        vec![AggregateColumn {
            name: "spent".into(),
            kind: SqlAggregateType::Sum,
            column: Some(6),
            ty: SqlType::Decimal {
                precision: 38,
                scale: 2,
            },
        }],
    );
    let paged = filtered
        .clone()
        .sort(vec![OrderItem::desc(2)])
        .paging(Expr::int(20), Expr::int(10));
    let nested = filtered
        .clone()
        .take(Expr::int(100))
        .filter(Expr::binary(SqlBinaryOperator::Gt, Expr::column(2), Expr::int(18)))
        .distinct();
    vec![
        ("scan", scan),
        ("filter", filtered),
        ("join", joined),
        ("aggregate", grouped),
        ("paging", paged),
        ("nested", nested),
    ]
}

fn drivers() -> Vec<(&'static str, Driver)> {
    [
        ("postgresql_8_4", Dialect::PostgreSql, ServerVersion::new(8, 4)),
        ("sqlserver_9", Dialect::SqlServer, ServerVersion::new(9, 0)),
        ("oracle_11", Dialect::Oracle, ServerVersion::new(11, 2)),
    ]
    .into_iter()
    .map(|(name, dialect, version)| {
        let driver = DriverFactory::create(&ConnectionInfo::new(dialect, version)).unwrap();
        (name, driver)
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Benchmark groups
// ---------------------------------------------------------------------------

fn bench_compilation(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation");
    let name = QueryParameter::new("name");

    for (driver_name, driver) in drivers() {
        for (case, provider) in cases(&name) {
            group.bench_with_input(
                BenchmarkId::new(driver_name, case),
                &provider,
                |b, provider| {
                    b.iter(|| driver.compile(black_box(provider)).unwrap());
                },
            );
        }
    }

    group.finish();
}

fn bench_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("rendering");
    let name = QueryParameter::new("name");
    let (_, driver) = drivers().remove(0);

    let frozen = driver.compile(&Provider::index(users())).unwrap();
    group.bench_function("frozen", |b| {
        b.iter(|| black_box(&frozen).command_text().unwrap());
    });

    let provider = Provider::index(users()).filter(Expr::eq(Expr::column(1), Expr::parameter(&name)));
    let chain = driver.compile(&provider).unwrap();
    let null_name = SqlPostCompilerConfiguration::new()
        .select_alternative(VariantKey::NullParameter(name.clone()));
    group.bench_function("variant_main", |b| {
        b.iter(|| black_box(&chain).command_text().unwrap());
    });
    group.bench_function("variant_alternative", |b| {
        b.iter(|| black_box(&chain).command_text_with(&null_name).unwrap());
    });

    group.finish();
}

fn wide_select(width: usize) -> SqlRef {
    let shared = SqlRef::column(Some("t0"), "x");
    let columns = (0..width)
        .map(|i| SqlColumn {
            expr: SqlRef::binary(
                SqlBinaryOperator::And,
                SqlRef::binary(SqlBinaryOperator::Gt, shared.clone(), SqlRef::integer(i as i64)),
                SqlRef::boolean(true),
            ),
            alias: Some(format!("c{i}")),
        })
        .collect();
    SqlRef::select(SqlSelect {
        columns,
        from: Some(SqlRef::table(None, "t", Some("t0"))),
        ..Default::default()
    })
}

fn bench_dom(c: &mut Criterion) {
    let mut group = c.benchmark_group("dom");
    let optimizer = Optimizer::with_defaults();

    for width in [10usize, 100] {
        group.bench_with_input(BenchmarkId::new("optimize", width), &width, |b, &width| {
            b.iter_batched(
                || wide_select(width),
                |statement| optimizer.optimize(&statement).unwrap(),
                BatchSize::SmallInput,
            );
        });

        let statement = wide_select(width);
        group.bench_with_input(BenchmarkId::new("deep_clone", width), &statement, |b, s| {
            b.iter(|| s.deep_clone(&mut CloneContext::new()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compilation, bench_rendering, bench_dom);
criterion_main!(benches);
