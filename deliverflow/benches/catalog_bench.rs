//! Benchmarks for catalog graph queries and rule validation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::collections::BTreeMap;

use deliverflow::catalog::{Catalog, DeliverableId};
use deliverflow::validation::{RuleValidator, Validator};

fn catalog_benchmark(c: &mut Criterion) {
    c.bench_function("catalog_standard_build", |b| b.iter(|| black_box(Catalog::standard())));

    let catalog = Catalog::standard();
    c.bench_function("execution_set_cascade", |b| {
        b.iter(|| black_box(catalog.execution_set(black_box(DeliverableId::Profile), true)));
    });
}

fn validation_benchmark(c: &mut Criterion) {
    let validator = RuleValidator::standard();
    let mut siblings = BTreeMap::new();
    siblings.insert(
        DeliverableId::Framework,
        json!({
            "title": "F",
            "blocks": [{"id": "b1", "title": "One"}, {"id": "b2", "title": "Two"}]
        }),
    );
    let timeline = json!({
        "segments": (0..50)
            .map(|week| json!({"block_id": if week % 2 == 0 { "b1" } else { "b2" }, "week": week}))
            .collect::<Vec<_>>()
    });

    c.bench_function("validate_timeline_crosslinks", |b| {
        b.iter(|| black_box(validator.validate(DeliverableId::Timeline, &timeline, &siblings)));
    });
}

criterion_group!(benches, catalog_benchmark, validation_benchmark);
criterion_main!(benches);
