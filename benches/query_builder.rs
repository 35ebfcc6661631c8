use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rowguard::core::types::now;
use rowguard::entities::Task;
use rowguard::query::filter::by_id;
use rowguard::{Acl, CallerIdentity, Document, Model, QueryBuilder, RestrictedQueryBuilder};

fn criterion_benchmark(c: &mut Criterion) {
    let roles: Vec<String> = (0..8).map(|i| format!("role{}", i)).collect();
    let builder = RestrictedQueryBuilder::new(CallerIdentity::new("u1", roles));

    let mut task = Task::with_id("t1");
    let mut acl = Acl::new();
    acl.add_write("u1");
    task.set_acl(acl);
    task.increment("Claimed", 1).unwrap();

    c.bench_function("restricted_find_query", |b| {
        b.iter(|| builder.make_find_query(black_box("Task"), by_id("t1")))
    });

    c.bench_function("restricted_count_query", |b| {
        b.iter(|| builder.make_count_query(black_box("Task"), Document::new()))
    });

    c.bench_function("restricted_change_document", |b| {
        b.iter(|| builder.make_change_document(black_box(&task), now()).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
