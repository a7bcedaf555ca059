use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use jit_policy::constraint::VariableSpec;
use jit_policy::policy::{Inputs, PolicyNode};
use jit_policy::{
    reformat, split_and, AccessControlList, AllowedEntry, ConstraintClass, EnvironmentPolicy,
    ExpiryConstraint, ExpressionConstraint, JitGroupId, JitGroupPolicy, Permission, Principal,
    PrincipalId, Subject, SystemPolicy, UserId,
};
use std::sync::Arc;

/// ACL with `size` group entries
fn create_acl(size: usize) -> AccessControlList {
    AccessControlList::new(
        (0..size)
            .map(|i| {
                AllowedEntry::new(
                    PrincipalId::group(format!("team-{}@example.com", i)),
                    Permission::JOIN | Permission::APPROVE_SELF,
                )
            })
            .collect(),
    )
}

fn create_subject(groups: usize) -> Subject {
    Subject::new(
        UserId::new("alice@example.com"),
        (0..groups).map(|i| Principal::permanent(PrincipalId::group(format!("team-{}@example.com", i)))),
    )
}

/// Environment with one system and one group carrying expiry and ticket constraints
fn create_environment() -> EnvironmentPolicy {
    let ticket = ExpressionConstraint::new(
        "ticket",
        "Ticket number",
        vec![VariableSpec::string("ticket", "Ticket", 1, 32)],
        "input.ticket.matches('^INC-[0-9]+$') && subject.email.endsWith('@example.com')",
    )
    .unwrap();
    let expiry = ExpiryConstraint::new(Duration::minutes(15), Duration::hours(2)).unwrap();

    let group = JitGroupPolicy::new(
        PolicyNode::new("admins", "")
            .unwrap()
            .with_acl(create_acl(20))
            .with_constraint(ConstraintClass::Join, Arc::new(expiry))
            .with_constraint(ConstraintClass::Join, Arc::new(ticket)),
    );
    let system = SystemPolicy::new(PolicyNode::new("db", "").unwrap())
        .with_group(group)
        .unwrap();
    EnvironmentPolicy::new(PolicyNode::new("prod", "").unwrap())
        .with_system(system)
        .unwrap()
}

/// Benchmark ACL evaluation against growing ACLs
fn bench_acl_is_allowed(c: &mut Criterion) {
    let mut group = c.benchmark_group("acl_is_allowed");

    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let acl = create_acl(size);
            let subject = create_subject(size);

            b.iter(|| {
                let allowed = acl.is_allowed(&subject, Permission::JOIN);
                black_box(allowed);
            });
        });
    }

    group.finish();
}

/// Benchmark full join analysis including constraint evaluation
fn bench_analyze_join(c: &mut Criterion) {
    let environment = create_environment();
    let context = environment
        .resolve(&JitGroupId::new("prod", "db", "admins"))
        .unwrap()
        .unwrap();
    let subject = create_subject(20);
    let inputs: Inputs = [("expiry", "PT1H"), ("ticket", "INC-1234")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    c.bench_function("analyze_join", |b| {
        b.iter(|| {
            let analysis = context.analyze_join(&subject, &inputs, Utc::now());
            black_box(analysis);
        });
    });
}

/// Benchmark condition splitting and canonical reformatting
fn bench_condition_handling(c: &mut Criterion) {
    let condition = "resource.name.startsWith('projects/_/buckets/logs') && \
                     request.time < timestamp('2030-01-01T00:00:00Z') && \
                     (resource.type == 'storage.googleapis.com/Bucket' || resource.type == 'storage.googleapis.com/Object')";

    let mut group = c.benchmark_group("condition");

    group.bench_function("split_and", |b| {
        b.iter(|| black_box(split_and(black_box(condition))));
    });

    group.bench_function("reformat", |b| {
        b.iter(|| black_box(reformat(black_box(condition)).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_acl_is_allowed,
    bench_analyze_join,
    bench_condition_handling
);
criterion_main!(benches);
