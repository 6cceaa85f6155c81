//! Throughput of the two hot paths an interpreter runs per script line:
//! variable substitution and command dispatch (SPEC_FULL.md §4.6 "Test
//! tooling").

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use wiretest_core::{GlobalVars, VarContext};
use wiretest_runtime::{register_builtins, substitute::substitute, CommandRegistry};
use wiretest_registry::HookDispatcher;

fn bench_substitute(c: &mut Criterion) {
    let mut ctx = VarContext::new(GlobalVars::new());
    ctx.set_worker("HOST", "127.0.0.1");
    ctx.set_worker("PORT", "4242");
    ctx.set_worker("NAME", "client1");

    let line = "connect to $HOST:$PORT as ${NAME} with timeout=$TIMEOUT_MS";
    c.bench_function("substitute/mixed_bare_and_braced", |b| {
        b.iter(|| substitute(black_box(line), black_box(&ctx)))
    });

    let literal = "no variables appear anywhere in this line of text";
    c.bench_function("substitute/no_variables", |b| {
        b.iter(|| substitute(black_box(literal), black_box(&ctx)))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut hooks = HookDispatcher::new();
    hooks.freeze();
    let hooks = Arc::new(hooks);
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, hooks);

    c.bench_function("dispatch/longest_prefix_hit", |b| {
        b.iter(|| registry.resolve(black_box("_LOG_LEVEL_SET")))
    });

    c.bench_function("dispatch/miss", |b| {
        b.iter(|| registry.resolve(black_box("_NOT_A_COMMAND")))
    });
}

criterion_group!(benches, bench_substitute, bench_dispatch);
criterion_main!(benches);
