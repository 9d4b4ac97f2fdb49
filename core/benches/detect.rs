//! Detection benchmarks: the hot path.
//!
//! Measures: rule-count scaling, a miss-heavy prompt, cached injection end
//! to end, and compiling a large rule set.

use ctxi::prelude::*;
use serde_json::{json, Map, Value};

fn main() {
    divan::main();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Fixtures
// ═══════════════════════════════════════════════════════════════════════════════

const PROMPT: &str = "Can you help me plan the deploy of v2.3.1 to prod? \
    Last time the rollback took an hour and the postgres migration was slow.";

fn reader(id: &str) -> Result<String, ContentLoadError> {
    Ok(format!("reference material for {id}\n").repeat(20))
}

/// `n` rules; every fourth one carries a regex.
fn rules(n: usize) -> Value {
    let mut rules = Map::new();
    for i in 0..n {
        let mut triggers = json!({
            "keywords": [format!("term{i}"), "deploy", "rollback"],
            "keyword_combinations": [["postgres", "migration"]]
        });
        if i % 4 == 0 {
            triggers["regex_patterns"] = json!([r"v\d+\.\d+\.\d+", format!("term{i}-[a-z]+")]);
        }
        rules.insert(
            format!("rule{i:03}"),
            json!({
                "priority": i % 7,
                "triggers": triggers,
                "confidence_threshold": 0.3,
                "context_references": [format!("docs/{}.md", i % 5)],
                "notification_text": format!("rule {i}")
            }),
        );
    }
    json!({ "enabled": true, "rules": rules })
}

fn injector(n: usize) -> Injector {
    let config = InjectorConfig::from_value(rules(n), &SchemaValidator).unwrap();
    Injector::new(config, reader).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Benchmarks
// ═══════════════════════════════════════════════════════════════════════════════

#[divan::bench(args = [1, 10, 50, 200])]
fn detect_scaling(bencher: divan::Bencher, n: usize) {
    let injector = injector(n);
    bencher.bench_local(|| injector.detect(divan::black_box(PROMPT), "bench"));
}

#[divan::bench]
fn detect_miss(bencher: divan::Bencher) {
    let injector = injector(50);
    bencher.bench_local(|| injector.detect(divan::black_box("what's the weather like?"), "bench"));
}

#[divan::bench]
fn inject_cached(bencher: divan::Bencher) {
    let injector = injector(50);
    // warm the cache
    let _ = injector.inject(PROMPT, "bench", PROMPT.to_string());

    bencher.bench_local(|| injector.inject(PROMPT, "bench", divan::black_box(PROMPT.to_string())));
}

#[divan::bench]
fn compile_200_rules(bencher: divan::Bencher) {
    let config = InjectorConfig::from_value(rules(200), &SchemaValidator).unwrap();
    bencher.bench_local(|| ctxi::compile(divan::black_box(&config)));
}
