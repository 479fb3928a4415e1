//! Benchmarks for script compilation and execution
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pointflow::offload::BatchBuffer;
use pointflow::pipeline::{normalize_status, RunOptions};
use pointflow::scripting::grok::GrokPattern;
use pointflow::scripting::parse;
use pointflow::{Category, CompiledScript, Namespace, Point};

const NGINX_LINE: &str = r#"10.0.0.1 - - [19/Oct/2026:10:00:00 +0000] "GET /api/v1/users HTTP/1.1" 200 512"#;

const NGINX_SCRIPT: &str = r#"
grok(_, "%{IPORHOST:client_ip} %{NOTSPACE} %{NOTSPACE} \\[%{HTTPDATE:time_local}\\] \"%{WORD:method} %{URIPATHPARAM:url} HTTP/%{NUMBER:http_version}\" %{INT:status:int} %{INT:bytes:int}")
if status >= 500 {
    set_tag(level, "error")
} elif status >= 400 {
    set_tag(level, "warning")
} else {
    set_tag(level, "info")
}
rename(size, bytes)
lowercase(method)
"#;

fn access_point() -> Point {
    Point::new("nginx", Category::Logging).with_field("message", NGINX_LINE)
}

fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_nginx_script", |b| {
        b.iter(|| parse(black_box(NGINX_SCRIPT)))
    });
}

fn bench_grok(c: &mut Criterion) {
    let mut group = c.benchmark_group("grok");

    group.bench_function("compile", |b| {
        b.iter(|| GrokPattern::compile(black_box("%{IP:client} %{WORD:method} %{NOTSPACE:path}")))
    });

    let pattern = GrokPattern::compile("%{IP:client} %{WORD:method} %{NOTSPACE:path}")
        .unwrap_or_else(|e| panic!("bad pattern: {e}"));
    group.bench_function("captures", |b| {
        b.iter(|| pattern.captures(black_box("10.0.0.1 GET /index.html")))
    });

    group.finish();
}

fn bench_script_run(c: &mut Criterion) {
    let script = CompiledScript::compile(Category::Logging, Namespace::Default, "nginx.p", NGINX_SCRIPT)
        .unwrap_or_else(|e| panic!("compile failed: {e}"));
    let opts = RunOptions::default();
    let template = access_point();

    let mut group = c.benchmark_group("script_run");
    group.throughput(Throughput::Elements(1));
    group.bench_function("nginx_access", |b| {
        b.iter(|| {
            let mut point = template.clone();
            let _ = script.run(black_box(&mut point), None, &opts);
            point
        })
    });
    group.finish();
}

fn bench_status_normalization(c: &mut Criterion) {
    c.bench_function("normalize_status", |b| {
        b.iter(|| {
            for raw in ["E", "warn", "Info", "trace", "ok", "custom", ""] {
                black_box(normalize_status(black_box(raw)));
            }
        })
    });
}

fn bench_batching(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_buffer");

    for size in [10usize, 128, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("push", size), size, |b, &size| {
            let points: Vec<Point> = (0..size).map(|_| access_point()).collect();
            b.iter(|| {
                let mut buf = BatchBuffer::default();
                let full = buf.push(points.clone());
                black_box((full, buf.take()))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_grok,
    bench_script_run,
    bench_status_normalization,
    bench_batching,
);

criterion_main!(benches);
