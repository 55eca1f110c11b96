//! Benchmarks for analysis over programs of growing size

use analyzer::{analyze_source, AnalyzerConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Straight-line arithmetic with repeated subexpressions
fn generate_straight_line(lines: usize) -> String {
    let mut code = String::from("10 A = 3 : B = 4\n");
    for i in 0..lines {
        code.push_str(&format!("{} X{} = A * B + {} * 2\n", 20 + i * 10, i % 26, i));
    }
    code.push_str(&format!("{} END\n", 20 + lines * 10));
    code
}

/// Many small subroutines, each called from a branch
fn generate_branches(routines: usize) -> String {
    let mut code = String::new();
    let base = 1000;
    for i in 0..routines {
        code.push_str(&format!(
            "{} IF A > {} THEN GOSUB {} ELSE B = B + A * 2\n",
            10 + i * 10,
            i,
            base + i * 20
        ));
    }
    code.push_str(&format!("{} END\n", 10 + routines * 10));
    for i in 0..routines {
        code.push_str(&format!("{} C = A * 2 + B\n", base + i * 20));
        code.push_str(&format!("{} RETURN\n", base + i * 20 + 10));
    }
    code
}

/// Nested FOR loops over a two-dimensional array
fn generate_loops(depth: usize) -> String {
    let mut code = String::from("10 DIM M(20, 20)\n");
    let mut line = 20;
    for i in 0..depth {
        code.push_str(&format!("{} FOR I{} = 0 TO 20\n", line, i));
        line += 10;
    }
    code.push_str(&format!("{} M(I0, I0) = M(I0, I0) + K * 4\n", line));
    line += 10;
    for i in (0..depth).rev() {
        code.push_str(&format!("{} NEXT I{}\n", line, i));
        line += 10;
    }
    code
}

fn benchmark_group(c: &mut Criterion, name: &str, sizes: &[usize], generate: fn(usize) -> String) {
    let mut group = c.benchmark_group(name);

    for size in sizes {
        let code = generate(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &code, |b, code| {
            b.iter(|| {
                let result = analyze_source("bench.bas", black_box(code), AnalyzerConfig::default());
                black_box(result);
            });
        });
    }

    group.finish();
}

fn benchmark_straight_line(c: &mut Criterion) {
    benchmark_group(c, "straight_line", &[50, 200, 1000], generate_straight_line);
}

fn benchmark_branches(c: &mut Criterion) {
    benchmark_group(c, "branches", &[10, 50, 200], generate_branches);
}

fn benchmark_loops(c: &mut Criterion) {
    benchmark_group(c, "nested_loops", &[1, 2, 4], generate_loops);
}

criterion_group!(benches, benchmark_straight_line, benchmark_branches, benchmark_loops);
criterion_main!(benches);
