//! Compiler throughput benchmarks.
//!
//!   cargo bench --bench compile_throughput

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mjc::{Lexer, compile_str};

const SIEVE: &str = r#"
program Sieve
  final int MAX = 1000;
  class Stats { int found; int largest; }
{
  void main()
    int i, j; char[] marks; Stats s;
  {
    marks = new char[MAX + 1];
    s = new Stats;
    i = 2;
    while (i * i <= MAX) {
      if (ord(marks[i]) == 0) {
        j = i * i;
        while (j <= MAX) { marks[j] = 'x'; j = j + i; }
      }
      i = i + 1;
    }
    i = 2;
    while (i <= MAX) {
      if (marks[i] != 'x') { s.found = s.found + 1; s.largest = i; }
      i = i + 1;
    }
    print(s.found, 6);
    print(s.largest, 6);
  }
}
"#;

/// A program with `n` small methods, to measure symbol table and emitter
/// cost as the program grows.
fn many_methods(n: usize) -> String {
    let mut src = String::from("program Many int acc;\n{\n");
    for i in 0..n {
        src.push_str(&format!(
            "  int m{i}(int a, int b) int t; {{ t = a * {i} + b; if (t > 100) t = t % 100; return t; }}\n"
        ));
    }
    src.push_str("  void main() {\n");
    for i in 0..n {
        src.push_str(&format!("    acc = acc + m{i}(acc, {i});\n"));
    }
    src.push_str("    print(acc);\n  }\n}\n");
    src
}

fn bench_lexer(c: &mut Criterion) {
    let source = many_methods(100);
    let mut group = c.benchmark_group("lexer");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("tokens_100_methods", |b| {
        b.iter(|| Lexer::from_str(black_box(&source)).count());
    });
    group.finish();
}

fn bench_sieve(c: &mut Criterion) {
    c.bench_function("compile_sieve", |b| {
        b.iter(|| {
            let compilation = compile_str(black_box(SIEVE));
            assert!(compilation.is_ok());
            compilation
        });
    });
}

fn bench_many_methods(c: &mut Criterion) {
    let source = many_methods(100);
    let mut group = c.benchmark_group("compile");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("many_methods_100", |b| {
        b.iter(|| compile_str(black_box(&source)));
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_lexer, bench_sieve, bench_many_methods
}

criterion_main!(benches);
