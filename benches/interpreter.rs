use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use marsh::arithmetic::{self, ArithEnv, ArithmeticError};
use marsh::executor::Executor;
use marsh::lexer::{LexMode, Lexer};
use marsh::parser::Parser;
use std::collections::HashMap;
use std::time::Duration;

/// Front-end and arithmetic throughput. Nothing here forks, so the numbers
/// measure the interpreter rather than the operating system.

const SCRIPT: &str = r#"
count_words() {
    local n=0 word
    for word in "$@"; do
        case $word in
            -*) continue ;;
            *.rs|*.toml) n=$((n + 2)) ;;
            *) n=$((n + 1)) ;;
        esac
    done
    echo "$n"
}
while [[ $i -lt 10 ]]; do
    i=$((i + 1))
    if (( i % 2 == 0 )); then even+=($i); else odd="${odd:-}$i"; fi
done > /dev/null 2>&1
"#;

#[derive(Default)]
struct Vars(HashMap<String, i64>);

impl ArithEnv for Vars {
    fn get_var(&mut self, name: &str, _index: Option<i64>) -> Option<String> {
        self.0.get(name).map(|v| v.to_string())
    }

    fn set_var(
        &mut self,
        name: &str,
        _index: Option<i64>,
        value: i64,
    ) -> Result<(), ArithmeticError> {
        self.0.insert(name.to_string(), value);
        Ok(())
    }
}

fn bench_lex_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("front_end");
    group.measurement_time(Duration::from_secs(5));

    for copies in [1usize, 10, 100] {
        let source = SCRIPT.repeat(copies);
        group.bench_with_input(BenchmarkId::new("lex", copies), &source, |b, source| {
            b.iter(|| Lexer::tokenize(black_box(source), LexMode::Strict).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("lex_parse", copies), &source, |b, source| {
            b.iter(|| {
                let stream = Lexer::tokenize(black_box(source), LexMode::Strict).unwrap();
                Parser::new(stream.tokens).parse_program().unwrap()
            });
        });
    }
    group.finish();
}

fn bench_arithmetic(c: &mut Criterion) {
    let mut group = c.benchmark_group("arithmetic");
    let expressions = [
        ("literal", "42"),
        ("precedence", "1 + 2 * 3 - 4 / 2 % 3 ** 2"),
        ("variables", "x = y * 2 + z, x << 2 | 1"),
        ("ternary", "a > b ? (a - b) : (b - a) && !c"),
    ];
    for (name, expr) in expressions {
        group.bench_function(name, |b| {
            let mut vars = Vars::default();
            vars.0.insert("y".to_string(), 21);
            vars.0.insert("z".to_string(), 3);
            vars.0.insert("a".to_string(), 5);
            vars.0.insert("b".to_string(), 9);
            b.iter(|| arithmetic::evaluate(black_box(expr), &mut vars).unwrap());
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    c.bench_function("execute_loop_builtins", |b| {
        b.iter(|| {
            let mut exec = Executor::default();
            exec.run_string(black_box("i=0; s=; while (( i < 200 )); do s+=x; i=$((i + 1)); done"))
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_lex_parse, bench_arithmetic, bench_execute);
criterion_main!(benches);
