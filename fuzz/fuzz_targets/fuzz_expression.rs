#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pagesync_binding::{ExprValue, Expression};

#[derive(Debug, Arbitrary)]
enum Var {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

#[derive(Debug, Arbitrary)]
struct Input {
    source: String,
    vars: Vec<Var>,
}

fuzz_target!(|input: Input| {
    let Ok(expr) = Expression::parse(&input.source) else {
        return;
    };
    let vars: Vec<ExprValue> = input
        .vars
        .into_iter()
        .map(|var| match var {
            Var::Null => ExprValue::Null,
            Var::Bool(b) => ExprValue::Bool(b),
            Var::Number(n) => ExprValue::Number(n),
            Var::Str(s) => ExprValue::Str(s),
        })
        .collect();
    if let Ok(result) = expr.evaluate(&vars) {
        let _ = result.into_json();
    }
});
