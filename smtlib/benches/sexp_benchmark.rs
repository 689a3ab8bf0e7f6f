// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use smtlib::{reader::SexpReader, sexp};
use std::io::Cursor;

const MODEL: &str = "(model
  (define-fun x!1 () quorum quorum!val!2)
  (define-fun k!1058 ((x!0 node)) node
    (ite (= x!0 node!val!13) node!val!13 node!val!4))
)
";

pub fn sexp_parse_benchmark(c: &mut Criterion) {
    let s = black_box(
        "(and (= (k!1058 x!0) node!val!13)
             (= x!1 quorum!val!2)
             (not (= x!1 quorum!val!4))
             (not (= x!1 quorum!val!5)))",
    );
    c.bench_function("sexp::parse", |b| b.iter(|| sexp::parse(s)));
}

pub fn sexp_reader_benchmark(c: &mut Criterion) {
    let out = black_box(format!("sat\n{MODEL}<<DONE>>\n").repeat(20));
    c.bench_function("SexpReader", |b| {
        b.iter(|| SexpReader::new(Cursor::new(out.as_bytes())).count())
    });
}

criterion_group!(benches, sexp_parse_benchmark, sexp_reader_benchmark);
criterion_main!(benches);
