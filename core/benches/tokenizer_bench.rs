use criterion::{criterion_group, criterion_main, Criterion};
use jobdex_core::tokenizer::tokenize;

const LISTING: &str = "Senior Software Engineer. We are looking for an experienced engineer \
to design, build and maintain distributed systems. Responsibilities include code reviews, \
mentoring junior developers, and collaborating with product managers. Benefits: health \
insurance, 401k matching, flexible working hours, remote-friendly café culture.";

fn bench_tokenize(c: &mut Criterion) {
    let text = LISTING.repeat(64);
    c.bench_function("tokenize_listing", |b| b.iter(|| tokenize(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
