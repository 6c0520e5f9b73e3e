use criterion::{criterion_group, criterion_main, Criterion};
use notes_core::tokenizer::tokenize;
use notes_core::KeywordIndex;

const NOTES: &str = "Weekly sync with platform team. Discussed the deployment pipeline, \
flaky integration tests and the Q3 hiring plan. Action: Ana to draft the migration \
checklist by Friday; Bo to review budget numbers with finance before the roadmap review.";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_notes", |b| b.iter(|| tokenize(NOTES)));
}

fn bench_ranked_search(c: &mut Criterion) {
    let index = KeywordIndex::from_documents((0..5_000u64).map(|id| (id, format!("{NOTES} meeting{}", id % 97))));
    c.bench_function("ranked_search_5k", |b| b.iter(|| index.ranked_search("pipeline budget meeting42", 5)));
}

criterion_group!(benches, bench_tokenize, bench_ranked_search);
criterion_main!(benches);
