use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use triplo::{PipelineConfig, Session};

const VOCABULARY: [&str; 12] = [
    "red", "green", "apple", "pear", "fresh", "ripe", "juice", "pie", "crisp", "sweet", "tart",
    "organic",
];

fn build_table(rows: usize) -> String {
    let mut table = String::from("text\tid\n");
    for row in 0..rows {
        let words: Vec<&str> = (0..6)
            .map(|offset| VOCABULARY[(row * 7 + offset * 5) % VOCABULARY.len()])
            .collect();
        table.push_str(&format!("{} [att:size]{}[/att]\tr{row}\n", words.join(" "), row % 4));
    }
    table
}

fn bench_generation(c: &mut Criterion) {
    let cfg = PipelineConfig::builder()
        .show_progress(false)
        .build()
        .expect("configuration");

    let mut group = c.benchmark_group("generate_training_sets");
    group.sampling_mode(SamplingMode::Flat);
    for rows in [256usize, 2048] {
        let table = build_table(rows);
        let mut session = Session::new(cfg.clone()).expect("session");
        session.load_tsv(&table).expect("load table");
        for word in ["apple", "pear"] {
            if let Some(id) = session.dictionary().word_id(word) {
                session.set_primary(id, true);
            }
        }

        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &session, |b, session| {
            b.iter(|| {
                let mut session = session.clone();
                let catalog = session.generate_training_sets().expect("generation");
                black_box(catalog.len());
            });
        });
    }
    group.finish();
}

fn bench_tokenization(c: &mut Criterion) {
    let table = build_table(2048);
    let cfg = PipelineConfig::builder()
        .show_progress(false)
        .build()
        .expect("configuration");

    c.bench_function("load_tsv_2048", |b| {
        b.iter(|| {
            let mut session = Session::new(cfg.clone()).expect("session");
            session.load_tsv(black_box(&table)).expect("load table");
            black_box(session.dictionary().len());
        });
    });
}

criterion_group!(benches, bench_generation, bench_tokenization);
criterion_main!(benches);
