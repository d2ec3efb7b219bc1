use criterion::{Criterion, criterion_group, criterion_main};
use milvus_ingest::records::{RecordReader, parse_embedding};
use std::fmt::Write;
use std::hint::black_box;

const DIMENSION: usize = 1536;

fn embedding_cell(seed: usize) -> String {
    let values: Vec<String> = (0..DIMENSION)
        .map(|i| format!("{:.8}", ((seed * DIMENSION + i) as f64).sin()))
        .collect();
    format!("[{}]", values.join(","))
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let cell = embedding_cell(0);
    c.bench_function("parse_embedding_1536", |b| {
        b.iter(|| parse_embedding(black_box(&cell)))
    });

    let mut csv = String::from("chunks,embedding,num_tokens\n");
    for row in 0..100 {
        writeln!(csv, "\"chunk {}\",\"{}\",{}", row, embedding_cell(row), row)
            .expect("can write to string");
    }
    c.bench_function("read_100_rows", |b| {
        b.iter(|| {
            RecordReader::new(black_box(csv.as_bytes()))
                .expect("header is valid")
                .count()
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
