use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eeprobe_cnt::compress::block::{decode_row, encode_row, Format};
use eeprobe_cnt::types::EncodingSize;

fn linear_ramp(len: usize) -> Vec<i64> {
    (0..len as i64).collect()
}

fn noisy(len: usize) -> Vec<i64> {
    (0..len as i64).map(|i| (i * 2654435761 % 65536) - 32768).collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let ramp = linear_ramp(1024);
    let encoded_ramp = encode_row(&ramp, None, Format::Extended, EncodingSize::FourBytes).unwrap();

    c.bench_function("encode_row-time-1024", |b| {
        b.iter(|| {
            black_box(encode_row(&ramp, None, Format::Extended, EncodingSize::FourBytes).unwrap());
        })
    });

    c.bench_function("decode_row-time-1024", |b| {
        b.iter(|| {
            black_box(decode_row(&encoded_ramp, ramp.len(), None, Format::Extended).unwrap());
        })
    });

    let rand_row = noisy(1024);
    let encoded_copy = encode_row(&rand_row, None, Format::Extended, EncodingSize::FourBytes).unwrap();

    c.bench_function("encode_row-copy-1024", |b| {
        b.iter(|| {
            black_box(encode_row(&rand_row, None, Format::Extended, EncodingSize::FourBytes).unwrap());
        })
    });

    c.bench_function("decode_row-copy-1024", |b| {
        b.iter(|| {
            black_box(decode_row(&encoded_copy, rand_row.len(), None, Format::Extended).unwrap());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
