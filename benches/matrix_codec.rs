use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eeprobe_cnt::compress::{decode_epoch_to_client, encode_epoch_from_client, natural_row_order};
use eeprobe_cnt::compress::Format;
use eeprobe_cnt::types::EncodingSize;

fn sample_client(height: usize, length: usize) -> Vec<i64> {
    let mut out = vec![0i64; height * length];
    for t in 0..length {
        for c in 0..height {
            out[t * height + c] = 10 * (c as i64 + 1) + (t as i64 % 37);
        }
    }
    out
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let height = 32;
    let length = 1024;
    let row_order = natural_row_order(height);
    let client = sample_client(height, length);

    let encoded = encode_epoch_from_client(
        &client,
        &row_order,
        length,
        true,
        Format::Extended,
        EncodingSize::FourBytes,
    )
    .unwrap();

    c.bench_function("encode_epoch-32x1024", |b| {
        b.iter(|| {
            black_box(
                encode_epoch_from_client(
                    &client,
                    &row_order,
                    length,
                    true,
                    Format::Extended,
                    EncodingSize::FourBytes,
                )
                .unwrap(),
            );
        })
    });

    c.bench_function("decode_epoch-32x1024", |b| {
        b.iter(|| {
            black_box(decode_epoch_to_client(&encoded, &row_order, length, true, Format::Extended).unwrap());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
