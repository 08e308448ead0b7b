//! S1: a 4-channel writer/reader roundtrip where the epoch length is
//! larger than the number of samples written, checking that per-sample
//! column-major reads land on the right time point regardless.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use hifitime::Epoch;

use crate::compress::Format;
use crate::container::chunk::RiffKind;
use crate::electrode::Electrode;
use crate::reader::Reader;
use crate::writer::Writer;

fn tmp_path(name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut p = std::env::temp_dir();
    p.push(format!("eeprobe-cnt-s1-{name}-{}-{}.cnt", std::process::id(), n));
    p
}

#[test]
fn four_electrode_column_major_roundtrip() {
    let path = tmp_path("epoch-layout");
    let mut w = Writer::new(&path, RiffKind::Riff32);

    let electrodes: Vec<Electrode> =
        (1..=4).map(|i| Electrode::new(i.to_string(), "ref")).collect();
    w.set_electrodes(electrodes).unwrap();
    w.set_sampling_frequency(256.0).unwrap();
    w.set_epoch_length(1024).unwrap();
    w.set_start_time(Epoch::from_gregorian_utc(2021, 6, 15, 10, 0, 0, 0)).unwrap();

    let one_pass: [i32; 8] = [11, 21, 31, 41, 12, 22, 32, 42];
    for _ in 0..3 {
        w.append_column_major_i32(&one_pass, 2).unwrap();
    }
    w.close().unwrap();

    let mut r = Reader::open(&path, Format::Extended).unwrap();
    assert_eq!(r.sample_count().unwrap(), 6);

    for t in 0..6i64 {
        let expected: [i64; 4] = if t % 2 == 0 { [11, 21, 31, 41] } else { [12, 22, 32, 42] };
        let got = r.range_column_major_i32(t, 1).unwrap();
        assert_eq!(got.as_slice(), &expected[..], "sample [{t},{})", t + 1);
    }

    std::fs::remove_file(&path).ok();
}
