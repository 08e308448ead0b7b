//! S6: two embedded user files roundtrip byte-identical and the reader's
//! enumeration reports exactly the labels attached, in attach order.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::compress::Format;
use crate::container::chunk::RiffKind;
use crate::electrode::Electrode;
use crate::reader::Reader;
use crate::writer::Writer;

fn tmp_path(name: &str) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut p = std::env::temp_dir();
    p.push(format!("eeprobe-cnt-s6-{name}-{}-{}", std::process::id(), n));
    p
}

#[test]
fn two_embedded_files_enumerate_and_extract_byte_identical() {
    let cnt_path = tmp_path("embed.cnt");
    let usr1_src = tmp_path("usr1-src.bin");
    let usr2_src = tmp_path("usr2-src.bin");
    std::fs::write(&usr1_src, b"hello from usr1").unwrap();
    std::fs::write(&usr2_src, b"a different payload for usr2").unwrap();

    let mut w = Writer::new(&cnt_path, RiffKind::Riff32);
    w.set_electrodes(vec![Electrode::new("Fp1", "")]).unwrap();
    w.set_sampling_frequency(100.0).unwrap();
    w.set_epoch_length(2).unwrap();
    w.append_row_major_i32(&[1, 2], 2).unwrap();
    w.embed(*b"usr1", &usr1_src).unwrap();
    w.embed(*b"usr2", &usr2_src).unwrap();
    w.close().unwrap();

    let r = Reader::open(&cnt_path, Format::Extended).unwrap();
    let embedded = r.embedded_files().unwrap();
    let labels: Vec<String> = embedded.iter().map(|f| f.label_str()).collect();
    assert_eq!(labels, vec!["usr1".to_string(), "usr2".to_string()]);

    let usr1_out = tmp_path("usr1-out.bin");
    let usr2_out = tmp_path("usr2-out.bin");
    r.extract_embedded(*b"usr1", &usr1_out).unwrap();
    r.extract_embedded(*b"usr2", &usr2_out).unwrap();
    assert_eq!(std::fs::read(&usr1_out).unwrap(), std::fs::read(&usr1_src).unwrap());
    assert_eq!(std::fs::read(&usr2_out).unwrap(), std::fs::read(&usr2_src).unwrap());

    for p in [&cnt_path, &usr1_src, &usr2_src, &usr1_out, &usr2_out] {
        std::fs::remove_file(p).ok();
    }
}
