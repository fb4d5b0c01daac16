use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Read;
use tailpack::{Appender, CodecId, Extractor};
use tempfile::NamedTempFile;

fn bench_codecs(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];

    for codec in [CodecId::Zstd, CodecId::Lz4] {
        c.bench_function(&format!("{}_encode_1mb", codec.name()), |b| {
            b.iter(|| {
                let mut out = Vec::new();
                codec.encode(3, &mut black_box(&data[..]), &mut out).unwrap();
                out
            })
        });
    }
}

fn bench_append_and_close(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];

    c.bench_function("append_1mb_zstd", |b| {
        b.iter(|| {
            let tmp = NamedTempFile::new().unwrap();
            let appender = Appender::create(tmp.path()).unwrap();
            appender.append_stream("bench.bin", black_box(&data[..])).unwrap();
            appender.close().unwrap();
        })
    });

    c.bench_function("append_10_blocks", |b| {
        b.iter(|| {
            let tmp = NamedTempFile::new().unwrap();
            let appender = Appender::create(tmp.path()).unwrap();
            for i in 0..10 {
                appender
                    .append_stream(format!("block_{i}.bin"), black_box(&data[..64 * 1024]))
                    .unwrap();
            }
            appender.close().unwrap();
        })
    });
}

fn bench_read(c: &mut Criterion) {
    let data: Vec<u8> = (0..1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    let tmp = NamedTempFile::new().unwrap();
    {
        let appender = Appender::create(tmp.path()).unwrap();
        appender.append_stream("payload", &data[..]).unwrap();
        appender.close().unwrap();
    }
    let extractor = Extractor::open(tmp.path()).unwrap();

    c.bench_function("open_container", |b| {
        b.iter(|| Extractor::open(black_box(tmp.path())).unwrap())
    });

    c.bench_function("read_all_1mb", |b| {
        b.iter(|| extractor.read_all(black_box("payload")).unwrap())
    });

    c.bench_function("stream_1mb_4k_reads", |b| {
        b.iter(|| {
            let mut reader = extractor.reader("payload").unwrap();
            let mut buf = [0u8; 4096];
            let mut total = 0usize;
            loop {
                let n = reader.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                total += n;
            }
            total
        })
    });
}

criterion_group!(benches, bench_codecs, bench_append_and_close, bench_read);
criterion_main!(benches);
