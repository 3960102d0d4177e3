use criterion::{Criterion, black_box, criterion_group, criterion_main};
use weigh_core::filter::FilterStack;
use weigh_core::{Calibration, FilterCfg, FrameDecoder};

const FRAMES: [&str; 6] = [
    "ST,GS,  0.000kg",
    "US,NT,+12.34 g",
    "GROSS 2.000 kg NET 1.234 kg TARE 0.766 kg",
    "kg 0.75",
    "SN 12345678 42.5",
    "ST,GS,----",
];

pub fn bench_decode(c: &mut Criterion) {
    let decoder = FrameDecoder::new(1000.0);
    let mut g = c.benchmark_group("decoder");
    for frame in FRAMES {
        g.bench_function(frame, |b| b.iter(|| decoder.decode(black_box(frame))));
    }
    g.finish();
}

pub fn bench_filter(c: &mut Criterion) {
    let cal = Calibration::new(842_913, 1000.0);
    c.bench_function("filter_update_window_11", |b| {
        let mut f = FilterStack::new(&FilterCfg::default());
        let mut raw = 842_913i64;
        b.iter(|| {
            raw = if raw > 900_000 { 842_913 } else { raw + 37 };
            black_box(f.update(black_box(raw), &cal, weigh_core::StabilityHint::Unknown))
        });
    });
}

criterion_group!(benches, bench_decode, bench_filter);
criterion_main!(benches);
