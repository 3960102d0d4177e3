//! Decode -> calibrate -> filter on representative device output.

use rstest::rstest;
use weigh_core::filter::FilterStack;
use weigh_core::{Calibration, FilterCfg, FrameDecoder, Snapshot, StabilityHint};

fn run(frames: &[&str], cal: Calibration) -> Option<Snapshot> {
    let decoder = FrameDecoder::new(1000.0);
    let mut filter = FilterStack::new(&FilterCfg::default());
    let mut last = None;
    for f in frames {
        if let Some(s) = decoder.decode(f) {
            last = Some(filter.update(s.raw_counts, &cal, s.stability_hint));
        }
    }
    last
}

#[test]
fn stable_zero_kg_frame() {
    let s = run(&["ST,GS,  0.000kg"], Calibration::new(0, 1000.0)).unwrap();
    assert_eq!(
        s,
        Snapshot {
            grams: 0.0,
            stable: true,
            raw_counts: 0
        }
    );
}

#[test]
fn unstable_gram_frame() {
    let d = FrameDecoder::new(1000.0).decode("US,NT,+12.34 g").unwrap();
    assert_eq!(d.stability_hint, StabilityHint::Unstable);
    assert!((d.grams - 12.34).abs() < 1e-9);
    let s = run(&["US,NT,+12.34 g"], Calibration::new(0, 1000.0)).unwrap();
    assert!(!s.stable);
}

#[rstest]
#[case(&["GROSS 2.000 kg NET 1.234 kg"], Some(1234.0))]
#[case(&["GROSS 2.000 kg"], None)]
#[case(&["2 lb"], Some(907.2))]
#[case(&["16 oz"], Some(453.6))]
fn ticket_and_unit_frames(#[case] frames: &[&str], #[case] grams: Option<f64>) {
    let got = run(frames, Calibration::new(0, 1000.0)).map(|s| s.grams);
    assert_eq!(got, grams);
}

#[test]
fn unmarked_stream_settles_to_stable() {
    let frames = vec!["+100.02"; 12];
    let s = run(&frames, Calibration::new(0, 1000.0)).unwrap();
    assert!(s.stable);
    assert_eq!(s.grams, 100.0);
}

#[test]
fn reversed_load_cell_reads_positive() {
    let decoder = FrameDecoder::new(100.0);
    let mut filter = FilterStack::new(&FilterCfg::default());
    let cal = Calibration::new(0, -100.0);
    // 0xFFD8F0 is -10000 counts: 100 g on a reversed bridge.
    let sample = decoder.decode_bits(0xFF_D8F0);
    assert_eq!(sample.raw_counts, -10_000);
    let s = filter.update(sample.raw_counts, &cal, sample.stability_hint);
    assert_eq!(s.grams, 100.0);
}
