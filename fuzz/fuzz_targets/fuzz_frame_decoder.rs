#![no_main]
use libfuzzer_sys::fuzz_target;
use weigh_core::FrameDecoder;

fuzz_target!(|data: &[u8]| {
    let decoder = FrameDecoder::default();
    let text: String = data.iter().filter(|b| b.is_ascii()).map(|&b| b as char).collect();
    if let Some(sample) = decoder.decode(&text) {
        assert!(sample.grams.is_finite());
    }
    if data.len() >= 3 {
        let raw = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        let _ = decoder.decode_bits(raw);
    }
});
