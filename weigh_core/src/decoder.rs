//! Frame decoder: one raw frame to a unit-normalized sample.
//!
//! ASCII scales in the field speak many dialects (`ST,GS,  0.000kg`,
//! `US,NT,+12.34 g`, multi-line tickets with `NET`/`GROSS`/`TARE`, bare
//! numbers). Text is offered to a fixed, ordered list of strategies; the first
//! one that answers wins. A strategy either yields a weight, rejects the frame
//! outright, or passes to the next one.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use weigh_traits::{Frame, Payload};

const NUMBER: &str = r"[-+]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)";
const UNIT: &str = r"KILOGRAMS?|KGS?|POUNDS?|LBS?|OUNCES?|OZS?|GRAMS?|G";

/// Bare numeric tokens above this magnitude are treated as noise (serial
/// numbers, ticket ids), not weights.
pub const MAX_BARE_VALUE: f64 = 1.0e6;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(NUMBER).unwrap_or_else(|e| panic!("invalid number regex: {e}"))
});

static NUMBER_WITH_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)({NUMBER})\s*({UNIT})\b"))
        .unwrap_or_else(|e| panic!("invalid unit regex: {e}"))
});

static NET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bNET(?:\s+WEIGHT)?\b[:=\s]*({NUMBER})(?:\s*({UNIT})\b)?"
    ))
    .unwrap_or_else(|e| panic!("invalid net regex: {e}"))
});

static VERBOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:DATE|TIME|GROSS|TARE|MERCHANDISE|PIECE|TOTAL|COUNT|ITEM)\b")
        .unwrap_or_else(|e| panic!("invalid ticket regex: {e}"))
});

static TOKEN_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,\s]+").unwrap_or_else(|e| panic!("invalid split regex: {e}")));

/// Unit the device reported (values are always normalized to grams).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Gram,
    Kilogram,
    Pound,
    Ounce,
}

impl Unit {
    /// Interpret a unit word; anything unrecognized counts as grams.
    pub fn from_token(token: &str) -> Self {
        let t = token.to_ascii_lowercase();
        if t.starts_with("kg") || t.starts_with("kilogram") {
            Unit::Kilogram
        } else if t.starts_with("lb") || t.starts_with("pound") {
            Unit::Pound
        } else if t.starts_with("oz") || t.starts_with("ounce") {
            Unit::Ounce
        } else {
            Unit::Gram
        }
    }

    pub fn grams_per_unit(self) -> f64 {
        match self {
            Unit::Gram => 1.0,
            Unit::Kilogram => 1000.0,
            Unit::Pound => 453.592_37,
            Unit::Ounce => 28.349_523_125,
        }
    }

    pub fn to_grams(self, value: f64) -> f64 {
        value * self.grams_per_unit()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Pound => "lb",
            Unit::Ounce => "oz",
        })
    }
}

/// Stability flag carried by the frame itself, independent of the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityHint {
    Stable,
    Unstable,
    #[default]
    Unknown,
}

impl StabilityHint {
    /// `Some(stable)` when the device said anything, `None` for Unknown.
    pub fn as_flag(self) -> Option<bool> {
        match self {
            StabilityHint::Stable => Some(true),
            StabilityHint::Unstable => Some(false),
            StabilityHint::Unknown => None,
        }
    }
}

/// Which strategy produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NetField,
    NumberWithUnit,
    EmbeddedUnit,
    AdjacentUnit,
    BareNumber,
    AdcBits,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodedSample {
    /// Device value normalized to grams, before calibration.
    pub grams: f64,
    pub unit: Unit,
    pub raw_counts: i64,
    pub stability_hint: StabilityHint,
    pub strategy: Strategy,
}

enum Outcome {
    Weight {
        value: f64,
        unit: Unit,
        strategy: Strategy,
    },
    Reject,
    Pass,
}

struct Parsed<'a> {
    text: &'a str,
    tokens: Vec<&'a str>,
}

type StrategyFn = fn(&Parsed<'_>) -> Outcome;

const STRATEGIES: [StrategyFn; 6] = [
    net_field,
    verbose_ticket,
    number_with_unit,
    embedded_unit,
    adjacent_unit,
    bare_number,
];

fn parse_number(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// First plain decimal inside `token`; exponents and trailing junk are ignored.
fn number_in(token: &str) -> Option<f64> {
    NUMBER_RE.find(token).and_then(|m| parse_number(m.as_str()))
}

fn net_field(p: &Parsed<'_>) -> Outcome {
    let Some(caps) = NET_RE.captures(p.text) else {
        return Outcome::Pass;
    };
    let Some(value) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
        return Outcome::Pass;
    };
    let unit = caps
        .get(2)
        .map_or(Unit::Kilogram, |m| Unit::from_token(m.as_str()));
    Outcome::Weight {
        value,
        unit,
        strategy: Strategy::NetField,
    }
}

fn verbose_ticket(p: &Parsed<'_>) -> Outcome {
    if VERBOSE_RE.is_match(p.text) {
        Outcome::Reject
    } else {
        Outcome::Pass
    }
}

fn number_with_unit(p: &Parsed<'_>) -> Outcome {
    for caps in NUMBER_WITH_UNIT_RE.captures_iter(p.text) {
        if let (Some(num), Some(unit)) = (caps.get(1), caps.get(2))
            && let Some(value) = parse_number(num.as_str())
        {
            return Outcome::Weight {
                value,
                unit: Unit::from_token(unit.as_str()),
                strategy: Strategy::NumberWithUnit,
            };
        }
    }
    Outcome::Pass
}

const EMBEDDED_UNITS: [&str; 8] = ["kg", "kilogram", "lb", "pound", "oz", "ounce", "g", "gram"];

fn embedded_unit(p: &Parsed<'_>) -> Outcome {
    for token in &p.tokens {
        // ASCII lowering keeps byte offsets aligned with the original token.
        let lower = token.to_ascii_lowercase();
        for unit in EMBEDDED_UNITS {
            let Some(idx) = lower.find(unit) else {
                continue;
            };
            let number_part = if idx > 0 {
                &token[..idx]
            } else {
                &token[unit.len()..]
            };
            if let Some(value) = number_in(number_part) {
                return Outcome::Weight {
                    value,
                    unit: Unit::from_token(unit),
                    strategy: Strategy::EmbeddedUnit,
                };
            }
        }
    }
    Outcome::Pass
}

const STANDALONE_UNITS: [&str; 15] = [
    "KG", "KGS", "KILOGRAM", "KILOGRAMS", "LB", "LBS", "POUND", "POUNDS", "OZ", "OZS", "OUNCE",
    "OUNCES", "G", "GRAM", "GRAMS",
];

fn adjacent_unit(p: &Parsed<'_>) -> Outcome {
    for (i, token) in p.tokens.iter().enumerate() {
        let upper = token.to_ascii_uppercase();
        if !STANDALONE_UNITS.contains(&upper.as_str()) {
            continue;
        }
        let prev = i.checked_sub(1).and_then(|j| p.tokens.get(j));
        let next = p.tokens.get(i + 1);
        for neighbour in [prev, next].into_iter().flatten() {
            if let Some(value) = number_in(neighbour) {
                return Outcome::Weight {
                    value,
                    unit: Unit::from_token(token),
                    strategy: Strategy::AdjacentUnit,
                };
            }
        }
    }
    Outcome::Pass
}

fn bare_number(p: &Parsed<'_>) -> Outcome {
    p.tokens
        .iter()
        .filter_map(|t| number_in(t))
        .find(|v| v.abs() <= MAX_BARE_VALUE)
        .map_or(Outcome::Pass, |value| Outcome::Weight {
            value,
            unit: Unit::Gram,
            strategy: Strategy::BareNumber,
        })
}

/// Scan tokens for `ST`/`STABLE` and `US`/`UN`/`UNSTABLE`. Unstable is final.
pub fn stability_hint(tokens: &[&str]) -> StabilityHint {
    let mut hint = StabilityHint::Unknown;
    for token in tokens {
        match token.to_ascii_uppercase().as_str() {
            "ST" | "STABLE" => hint = StabilityHint::Stable,
            "US" | "UN" | "UNSTABLE" => return StabilityHint::Unstable,
            _ => {}
        }
    }
    hint
}

/// Interpret 24 ADC bits as two's complement.
#[inline]
pub fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

/// Decoder bound to the native counts-per-gram bridge of the attached device.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    native_counts_per_gram: f64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

impl FrameDecoder {
    pub fn new(native_counts_per_gram: f64) -> Self {
        Self {
            native_counts_per_gram,
        }
    }

    pub fn native_counts_per_gram(&self) -> f64 {
        self.native_counts_per_gram
    }

    fn counts_for(&self, grams: f64) -> i64 {
        // `as` saturates, so absurd values cannot wrap.
        (grams * self.native_counts_per_gram).round() as i64
    }

    /// Decode one ASCII frame. `None` means "no usable weight in this frame".
    pub fn decode(&self, text: &str) -> Option<DecodedSample> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let parsed = Parsed {
            text,
            tokens: TOKEN_SPLIT_RE
                .split(text)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect(),
        };

        for attempt in STRATEGIES {
            match attempt(&parsed) {
                Outcome::Pass => continue,
                Outcome::Reject => return None,
                Outcome::Weight {
                    value,
                    unit,
                    strategy,
                } => {
                    let grams = unit.to_grams(value);
                    if !grams.is_finite() {
                        return None;
                    }
                    return Some(DecodedSample {
                        grams,
                        unit,
                        raw_counts: self.counts_for(grams),
                        stability_hint: stability_hint(&parsed.tokens),
                        strategy,
                    });
                }
            }
        }
        None
    }

    /// Decode a 24-bit ADC word: the counts are the ADC value itself.
    pub fn decode_bits(&self, raw: u32) -> DecodedSample {
        let raw_counts = i64::from(sign_extend_24(raw & 0x00FF_FFFF));
        let grams = if self.native_counts_per_gram != 0.0 {
            raw_counts as f64 / self.native_counts_per_gram
        } else {
            raw_counts as f64
        };
        DecodedSample {
            grams,
            unit: Unit::Gram,
            raw_counts,
            stability_hint: StabilityHint::Unknown,
            strategy: Strategy::AdcBits,
        }
    }

    pub fn decode_frame(&self, frame: &Frame) -> Option<DecodedSample> {
        match &frame.payload {
            Payload::Ascii(_) => self.decode(&frame.text()),
            Payload::Bits(raw) => Some(self.decode_bits(*raw)),
        }
    }
}
