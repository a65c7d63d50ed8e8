//! Classification of raw scanner input.
//!
//! The kiosk has a single input line fed by a handheld scanner running in
//! keyboard-emulation mode. It emits either a long material barcode or a short
//! numeric quantity, and length is what tells them apart.

/// What a scanned line means to the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanInput {
    MaterialCode(String),
    Quantity(i64),
    /// A finite number no slot can require (negative or fractional). It is
    /// still a quantity scan, so it reports not-found rather than being ignored.
    UnmatchableQuantity(String),
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanClassifier {
    material_code_min_len: usize,
}

impl Default for ScanClassifier {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ScanClassifier {
    /// Scans strictly longer than `material_code_min_len` characters are material codes.
    pub fn new(material_code_min_len: usize) -> Self {
        Self {
            material_code_min_len,
        }
    }

    pub fn classify(&self, raw: &str) -> ScanInput {
        // scanners terminate with CR/LF
        let scanned = raw.trim();

        if scanned.chars().count() > self.material_code_min_len {
            return ScanInput::MaterialCode(scanned.to_string());
        }

        match parse_quantity(scanned) {
            Some(quantity) => ScanInput::Quantity(quantity),
            None if is_finite_number(scanned) => {
                ScanInput::UnmatchableQuantity(scanned.to_string())
            }
            None => ScanInput::Discard,
        }
    }
}

/// Parses a non-negative integral quantity. `16`, `+16` and `16.0` are all 16.
pub fn parse_quantity(input: &str) -> Option<i64> {
    if input.is_empty() {
        return None;
    }

    if let Ok(value) = input.parse::<i64>() {
        return (value >= 0).then_some(value);
    }

    let value: f64 = input.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn is_finite_number(input: &str) -> bool {
    input.parse::<f64>().map_or(false, f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("60988953", ScanInput::MaterialCode("60988953".into()))]
    #[case("  60988953\r\n", ScanInput::MaterialCode("60988953".into()))]
    #[case("ABC-1234", ScanInput::MaterialCode("ABC-1234".into()))]
    #[case("1234567", ScanInput::MaterialCode("1234567".into()))]
    #[case("16", ScanInput::Quantity(16))]
    #[case("16\n", ScanInput::Quantity(16))]
    #[case("+16", ScanInput::Quantity(16))]
    #[case("16.0", ScanInput::Quantity(16))]
    #[case("0", ScanInput::Quantity(0))]
    #[case("123456", ScanInput::Quantity(123456))]
    #[case("16.5", ScanInput::UnmatchableQuantity("16.5".into()))]
    #[case("-3", ScanInput::UnmatchableQuantity("-3".into()))]
    #[case(" -0.25\r\n", ScanInput::UnmatchableQuantity("-0.25".into()))]
    #[case("abc", ScanInput::Discard)]
    #[case("NaN", ScanInput::Discard)]
    #[case("inf", ScanInput::Discard)]
    #[case("", ScanInput::Discard)]
    #[case("   ", ScanInput::Discard)]
    fn classifies_scanner_input(#[case] raw: &str, #[case] expected: ScanInput) {
        assert_eq!(ScanClassifier::default().classify(raw), expected);
    }

    #[test]
    fn quantities_beyond_i64_are_not_saturated() {
        // 2^63 is integral but does not fit an i64
        assert_eq!(parse_quantity("9223372036854775808"), None);
        assert_eq!(parse_quantity("9.223372036854775808e18"), None);
        assert_eq!(
            ScanClassifier::new(64).classify("9223372036854775808"),
            ScanInput::UnmatchableQuantity("9223372036854775808".into())
        );
        assert_eq!(parse_quantity("9007199254740992"), Some(9_007_199_254_740_992));
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // six characters, more than six bytes
        assert_eq!(ScanClassifier::default().classify("物料编码一二"), ScanInput::Discard);
        assert_eq!(
            ScanClassifier::default().classify("物料编码一二三"),
            ScanInput::MaterialCode("物料编码一二三".into())
        );
    }

    #[test]
    fn threshold_is_configurable() {
        let classifier = ScanClassifier::new(3);
        assert_eq!(classifier.classify("1234"), ScanInput::MaterialCode("1234".into()));
        assert_eq!(classifier.classify("123"), ScanInput::Quantity(123));
    }
}
