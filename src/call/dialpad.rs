use super::error::CallError;

/// Destination typed on the dialpad. Only ASCII decimal digits; may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialedNumber(String);

impl DialedNumber {
    /// Parse a number from an external source. A single leading `+` is
    /// tolerated and dropped.
    pub fn parse(raw: &str) -> Result<Self, CallError> {
        let digits = raw.trim();
        let digits = digits.strip_prefix('+').unwrap_or(digits);
        if digits.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(digits.to_string()))
        } else {
            Err(CallError::InvalidDestination(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DialedNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a `DialedNumber` one key at a time.
#[derive(Debug, Default)]
pub struct DialpadAccumulator {
    number: DialedNumber,
}

impl DialpadAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a digit 0-9. Values above 9 are ignored.
    pub fn append(&mut self, digit: u8) {
        if let Some(c) = char::from_digit(u32::from(digit), 10) {
            self.number.0.push(c);
        }
    }

    /// Drop the last digit; no-op on empty.
    pub fn backspace(&mut self) {
        self.number.0.pop();
    }

    pub fn clear(&mut self) {
        self.number.0.clear();
    }

    pub fn value(&self) -> DialedNumber {
        self.number.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_number_in_order() {
        let mut pad = DialpadAccumulator::new();
        for d in [5, 5, 5, 1, 2, 3, 4, 5, 6, 7] {
            pad.append(d);
        }
        assert_eq!(pad.value().as_str(), "5551234567");
    }

    #[test]
    fn backspace_on_empty_is_noop() {
        let mut pad = DialpadAccumulator::new();
        pad.backspace();
        assert!(pad.value().is_empty());
    }

    #[test]
    fn backspace_removes_last_digit() {
        let mut pad = DialpadAccumulator::new();
        pad.append(4);
        pad.append(2);
        pad.backspace();
        assert_eq!(pad.value().as_str(), "4");
    }

    #[test]
    fn out_of_range_digit_is_ignored() {
        let mut pad = DialpadAccumulator::new();
        pad.append(10);
        pad.append(255);
        assert!(pad.value().is_empty());
    }

    #[test]
    fn clear_empties_value() {
        let mut pad = DialpadAccumulator::new();
        pad.append(1);
        pad.clear();
        assert_eq!(pad.value(), DialedNumber::default());
    }

    #[test]
    fn parse_strips_plus_and_rejects_letters() {
        assert_eq!(DialedNumber::parse("+4155550100").unwrap().as_str(), "4155550100");
        assert!(DialedNumber::parse("").unwrap().is_empty());
        assert!(matches!(
            DialedNumber::parse("555-CALL"),
            Err(CallError::InvalidDestination(_))
        ));
        assert!(DialedNumber::parse("++1").is_err());
    }
}
