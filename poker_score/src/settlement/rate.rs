//! Chip-to-currency conversion.

/// Parsed "chips:currency" rate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChipRate {
    pub chips: f64,
    pub currency: f64,
}

impl ChipRate {
    /// Parse a rate such as `"20:1"`
    ///
    /// Returns `None` for anything that is not two finite numbers separated by
    /// a single colon, and for a zero chip part.
    pub fn parse(rate: &str) -> Option<Self> {
        let (chips, currency) = rate.split_once(':')?;
        if currency.contains(':') {
            return None;
        }

        let chips: f64 = chips.trim().parse().ok()?;
        let currency: f64 = currency.trim().parse().ok()?;
        if !chips.is_finite() || !currency.is_finite() || chips == 0.0 {
            return None;
        }

        Some(Self { chips, currency })
    }

    pub fn convert(&self, chip_amount: i64) -> f64 {
        chip_amount as f64 * self.currency / self.chips
    }
}

/// Convert chips to currency at `rate`
///
/// A malformed rate or a zero chip part yields `0.0`; chip accounting must
/// never fail because of bad rate data.
pub fn calculate_rmb_amount(chip_amount: i64, rate: &str) -> f64 {
    ChipRate::parse(rate)
        .map(|r| r.convert(chip_amount))
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rate() {
        assert_eq!(calculate_rmb_amount(300, "20:1"), 15.0);
        assert_eq!(calculate_rmb_amount(-200, "20:1"), -10.0);
        assert_eq!(calculate_rmb_amount(0, "20:1"), 0.0);
    }

    #[test]
    fn test_fractional_rate() {
        assert_eq!(calculate_rmb_amount(100, "1:0.5"), 50.0);
        assert_eq!(calculate_rmb_amount(10, "4:1"), 2.5);
    }

    #[test]
    fn test_bad_rates_yield_zero() {
        assert_eq!(calculate_rmb_amount(500, "0:1"), 0.0);
        assert_eq!(calculate_rmb_amount(500, "bad"), 0.0);
        assert_eq!(calculate_rmb_amount(500, ""), 0.0);
        assert_eq!(calculate_rmb_amount(500, "20:1:3"), 0.0);
        assert_eq!(calculate_rmb_amount(500, "inf:1"), 0.0);
        assert_eq!(calculate_rmb_amount(500, "20:x"), 0.0);
    }
}
