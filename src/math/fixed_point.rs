//! Fixed-point conversion between floating USD price ratios and the
//! 10^18-scaled integers used by all on-chain-safe arithmetic.
//!
//! Multiplying an `f64` ratio by 1e18 directly loses precision once the
//! ratio carries more significant digits than a 64-bit float can hold
//! exactly; at BTC-against-microcap magnitudes the error is measurable in
//! whole wei. The canonical path therefore renders the ratio as a fixed
//! 18-place decimal string, splits it at the point, pads the fraction to
//! exactly 18 digits and parses the concatenation as one integer literal.
//! The naive multiply is kept alongside it because the gap between the two
//! is a tested property, not folklore.

use alloy::primitives::U256;
use anyhow::{bail, Context, Result};

/// Decimal places of the scaled conversion rate (wei-style 10^18).
pub const WAD_DECIMALS: usize = 18;

/// How a float ratio is turned into its 10^18-scaled integer form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMethod {
    /// Render to an 18-place decimal string and concatenate the digits.
    /// Exact with respect to the decimal rendering of the input float.
    StringDecompose,
    /// `floor(ratio * 1e18)` through f64. Loses low-order digits for
    /// ratios with many significant digits.
    FloatMultiply,
}

/// Scale a conversion ratio to its canonical 10^18 integer representation.
///
/// Rounds toward zero. Rejects non-finite, zero and negative ratios.
pub fn scale_conversion_rate(ratio: f64) -> Result<U256> {
    scale_conversion_rate_with(ratio, ScaleMethod::StringDecompose)
}

/// Scale with an explicitly chosen method. `FloatMultiply` exists for
/// error-margin comparison; production paths use `StringDecompose`.
pub fn scale_conversion_rate_with(ratio: f64, method: ScaleMethod) -> Result<U256> {
    if !ratio.is_finite() {
        bail!("conversion ratio must be finite, got {}", ratio);
    }
    if ratio <= 0.0 {
        bail!("conversion ratio must be strictly positive, got {}", ratio);
    }
    match method {
        ScaleMethod::StringDecompose => scale_string_decompose(ratio),
        ScaleMethod::FloatMultiply => scale_float_multiply(ratio),
    }
}

fn scale_string_decompose(ratio: f64) -> Result<U256> {
    // {:.18} always renders plain decimal notation, never scientific.
    let fixed = format!("{ratio:.18}");
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (fixed.as_str(), ""),
    };

    let mut frac = frac_part.to_string();
    frac.truncate(WAD_DECIMALS);
    while frac.len() < WAD_DECIMALS {
        frac.push('0');
    }

    let literal = format!("{int_part}{frac}");
    U256::from_str_radix(&literal, 10)
        .with_context(|| format!("conversion ratio {} does not fit in 256 bits", ratio))
}

fn scale_float_multiply(ratio: f64) -> Result<U256> {
    let scaled = (ratio * 1e18).floor();
    if scaled >= u128::MAX as f64 {
        bail!("conversion ratio {} too large to scale through f64", ratio);
    }
    Ok(U256::from(scaled as u128))
}

/// 10^exp as a U256. `exp` is a token decimal count, at most 18 here.
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Lossy U256-to-f64 conversion for diagnostics and report output only.
/// Integer arithmetic never routes through this.
pub fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}

/// Parse a human decimal amount ("270000", "0.5") into smallest units.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        bail!("invalid amount: {:?}", amount);
    }
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((i, f)) => (i, f),
        None => (amount, ""),
    };
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        bail!("invalid amount: {:?}", amount);
    }
    if frac_part.len() > decimals as usize {
        bail!(
            "amount {:?} has more than {} fractional digits",
            amount,
            decimals
        );
    }

    let mut frac = frac_part.to_string();
    while frac.len() < decimals as usize {
        frac.push('0');
    }
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    U256::from_str_radix(&format!("{int_part}{frac}"), 10)
        .with_context(|| format!("amount {:?} does not fit in 256 bits", amount))
}

/// Render smallest units as a human decimal string, trimming trailing
/// fractional zeros.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    if decimals == 0 {
        return digits;
    }
    let decimals = decimals as usize;
    let (int_part, frac_part) = if digits.len() > decimals {
        let split = digits.len() - decimals;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        (
            "0".to_string(),
            format!("{:0>width$}", digits, width = decimals),
        )
    };
    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{int_part}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(n: u64) -> U256 {
        U256::from(n) * pow10(18)
    }

    #[test]
    fn scales_integral_ratio_exactly() {
        let scaled = scale_conversion_rate(1_335_200.0).unwrap();
        assert_eq!(scaled, wad(1_335_200));
    }

    #[test]
    fn scales_fractional_ratio() {
        let scaled = scale_conversion_rate(0.5).unwrap();
        assert_eq!(scaled, U256::from(5u64) * pow10(17));
    }

    #[test]
    fn rejects_invalid_ratios() {
        assert!(scale_conversion_rate(0.0).is_err());
        assert!(scale_conversion_rate(-1.5).is_err());
        assert!(scale_conversion_rate(f64::NAN).is_err());
        assert!(scale_conversion_rate(f64::INFINITY).is_err());
    }

    #[test]
    fn string_decompose_matches_reference_for_six_digit_ratios() {
        // Reference values computed with arbitrary-precision decimal
        // arithmetic on the exact decimal rendering of each ratio.
        let cases: &[(f64, u64, u32)] = &[
            // (ratio, reference mantissa, reference power-of-ten exponent)
            (123.456, 123_456, 15),
            (0.000001, 1, 12),
            (999999.0, 999_999, 18),
            (1.5, 15, 17),
            (250000.0, 250_000, 18),
        ];
        for &(ratio, mantissa, exp) in cases {
            let scaled = scale_conversion_rate(ratio).unwrap();
            let reference = U256::from(mantissa) * U256::from(10u64).pow(U256::from(exp));
            let diff = if scaled > reference {
                scaled - reference
            } else {
                reference - scaled
            };
            // within 10^-12 relative error
            let tolerance = reference / U256::from(1_000_000_000_000u64);
            assert!(
                diff <= tolerance,
                "ratio {ratio}: {scaled} vs reference {reference}"
            );
        }
    }

    #[test]
    fn float_multiply_drifts_on_many_significant_digits() {
        // 95000 / 0.07 carries more significant digits than f64 keeps
        // through a 1e18 multiply. The two methods must agree to 1e-6
        // relative; when the naive method drifts past that the string
        // method is the one trusted.
        let ratio = 95_000.0 / 0.07;
        let exact = scale_conversion_rate_with(ratio, ScaleMethod::StringDecompose).unwrap();
        let naive = scale_conversion_rate_with(ratio, ScaleMethod::FloatMultiply).unwrap();

        let diff = if exact > naive { exact - naive } else { naive - exact };
        let rel = u256_to_f64(diff) / u256_to_f64(exact);
        assert!(
            rel < 1e-6,
            "naive scaling drifted {rel} relative from string decomposition"
        );
        // The drift is real, just small: the naive path does lose the
        // low-order digits on this ratio.
        assert_ne!(exact, naive);
    }

    #[test]
    fn methods_agree_on_exactly_representable_ratios() {
        for ratio in [1.0, 2.0, 1024.0, 0.5] {
            let a = scale_conversion_rate_with(ratio, ScaleMethod::StringDecompose).unwrap();
            let b = scale_conversion_rate_with(ratio, ScaleMethod::FloatMultiply).unwrap();
            assert_eq!(a, b, "ratio {ratio}");
        }
    }

    #[test]
    fn parse_units_round_trips_format_units() {
        let v = parse_units("270000", 18).unwrap();
        assert_eq!(v, wad(270_000));
        assert_eq!(format_units(v, 18), "270000");

        let v = parse_units("0.5", 8).unwrap();
        assert_eq!(v, U256::from(50_000_000u64));
        assert_eq!(format_units(v, 8), "0.5");

        let v = parse_units("1000000000000000000000000", 0).unwrap();
        assert_eq!(format_units(v, 18), "1000000");
    }

    #[test]
    fn parse_units_rejects_garbage() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-5", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("0.123456789", 8).is_err());
    }
}
