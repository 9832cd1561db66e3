//! Host float interop and literal parsing.
//!
//! The widest float the host offers is `f64`; values cross that boundary
//! for string parsing and decimal printing. Wider engine formats round trip
//! through [`FloatCalc::val_to_bytes`] instead.

use proc_bitfield::bitfield;

use crate::calc::FloatCalc;
use crate::calc::bytes::pack;
use crate::fp::{Class, ROUNDING_BITS, Value};
use crate::wideint::{WIDE_BITS, WideInt};

bitfield! {
    /// Raw bit layout of a host double
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Bits64(pub u64): Debug, FromStorage, IntoStorage, DerefStorage {
        /// Fraction
        pub f: u64 @ 0..=51,

        /// Biased exponent
        pub e: u64 @ 52..=62,

        /// Sign bit
        pub s: bool @ 63,
    }
}

impl FloatCalc {
    /// Import a host float
    pub fn val_from_f64(&self, value: f64) -> Value {
        let bits = Bits64(value.to_bits());
        let mut out = Value {
            desc: self.host_desc,
            class: Class::Normal,
            sign: bits.s(),
            exp: WideInt::from_u64(bits.e()),
            mant: WideInt::from_u64(bits.f()).shl(ROUNDING_BITS),
        };
        self.classify_unpacked(&mut out);
        out
    }

    /// Export to a host float, rounding to its format in the current mode
    pub fn val_to_f64(&self, value: &Value) -> f64 {
        let desc = self.host_desc;
        let host = self.cast(value, &desc);
        f64::from_bits(pack(&host).to_u64())
    }

    /// Parse a decimal or hex float literal into a value of the host
    /// format; callers cast down to their target format. Decimal literals
    /// go through the host parser and malformed input silently reads as
    /// zero. Hex literals (`0x1.8p3`) are parsed directly.
    pub fn val_from_str(&self, s: &str) -> Value {
        let t = s.trim();
        let (sign, rest) = match t.as_bytes().first() {
            Some(b'+') => (false, &t[1..]),
            Some(b'-') => (true, &t[1..]),
            _ => (false, t),
        };
        if let Some(digits) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            return self.parse_hex_float(sign, digits);
        }
        self.val_from_f64(t.parse::<f64>().unwrap_or(0.0))
    }

    /// C99 hex float: hex mantissa digits with an optional point, then an
    /// optional binary exponent after 'p'
    fn parse_hex_float(&self, sign: bool, digits: &str) -> Value {
        let desc = self.host_desc;
        let bytes = digits.as_bytes();
        let mut mant = WideInt::ZERO;
        let mut bin_exp: i64 = 0;
        let mut frac_digits: i64 = 0;
        let mut in_frac = false;
        let mut sticky = false;
        let mut any_digit = false;

        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' if !in_frac => in_frac = true,
                b'p' | b'P' => break,
                c => {
                    let Some(d) = (c as char).to_digit(16) else {
                        // host parser contract: garbage reads as zero
                        return Value::zero(&desc, sign);
                    };
                    any_digit = true;
                    if mant.highest_set_bit().map_or(true, |h| h < WIDE_BITS - 5) {
                        mant = mant.shl(4).or(&WideInt::from_u64(u64::from(d)));
                        if in_frac {
                            frac_digits += 1;
                        }
                    } else if in_frac {
                        // excess fraction digits only stick
                        sticky |= d != 0;
                    } else {
                        // excess integer digits scale the value
                        bin_exp += 4;
                        sticky |= d != 0;
                    }
                }
            }
            i += 1;
        }
        if !any_digit {
            return Value::zero(&desc, sign);
        }
        if i < bytes.len() {
            bin_exp += digits[i + 1..].parse::<i64>().unwrap_or(0);
        }
        bin_exp -= 4 * frac_digits;

        if mant.is_zero() && !sticky {
            return Value::zero(&desc, sign);
        }

        // hand the raw digits to normalization: the exponent is chosen so
        // the value reads mant * 2^bin_exp
        let exp = WideInt::from_i64(bin_exp + desc.bias() + i64::from(desc.leading_one_pos()));
        let mut out = Value {
            desc,
            class: Class::Normal,
            sign,
            exp,
            mant,
        };
        self.normalize(&mut out, sticky);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits64_layout() {
        let one = Bits64(1.0f64.to_bits());
        assert_eq!(one.e(), 1023);
        assert_eq!(one.f(), 0);
        assert!(!one.s());

        let neg = Bits64((-2.0f64).to_bits());
        assert_eq!(neg.e(), 1024);
        assert!(neg.s());

        assert_eq!(
            Bits64::default().with_e(1023).with_s(true).0,
            (-1.0f64).to_bits()
        );
    }

    #[test]
    fn host_roundtrip() {
        let fc = FloatCalc::default();
        let values = [
            0.0,
            -0.0,
            1.0,
            -1.0,
            0.5,
            42.0,
            -13.0,
            f64::MAX,
            f64::MIN_POSITIVE,
            f64::EPSILON,
            5e-324, // smallest subnormal
            f64::INFINITY,
            f64::NEG_INFINITY,
            std::f64::consts::PI,
        ];
        for v in values {
            let val = fc.val_from_f64(v);
            let back = fc.val_to_f64(&val);
            assert_eq!(v.to_bits(), back.to_bits(), "{v}");
        }

        let nan = fc.val_from_f64(f64::NAN);
        assert!(nan.is_nan());
        assert!(fc.val_to_f64(&nan).is_nan());
    }

    #[test]
    fn host_roundtrip_random() {
        use rand::Rng;

        let fc = FloatCalc::default();
        let mut rng = rand::rng();
        for _ in 0..10000 {
            let v = f64::from_bits(rng.random::<u64>());
            if v.is_nan() {
                // NaN payloads canonicalize
                continue;
            }
            let back = fc.val_to_f64(&fc.val_from_f64(v));
            assert_eq!(v.to_bits(), back.to_bits(), "{v}");
        }
    }

    #[test]
    fn parse_decimal() {
        let fc = FloatCalc::default();
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0.5")), 0.5);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("-13")), -13.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("  42  ")), 42.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("1e300")), 1e300);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("inf")), f64::INFINITY);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("-inf")), f64::NEG_INFINITY);
        assert!(fc.val_from_str("NaN").is_nan());

        // malformed input silently reads as zero
        assert!(fc.val_from_str("twelve").is_zero());
        assert!(fc.val_from_str("").is_zero());
    }

    #[test]
    fn parse_hex() {
        let fc = FloatCalc::default();
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0x1.8p3")), 12.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0x1.8P3")), 12.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("-0x10p-4")), -1.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0x.4p0")), 0.25);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0xFF")), 255.0);
        assert_eq!(fc.val_to_f64(&fc.val_from_str("0x0p0")), 0.0);
        assert!(fc.val_from_str("-0x0p0").is_negative());
        assert!(fc.val_from_str("0xzz").is_zero());
        assert!(fc.val_from_str("0x").is_zero());

        // more digits than the buffer holds still round correctly
        let long = format!("0x1{}", "0".repeat(80));
        let expected = (16f64).powi(80);
        assert_eq!(fc.val_to_f64(&fc.val_from_str(&long)), expected);
    }
}
