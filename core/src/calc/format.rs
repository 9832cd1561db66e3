//! Textual rendering of values.

use serde::{Deserialize, Serialize};

use crate::calc::FloatCalc;
use crate::calc::bytes::pack;
use crate::fp::{Class, Value};

/// Output base for [`FloatCalc::format`]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Base {
    /// Decimal scientific notation, via the host float
    Dec,

    /// C99-style hex float, from the exact internal mantissa
    Hex,

    /// Hex dump of the packed encoding, most significant byte first
    Packed,
}

impl FloatCalc {
    pub fn format(&self, value: &Value, base: Base) -> String {
        match base {
            Base::Dec => match value.class() {
                Class::Inf => format!("{}INF", if value.is_negative() { '-' } else { '+' }),
                Class::Nan => "NaN".to_string(),
                Class::Zero => "0.0".to_string(),
                Class::Normal | Class::Subnormal => {
                    format!("{:.30E}", self.val_to_f64(value))
                }
            },
            Base::Hex => match value.class() {
                Class::Inf => format!("{}INF", if value.is_negative() { '-' } else { '+' }),
                Class::Nan => "NaN".to_string(),
                Class::Zero => "0.0".to_string(),
                Class::Normal | Class::Subnormal => format_hex(value),
            },
            Base::Packed => {
                let packed = pack(value);
                let n_bits = value.descriptor().packed_bits();
                let bytes: Vec<u8> = (0..n_bits.div_ceil(8))
                    .rev()
                    .map(|i| packed.sub_byte(n_bits, i))
                    .collect();
                format!("0x{}", hex::encode(bytes))
            }
        }
    }
}

/// `[-]0x<i>.<frac>p<exp>` with the fraction digits taken straight from
/// the mantissa and trailing zeros trimmed
fn format_hex(value: &Value) -> String {
    let desc = value.descriptor();
    let lead = desc.leading_one_pos();
    let int_digit = u8::from(value.mant.bit(lead));

    // left-align the fraction to a nibble boundary
    let nibbles = lead.div_ceil(4);
    let frac = value.mant.zero_extend(lead).shl(nibbles * 4 - lead);
    let mut digits = String::new();
    for j in (0..nibbles).rev() {
        let mut nib = 0u32;
        for k in 0..4 {
            if frac.bit(j * 4 + k) {
                nib |= 1 << k;
            }
        }
        digits.push(char::from_digit(nib, 16).unwrap_or('0'));
    }
    let trimmed = digits.trim_end_matches('0');

    // subnormals print with the conventional minimum exponent
    let exp = if value.is_subnormal() {
        1 - desc.bias()
    } else {
        value.exponent()
    };

    let sign = if value.is_negative() { "-" } else { "" };
    if trimmed.is_empty() {
        format!("{sign}0x{int_digit}p{exp:+}")
    } else {
        format!("{sign}0x{int_digit}.{trimmed}p{exp:+}")
    }
}
