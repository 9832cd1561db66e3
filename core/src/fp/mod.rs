//! Tagged float value representation.
//!
//! A [`Value`] carries its format [`Descriptor`], a class tag, a sign, the
//! biased exponent and a mantissa with an explicit leading one (contrary to
//! most packed floating-point formats). The mantissa keeps
//! [`ROUNDING_BITS`] extra low-order bits during all computation; the third
//! rounding bit (sticky) travels out-of-band as a bool.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::wideint::WideInt;

/// Number of extra low-order mantissa bits (guard and round) carried during
/// computation
pub const ROUNDING_BITS: u32 = 2;

/// Describes the packed encoding of a floating-point format
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Descriptor {
    /// Number of exponent bits in the packed encoding
    pub exponent_size: u32,

    /// Number of mantissa bits in the packed encoding
    pub mantissa_size: u32,

    /// Whether the leading integer bit of the mantissa is stored in the
    /// packed form (x86 extended) or implied (standard IEEE formats)
    pub explicit_one: bool,
}

impl Descriptor {
    /// IEEE 754 binary32
    pub const SINGLE: Self = Self::new(8, 23, false);

    /// IEEE 754 binary64
    pub const DOUBLE: Self = Self::new(11, 52, false);

    /// x86 80-bit extended precision
    pub const EXTENDED: Self = Self::new(15, 64, true);

    pub const fn new(exponent_size: u32, mantissa_size: u32, explicit_one: bool) -> Self {
        Self {
            exponent_size,
            mantissa_size,
            explicit_one,
        }
    }

    /// Mantissa bits to the right of the radix point
    pub const fn effective_mantissa(&self) -> u32 {
        self.mantissa_size - self.explicit_one as u32
    }

    /// Exponent bias of the packed encoding
    pub const fn bias(&self) -> i64 {
        (1 << (self.exponent_size - 1)) - 1
    }

    /// Width of the packed encoding in bits, including the sign
    pub const fn packed_bits(&self) -> u32 {
        1 + self.exponent_size + self.mantissa_size
    }

    /// Bit position of the normalized leading one in the internal mantissa
    pub(crate) const fn leading_one_pos(&self) -> u32 {
        self.effective_mantissa() + ROUNDING_BITS
    }
}

/// Value classification
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display, Serialize, Deserialize)]
pub enum Class {
    Normal,
    Zero,
    Subnormal,
    Inf,
    Nan,
}

/// Rounding mode applied by normalization
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Default, Display, EnumIter, Serialize, Deserialize,
)]
pub enum RoundingMode {
    /// Round to the nearest representable value, ties to even
    #[default]
    ToNearest,

    /// Round toward positive infinity
    ToPositive,

    /// Round toward negative infinity
    ToNegative,

    /// Round toward zero (chopping)
    ToZero,
}

/// A soft floating-point value. Plain data; freely copied.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub(crate) desc: Descriptor,
    pub(crate) class: Class,
    pub(crate) sign: bool,

    /// Biased exponent
    pub(crate) exp: WideInt,

    /// Mantissa, explicit leading one at [`Descriptor::leading_one_pos`]
    pub(crate) mant: WideInt,
}

impl Value {
    /// Positive or negative zero
    pub fn zero(desc: &Descriptor, sign: bool) -> Self {
        Self {
            desc: *desc,
            class: Class::Zero,
            sign,
            exp: WideInt::ZERO,
            mant: WideInt::ZERO,
        }
    }

    /// Positive or negative infinity
    pub fn inf(desc: &Descriptor, sign: bool) -> Self {
        let mut mant = WideInt::ZERO;
        mant.set_bit(desc.leading_one_pos());
        Self {
            desc: *desc,
            class: Class::Inf,
            sign,
            exp: WideInt::max_from_bits(desc.exponent_size),
            mant,
        }
    }

    /// Canonical quiet NaN: msb of the fraction set
    pub fn qnan(desc: &Descriptor) -> Self {
        let mut mant = WideInt::ZERO;
        mant.set_bit(desc.mantissa_size + ROUNDING_BITS - 1);
        if desc.explicit_one {
            mant.set_bit(desc.mantissa_size + ROUNDING_BITS - 2);
        }
        Self {
            desc: *desc,
            class: Class::Nan,
            sign: false,
            exp: WideInt::max_from_bits(desc.exponent_size),
            mant,
        }
    }

    /// Canonical signalling NaN: msb of the fraction clear, payload bit
    /// below it set
    pub fn snan(desc: &Descriptor) -> Self {
        let mut mant = WideInt::ZERO;
        mant.set_bit(desc.mantissa_size + ROUNDING_BITS - 3);
        if desc.explicit_one {
            mant.set_bit(desc.mantissa_size + ROUNDING_BITS - 1);
        }
        Self {
            desc: *desc,
            class: Class::Nan,
            sign: false,
            exp: WideInt::max_from_bits(desc.exponent_size),
            mant,
        }
    }

    /// Largest finite value of the format
    pub fn max(desc: &Descriptor, sign: bool) -> Self {
        let mant = WideInt::max_from_bits(desc.mantissa_size + 1 - desc.explicit_one as u32)
            .shl(ROUNDING_BITS);
        Self {
            desc: *desc,
            class: Class::Normal,
            sign,
            exp: WideInt::from_u64((1 << desc.exponent_size) - 2),
            mant,
        }
    }

    /// Smallest positive normal value of the format
    pub fn small(desc: &Descriptor) -> Self {
        let mut mant = WideInt::ZERO;
        mant.set_bit(desc.leading_one_pos());
        Self {
            desc: *desc,
            class: Class::Normal,
            sign: false,
            exp: WideInt::from_u64(1),
            mant,
        }
    }

    /// Gap between 1.0 and the next representable value (ulp of one)
    pub fn epsilon(desc: &Descriptor) -> Self {
        let mut mant = WideInt::ZERO;
        mant.set_bit(desc.leading_one_pos());
        Self {
            desc: *desc,
            class: Class::Normal,
            sign: false,
            exp: WideInt::from_i64(desc.bias() - i64::from(desc.effective_mantissa())),
            mant,
        }
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.desc
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn is_zero(&self) -> bool {
        self.class == Class::Zero
    }

    pub fn is_negative(&self) -> bool {
        self.sign
    }

    pub fn is_inf(&self) -> bool {
        self.class == Class::Inf
    }

    pub fn is_nan(&self) -> bool {
        self.class == Class::Nan
    }

    pub fn is_subnormal(&self) -> bool {
        self.class == Class::Subnormal
    }

    pub fn is_finite(&self) -> bool {
        matches!(self.class, Class::Normal | Class::Zero | Class::Subnormal)
    }

    /// True iff the fraction is zero, rounding bits included
    pub fn zero_mantissa(&self) -> bool {
        self.mant
            .low_bits_zero(self.desc.mantissa_size + ROUNDING_BITS - self.desc.explicit_one as u32)
    }

    /// Unbiased exponent
    pub fn exponent(&self) -> i64 {
        self.exp.to_i64() - self.desc.bias()
    }

    /// Whether a cast to `dest` would preserve the value exactly: the
    /// exponent must fit the destination range and the lowest set mantissa
    /// bit must still fit the destination precision.
    pub fn can_lossless_conv_to(&self, dest: &Descriptor) -> bool {
        match self.class {
            Class::Zero | Class::Inf | Class::Nan => true,
            Class::Normal | Class::Subnormal => {
                // 0 and all ones are reserved exponent encodings
                let v = self.exponent() + dest.bias();
                if !(0 < v && v < (1 << dest.exponent_size) - 1) {
                    return false;
                }
                let lowest = self.mant.lowest_set_bit().map_or(0, i64::from);
                let used = i64::from(self.desc.leading_one_pos()) - lowest;
                used <= i64::from(dest.effective_mantissa())
            }
        }
    }

    /// Quiet NaNs carry the msb of the fraction set
    pub fn is_quiet_nan(&self) -> bool {
        debug_assert!(self.class == Class::Nan);
        self.mant
            .bit(self.desc.effective_mantissa() + ROUNDING_BITS - 1)
    }

    /// Sign flip; NaN stays NaN
    pub fn neg(&self) -> Self {
        let mut out = *self;
        out.sign = !self.sign;
        out
    }

    /// Magnitude
    pub fn abs(&self) -> Self {
        if self.sign { self.neg() } else { *self }
    }

    /// Total order for non-NaN operands, `None` if either is NaN
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.class == Class::Nan || other.class == Class::Nan {
            return None;
        }

        // zero is equal independent of sign
        if self.class == Class::Zero && other.class == Class::Zero {
            return Some(Ordering::Equal);
        }

        if self.sign != other.sign {
            return Some(if self.sign {
                Ordering::Less
            } else {
                Ordering::Greater
            });
        }

        // signs agree; compare magnitudes, flipped for negative values
        let ord = if self.class == Class::Inf && other.class == Class::Inf {
            Ordering::Equal
        } else if self.class == Class::Inf {
            Ordering::Greater
        } else if other.class == Class::Inf {
            Ordering::Less
        } else {
            match self.exp.cmp(&other.exp) {
                Ordering::Equal => self.mant.cmp(&other.mant),
                ord => ord,
            }
        };
        Some(if self.sign { ord.reverse() } else { ord })
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("class", &self.class)
            .field("sign", &self.sign)
            .field("exp", &self.exp)
            .field("unbiased", &self.exponent())
            .field("mant", &self.mant)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_derived_quantities() {
        assert_eq!(Descriptor::SINGLE.bias(), 127);
        assert_eq!(Descriptor::DOUBLE.bias(), 1023);
        assert_eq!(Descriptor::EXTENDED.bias(), 16383);

        assert_eq!(Descriptor::SINGLE.effective_mantissa(), 23);
        assert_eq!(Descriptor::EXTENDED.effective_mantissa(), 63);

        assert_eq!(Descriptor::SINGLE.packed_bits(), 32);
        assert_eq!(Descriptor::DOUBLE.packed_bits(), 64);
        assert_eq!(Descriptor::EXTENDED.packed_bits(), 80);
    }

    #[test]
    fn constant_shapes() {
        for desc in [Descriptor::SINGLE, Descriptor::DOUBLE, Descriptor::EXTENDED] {
            let inf = Value::inf(&desc, false);
            assert!(inf.is_inf());
            assert_eq!(inf.mant.highest_set_bit(), Some(desc.leading_one_pos()));
            assert_eq!(inf.mant.lowest_set_bit(), Some(desc.leading_one_pos()));
            assert!(inf.exp.low_bits_all_one(desc.exponent_size));

            let qnan = Value::qnan(&desc);
            assert!(qnan.is_nan());
            assert!(qnan.is_quiet_nan());

            let snan = Value::snan(&desc);
            assert!(snan.is_nan());
            assert!(!snan.is_quiet_nan());
            assert!(!snan.zero_mantissa());

            let small = Value::small(&desc);
            assert_eq!(small.exponent(), 1 - desc.bias());
            assert_eq!(small.mant.highest_set_bit(), Some(desc.leading_one_pos()));

            let eps = Value::epsilon(&desc);
            assert_eq!(eps.exponent(), -i64::from(desc.effective_mantissa()));

            let max = Value::max(&desc, false);
            assert_eq!(
                max.exponent(),
                (1 << desc.exponent_size) - 2 - desc.bias()
            );
            assert_eq!(max.mant.highest_set_bit(), Some(desc.leading_one_pos()));
            assert_eq!(max.mant.lowest_set_bit(), Some(ROUNDING_BITS));
        }
    }

    #[test]
    fn zero_signs() {
        let pz = Value::zero(&Descriptor::SINGLE, false);
        let nz = Value::zero(&Descriptor::SINGLE, true);
        assert!(pz.is_zero() && nz.is_zero());
        assert!(!pz.is_negative());
        assert!(nz.is_negative());
        assert_eq!(pz.compare(&nz), Some(Ordering::Equal));
        assert_eq!(nz.neg(), pz);
        assert_eq!(nz.abs(), pz);
    }

    #[test]
    fn compare_ordering() {
        let desc = Descriptor::SINGLE;
        let small = Value::small(&desc);
        let max = Value::max(&desc, false);
        let inf = Value::inf(&desc, false);
        let ninf = Value::inf(&desc, true);
        let zero = Value::zero(&desc, false);
        let nan = Value::qnan(&desc);

        assert_eq!(small.compare(&max), Some(Ordering::Less));
        assert_eq!(max.compare(&inf), Some(Ordering::Less));
        assert_eq!(inf.compare(&inf), Some(Ordering::Equal));
        assert_eq!(ninf.compare(&inf), Some(Ordering::Less));
        assert_eq!(ninf.compare(&max.neg()), Some(Ordering::Less));
        assert_eq!(max.neg().compare(&small.neg()), Some(Ordering::Less));
        assert_eq!(zero.compare(&small), Some(Ordering::Less));
        assert_eq!(zero.compare(&small.neg()), Some(Ordering::Greater));
        assert_eq!(nan.compare(&zero), None);
        assert_eq!(zero.compare(&nan), None);
    }

    #[test]
    fn lossless_conversion_check() {
        let one32 = {
            // 1.0 in binary32: biased exponent = bias, leading one only
            let desc = Descriptor::SINGLE;
            let mut mant = WideInt::ZERO;
            mant.set_bit(desc.leading_one_pos());
            Value {
                desc,
                class: Class::Normal,
                sign: false,
                exp: WideInt::from_i64(desc.bias()),
                mant,
            }
        };
        assert!(one32.can_lossless_conv_to(&Descriptor::DOUBLE));
        assert!(one32.can_lossless_conv_to(&Descriptor::EXTENDED));

        let max64 = Value::max(&Descriptor::DOUBLE, false);
        assert!(!max64.can_lossless_conv_to(&Descriptor::SINGLE));
        assert!(max64.can_lossless_conv_to(&Descriptor::EXTENDED));

        let max32 = Value::max(&Descriptor::SINGLE, false);
        assert!(max32.can_lossless_conv_to(&Descriptor::DOUBLE));

        assert!(Value::qnan(&Descriptor::DOUBLE).can_lossless_conv_to(&Descriptor::SINGLE));
        assert!(Value::inf(&Descriptor::DOUBLE, true).can_lossless_conv_to(&Descriptor::SINGLE));
    }
}
