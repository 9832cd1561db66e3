//! The calculation engine.
//!
//! [`FloatCalc`] bundles the state the operations share: the current
//! rounding mode, the exact flag describing the previous operation and the
//! host float descriptor. Operations that can lose precision take
//! `&mut self` so the flag can be polled with [`FloatCalc::is_exact`]
//! afterwards; everything else borrows immutably. Distinct engine handles
//! are fully independent.
//!
//! All arithmetic follows the same shape: handle the special classes,
//! compute an unnormalized mantissa/exponent pair on the widened buffers,
//! then run [normalization](FloatCalc::normalize) which locates the leading
//! one, denormalizes on underflow, applies guard/round/sticky rounding in
//! the current mode and resolves exponent overflow.

pub mod bytes;
pub mod format;
pub mod host;

use std::cmp::Ordering;

use thiserror::Error;

use crate::fp::{Class, Descriptor, ROUNDING_BITS, RoundingMode, Value};
use crate::wideint::{WIDE_BITS, WideInt};

/// Largest mantissa precision the digit buffers can carry: multiplication
/// needs the double-width product plus the rounding bits and one overflow
/// bit of headroom.
pub const MAX_PRECISION: u32 = WIDE_BITS / 2 - (2 + ROUNDING_BITS);

/// Default mantissa precision, wide enough for x86 extended
pub const DEFAULT_PRECISION: u32 = 64;

/// Failed float-to-integer conversion
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flt2IntError {
    /// The value exceeds the largest representable target integer
    #[error("integer result overflows the target width (positive)")]
    PositiveOverflow,

    /// The value exceeds the smallest representable target integer
    #[error("integer result overflows the target width (negative)")]
    NegativeOverflow,

    /// NaN input, or a negative value converted to an unsigned target
    #[error("value not convertible to the target integer type")]
    Bad,
}

/// Soft floating-point engine
pub struct FloatCalc {
    rounding_mode: RoundingMode,
    exact: bool,
    max_precision: u32,
    host_desc: Descriptor,
}

impl FloatCalc {
    pub fn new(precision: u32) -> Self {
        let max_precision = if precision > MAX_PRECISION {
            log::warn!("not enough precision available, using {MAX_PRECISION}");
            MAX_PRECISION
        } else {
            precision
        };
        Self {
            rounding_mode: RoundingMode::default(),
            exact: true,
            max_precision,
            host_desc: Descriptor::DOUBLE,
        }
    }

    /// The mantissa precision the engine actually provides
    pub fn max_precision(&self) -> u32 {
        self.max_precision
    }

    pub fn set_rounding_mode(&mut self, mode: RoundingMode) {
        self.rounding_mode = mode;
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.rounding_mode
    }

    /// Whether the previous arithmetic operation on this handle lost
    /// precision
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Descriptor of the host's widest native float
    pub fn host_descriptor(&self) -> &Descriptor {
        &self.host_desc
    }

    /// Bring a value into canonical form: leading one at the normalized
    /// position, denormalized on underflow, rounded in the current mode.
    /// `sticky` carries bits already lost before the call.
    ///
    /// Returns true iff no precision was lost.
    fn normalize(&self, val: &mut Value, mut sticky: bool) -> bool {
        let desc = val.desc;
        let lead = i64::from(desc.leading_one_pos());
        val.class = Class::Normal;

        // distance of the leading one from its canonical position
        let hsb = match val.mant.highest_set_bit() {
            Some(h) => lead - i64::from(h) - 1,
            None => {
                // mantissa all zeros means a zero exponent as well, since
                // even the explicit one is gone
                val.exp = WideInt::ZERO;
                -1
            }
        };

        let mut exact = true;
        if hsb < -1 {
            let shift = (-hsb - 1) as u32;
            let (m, carry) = val.mant.shr(shift);
            val.mant = m;
            if carry {
                exact = false;
                sticky = true;
            }
            val.exp = val.exp.add(&WideInt::from_u64(u64::from(shift)));
        } else if hsb > -1 {
            let shift = (hsb + 1) as u32;
            val.mant = val.mant.shl(shift);
            val.exp = val.exp.sub(&WideInt::from_u64(u64::from(shift)));
        }

        // exponent underflow: shift the mantissa right until the exponent
        // reaches zero
        if val.exp.is_negative() || val.exp.is_zero() {
            let shift = WideInt::from_u64(1).sub(&val.exp);
            let (m, carry) = val.mant.shr_wide(&shift);
            val.mant = m;
            if carry {
                exact = false;
                sticky = true;
            }
            val.exp = WideInt::ZERO;
            val.class = Class::Subnormal;
        }

        // round by adding a value that clears the guard and round bits and
        // either carries into the lsb or not
        let low = val.mant.sub_byte(desc.effective_mantissa() + ROUNDING_BITS, 0) & 0x7;
        let lsb_above = (low >> 2) & 1;
        let guard = (low >> 1) & 1;
        let round = low & 1;
        let round_up = match self.rounding_mode {
            // nearest representable value, ties towards even lsb
            RoundingMode::ToNearest => {
                guard == 1 && (sticky || round == 1 || lsb_above == 1)
            }
            RoundingMode::ToPositive => !val.sign && (guard == 1 || round == 1 || sticky),
            RoundingMode::ToNegative => val.sign && (guard == 1 || round == 1 || sticky),
            RoundingMode::ToZero => false,
        };

        let addend = i64::from(round_up) * 4 - i64::from(guard * 2 + round);
        if addend != 0 {
            val.mant = val.mant.add(&WideInt::from_i64(addend));
            exact = false;
        }

        // could have rounded down to zero
        if val.class == Class::Subnormal && val.mant.is_zero() {
            val.class = Class::Zero;
        }

        // rounding overflow: the carry went past the radix point. The bits
        // to the right are then all zero, so no second rounding is needed.
        let hsb = val
            .mant
            .highest_set_bit()
            .map_or(lead, |h| lead - i64::from(h) - 1);
        if val.class != Class::Subnormal && hsb < -1 {
            let (m, carry) = val.mant.shr(1);
            val.mant = m;
            if carry {
                exact = false;
            }
            val.exp = val.exp.inc();
        } else if val.class == Class::Subnormal && hsb == -1 {
            // the carry renormalized the subnormal
            val.exp = val.exp.inc();
            val.class = Class::Normal;
        }

        // exponent overflow: the reaction depends on the rounding mode;
        // directed modes cap at the largest finite value when rounding
        // away from the overflow direction
        let emax = WideInt::from_u64((1 << desc.exponent_size) - 1);
        if val.exp.cmp(&emax) != Ordering::Less {
            *val = match self.rounding_mode {
                RoundingMode::ToNearest => Value::inf(&desc, val.sign),
                RoundingMode::ToPositive => {
                    if val.sign {
                        Value::max(&desc, true)
                    } else {
                        Value::inf(&desc, false)
                    }
                }
                RoundingMode::ToNegative => {
                    if val.sign {
                        Value::inf(&desc, true)
                    } else {
                        Value::max(&desc, false)
                    }
                }
                RoundingMode::ToZero => Value::max(&desc, val.sign),
            };
        }
        exact
    }

    /// Operations involving NaNs return the NaN operand and are never exact
    fn handle_nan(&mut self, a: &Value, b: &Value) -> Option<Value> {
        if a.class == Class::Nan {
            self.exact = false;
            return Some(*a);
        }
        if b.class == Class::Nan {
            self.exact = false;
            return Some(*b);
        }
        None
    }

    /// a + b where a carries the bigger exponent
    fn fadd(&mut self, a: &Value, b: &Value) -> Value {
        self.exact = true;

        if let Some(nan) = self.handle_nan(a, b) {
            return nan;
        }

        // opposite signs turn this into a subtraction in magnitude
        let sub = a.sign ^ b.sign;

        if sub && a.class == Class::Inf && b.class == Class::Inf {
            self.exact = false;
            return Value::qnan(&a.desc);
        }

        let mut exp_diff = a.exp.sub(&b.exp);

        // the sign needs special care when the exponents are equal: an
        // equal-magnitude subtraction yields a signed zero chosen by the
        // rounding mode
        let res_sign = if sub && exp_diff.is_zero() {
            match a.mant.cmp(&b.mant) {
                Ordering::Greater => a.sign,
                Ordering::Equal => self.rounding_mode == RoundingMode::ToNegative,
                Ordering::Less => b.sign,
            }
        } else {
            a.sign
        };

        // sign is settled, handle the remaining special classes
        if a.class == Class::Zero || b.class == Class::Inf {
            let mut out = *b;
            out.sign = res_sign;
            self.exact = b.class == Class::Normal;
            return out;
        }
        if b.class == Class::Zero || a.class == Class::Inf {
            let mut out = *a;
            out.sign = res_sign;
            self.exact = a.class == Class::Normal;
            return out;
        }

        // align the radix points; a subnormal's radix point sits one bit
        // further right
        if b.class == Class::Subnormal && a.class != Class::Subnormal {
            exp_diff = exp_diff.sub(&WideInt::from_u64(1));
        }

        let (mut bm, sticky) = b.mant.shr_wide(&exp_diff);
        self.exact &= !sticky;

        if sticky && sub {
            // subtracting slightly more than the shifted value remained;
            // the increment accounts for the lost tail
            bm = bm.inc();
        }

        let mant = if sub {
            if a.mant < bm {
                bm.sub(&a.mant)
            } else {
                a.mant.sub(&bm)
            }
        } else {
            a.mant.add(&bm)
        };

        let mut out = Value {
            desc: a.desc,
            class: a.class,
            sign: res_sign,
            exp: a.exp,
            mant,
        };

        // adding two subnormals keeps the subnormal radix point; shift so
        // normalize sees the canonical one
        if a.class == Class::Subnormal && b.class == Class::Subnormal {
            out.mant = out.mant.shl(1);
        }

        let exact = self.normalize(&mut out, sticky);
        self.exact &= exact;
        out
    }

    pub fn add(&mut self, a: &Value, b: &Value) -> Value {
        // the operand with the bigger exponent goes first
        if a.exp < b.exp {
            self.fadd(b, a)
        } else {
            self.fadd(a, b)
        }
    }

    pub fn sub(&mut self, a: &Value, b: &Value) -> Value {
        let neg_b = b.neg();
        if a.exp < neg_b.exp {
            self.fadd(&neg_b, a)
        } else {
            self.fadd(a, &neg_b)
        }
    }

    pub fn mul(&mut self, a: &Value, b: &Value) -> Value {
        self.exact = true;

        if let Some(nan) = self.handle_nan(a, b) {
            return nan;
        }

        let res_sign = a.sign ^ b.sign;

        // 0 * inf is NaN, 0 * finite keeps the zero
        if a.class == Class::Zero {
            if b.class == Class::Inf {
                self.exact = false;
                return Value::qnan(&a.desc);
            }
            let mut out = *a;
            out.sign = res_sign;
            return out;
        }
        if b.class == Class::Zero {
            if a.class == Class::Inf {
                self.exact = false;
                return Value::qnan(&a.desc);
            }
            let mut out = *b;
            out.sign = res_sign;
            return out;
        }

        if a.class == Class::Inf || b.class == Class::Inf {
            self.exact = false;
            let mut out = if a.class == Class::Inf { *a } else { *b };
            out.sign = res_sign;
            return out;
        }

        // exp = exp(a) + exp(b) - bias
        let mut exp = a.exp.add(&b.exp).sub(&WideInt::from_i64(a.desc.bias()));

        // one subnormal operand shifts the radix point by one
        if (a.class == Class::Subnormal) ^ (b.class == Class::Subnormal) {
            exp = exp.inc();
        }

        // after multiplying, the digits right of the radix point doubled;
        // restore the alignment
        let mant = a.mant.mul(&b.mant);
        let (mant, sticky) = mant.shr(a.desc.leading_one_pos());
        self.exact &= !sticky;

        let mut out = Value {
            desc: a.desc,
            class: Class::Normal,
            sign: res_sign,
            exp,
            mant,
        };
        let exact = self.normalize(&mut out, sticky);
        self.exact &= exact;
        out
    }

    pub fn div(&mut self, a: &Value, b: &Value) -> Value {
        self.exact = true;

        if let Some(nan) = self.handle_nan(a, b) {
            return nan;
        }

        let res_sign = a.sign ^ b.sign;

        // 0/0 is NaN, 0/x keeps the zero
        if a.class == Class::Zero {
            if b.class == Class::Zero {
                self.exact = false;
                return Value::qnan(&a.desc);
            }
            let mut out = *a;
            out.sign = res_sign;
            return out;
        }

        if b.class == Class::Inf {
            self.exact = false;
            if a.class == Class::Inf {
                return Value::qnan(&a.desc);
            }
            return Value::zero(&a.desc, res_sign);
        }

        if a.class == Class::Inf {
            self.exact = false;
            let mut out = *a;
            out.sign = res_sign;
            return out;
        }

        if b.class == Class::Zero {
            // division by zero
            self.exact = false;
            return Value::inf(&a.desc, res_sign);
        }

        // exp = exp(a) - exp(b) + bias - 1
        let mut exp = a
            .exp
            .sub(&b.exp)
            .add(&WideInt::from_i64(a.desc.bias() - 1));
        if (a.class == Class::Subnormal) ^ (b.class == Class::Subnormal) {
            exp = exp.inc();
        }

        // widen the dividend for precision; the divisor's rounding bits are
        // zero, so shifting it right one bit keeps the quotient in range
        let dividend = a.mant.shl(a.desc.leading_one_pos());
        let (divisor, _) = b.mant.shr(1);
        let (mant, sticky) = dividend.div(&divisor);
        self.exact &= !sticky;

        let mut out = Value {
            desc: a.desc,
            class: Class::Normal,
            sign: res_sign,
            exp,
            mant,
        };
        let exact = self.normalize(&mut out, sticky);
        self.exact &= exact;
        out
    }

    /// Truncate the fractional part away. Does not clip to any integer
    /// range.
    pub fn int(&mut self, a: &Value) -> Value {
        // reported as inexact unconditionally
        self.exact = false;

        // values below one truncate to zero; values with the radix point
        // past the mantissa have no fractional bits to clear
        let exp_val = a.exp.to_i64() - a.desc.bias();
        if exp_val < 0 {
            return Value::zero(&a.desc, a.sign);
        }
        let eff = a.desc.effective_mantissa();
        if exp_val > i64::from(eff) {
            return *a;
        }

        // mask preserving the integral bits, rounding bits included
        let mask = WideInt::max_from_bits(1 + exp_val as u32)
            .shl(eff - exp_val as u32 + ROUNDING_BITS);
        let mut out = *a;
        out.mant = a.mant.and(&mask);
        out
    }

    /// Convert a value already truncated to an integer into a
    /// two's-complement pattern of `result_bits` bits.
    pub fn flt2int(
        &self,
        a: &Value,
        result_bits: u32,
        result_signed: bool,
    ) -> Result<WideInt, Flt2IntError> {
        match a.class {
            Class::Zero => Ok(WideInt::ZERO),
            Class::Inf => Err(if a.sign {
                Flt2IntError::NegativeOverflow
            } else {
                Flt2IntError::PositiveOverflow
            }),
            Class::Normal => {
                if a.sign && !result_signed {
                    return Err(Flt2IntError::Bad);
                }

                let tgt_bits = result_bits - u32::from(result_signed);
                let exp_val = a.exp.to_i64() - a.desc.bias();
                debug_assert!(exp_val >= 0, "value not integral");

                // MIN_INT is the only negative value allowed to use the
                // sign-bit position
                let min_int_ok = result_signed
                    && a.sign
                    && a.mant.highest_set_bit() == a.mant.lowest_set_bit();
                if exp_val > i64::from(tgt_bits)
                    || (exp_val == i64::from(tgt_bits) && !min_int_ok)
                {
                    return Err(if a.sign {
                        Flt2IntError::NegativeOverflow
                    } else {
                        Flt2IntError::PositiveOverflow
                    });
                }

                let mantissa_size = a.desc.mantissa_size + ROUNDING_BITS;
                let shift =
                    exp_val - i64::from(mantissa_size - a.desc.explicit_one as u32);
                let tgt_bits = if tgt_bits < mantissa_size + 1 {
                    mantissa_size + 1
                } else {
                    tgt_bits + u32::from(result_signed)
                };

                let mut out = if shift > 0 {
                    a.mant.shl(shift as u32).zero_extend(tgt_bits)
                } else {
                    a.mant.shr((-shift) as u32).0
                };
                if a.sign {
                    out = out.neg();
                }
                Ok(out)
            }
            _ => Err(Flt2IntError::Bad),
        }
    }

    /// Re-express a value in another format, rounding in the current mode.
    /// NaN and infinity are re-generated in the destination format; NaN
    /// payloads are not preserved beyond the quiet bit.
    pub fn cast(&self, value: &Value, dest: &Descriptor) -> Value {
        if value.desc == *dest {
            return *value;
        }

        match value.class {
            Class::Nan => {
                return if value.is_quiet_nan() {
                    Value::qnan(dest)
                } else {
                    Value::snan(dest)
                };
            }
            Class::Inf => return Value::inf(dest, value.sign),
            _ => {}
        }

        // normalizing realigns the mantissa for the new format, which would
        // shift the exponent; compensate for the shift and the bias change
        let exp_offset = dest.bias() - value.desc.bias()
            + i64::from(dest.effective_mantissa())
            - i64::from(value.desc.effective_mantissa());
        let exp = value.exp.add(&WideInt::from_i64(exp_offset));

        // normalize expects the canonical radix point
        let mant = if value.class == Class::Subnormal {
            value.mant.shl(1)
        } else {
            value.mant
        };

        let mut out = Value {
            desc: *dest,
            class: value.class,
            sign: value.sign,
            exp,
            mant,
        };
        self.normalize(&mut out, false);
        out
    }
}

impl Default for FloatCalc {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}
