//! Packed byte import and export.
//!
//! The packed layout is `mantissa_size` mantissa bits at bit 0, the biased
//! exponent above them and the sign bit on top, serialized little-endian.

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::calc::FloatCalc;
use crate::fp::{Class, Descriptor, ROUNDING_BITS, Value};
use crate::wideint::WideInt;

/// Largest packed image the engine can export
pub const MAX_PACKED_BYTES: usize = 16;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytesError {
    /// The packed width must be a whole number of bytes to serialize
    #[error("packed width of {0} bits is not a whole number of bytes")]
    NotByteAligned(u32),

    /// The packed width exceeds [`MAX_PACKED_BYTES`]
    #[error("packed width of {0} bits exceeds the engine maximum")]
    TooWide(u32),
}

/// Produce the packed bit image of a value. NaNs pack as the canonical
/// quiet NaN of their format, infinities as the canonical infinity with the
/// sign preserved.
pub(crate) fn pack(value: &Value) -> WideInt {
    let value = match value.class {
        Class::Nan => Value::qnan(&value.desc),
        Class::Inf => Value::inf(&value.desc, value.sign),
        _ => *value,
    };
    let desc = value.desc;

    // mantissa without the rounding bits
    let (mant, _) = value.mant.shr(ROUNDING_BITS);
    let mut packed = mant.zero_extend(desc.mantissa_size);

    // exponent to the left of the mantissa
    packed = packed.or(&value.exp.shl(desc.mantissa_size));
    packed = packed.zero_extend(desc.mantissa_size + desc.exponent_size);

    if value.sign {
        packed.set_bit(desc.mantissa_size + desc.exponent_size);
    }
    packed
}

impl FloatCalc {
    /// Export a value as its packed little-endian byte image
    pub fn val_to_bytes(
        &self,
        value: &Value,
    ) -> Result<ArrayVec<u8, MAX_PACKED_BYTES>, BytesError> {
        let n_bits = value.descriptor().packed_bits();
        if n_bits % 8 != 0 {
            return Err(BytesError::NotByteAligned(n_bits));
        }
        if n_bits as usize > MAX_PACKED_BYTES * 8 {
            return Err(BytesError::TooWide(n_bits));
        }
        let packed = pack(value);
        let mut out = ArrayVec::new();
        for i in 0..(n_bits / 8) {
            out.push(packed.sub_byte(n_bits, i));
        }
        Ok(out)
    }

    /// Import a value from its packed little-endian byte image. Bytes
    /// beyond the end of the buffer read as zero.
    pub fn val_from_bytes(&self, buffer: &[u8], desc: &Descriptor) -> Value {
        let mantissa_size = desc.mantissa_size;
        let exponent_size = desc.exponent_size;
        let sign_bit = exponent_size + mantissa_size;

        let mant = WideInt::from_bits(buffer, 0, mantissa_size);
        let exp = WideInt::from_bits(buffer, mantissa_size, mantissa_size + exponent_size);
        let sign_byte = (sign_bit / 8) as usize;
        let sign = sign_byte < buffer.len() && buffer[sign_byte] & (1 << (sign_bit % 8)) != 0;

        let mut out = Value {
            desc: *desc,
            class: Class::Normal,
            sign,
            exp,
            // make room for the rounding bits
            mant: mant.shl(ROUNDING_BITS),
        };
        self.classify_unpacked(&mut out);
        out
    }

    /// Classify a freshly unpacked value and renormalize where the
    /// encoding calls for it
    pub(crate) fn classify_unpacked(&self, out: &mut Value) {
        let desc = out.desc;
        if out.exp.is_zero() {
            if out.mant.is_zero() {
                out.class = Class::Zero;
            } else {
                out.class = Class::Subnormal;
                // the virtual leading one of a subnormal sits one bit
                // right of the normalized position
                out.mant = out.mant.shl(1);
                self.normalize(out, false);
            }
        } else if out.exp.low_bits_all_one(desc.exponent_size) {
            let frac_bits = desc.mantissa_size + ROUNDING_BITS - desc.explicit_one as u32;
            if out.mant.low_bits_zero(frac_bits) {
                if !desc.explicit_one {
                    out.mant.set_bit(ROUNDING_BITS + desc.mantissa_size);
                }
                out.class = Class::Inf;
            } else {
                out.class = Class::Nan;
            }
        } else {
            out.class = Class::Normal;
            // the stored form implies the leading one; the engine always
            // carries it explicitly
            if !desc.explicit_one {
                out.mant.set_bit(ROUNDING_BITS + desc.mantissa_size);
            }
            self.normalize(out, false);
        }
    }

    /// One byte of the packed image, as emitted into initializer data
    pub fn packed_byte(&self, value: &Value, num_bits: u32, byte_ofs: u32) -> u8 {
        pack(value).sub_byte(num_bits, byte_ofs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(fc: &FloatCalc, v: &Value) -> Value {
        let bytes = fc.val_to_bytes(v).unwrap();
        assert_eq!(bytes.len() * 8, v.descriptor().packed_bits() as usize);
        fc.val_from_bytes(&bytes, v.descriptor())
    }

    #[test]
    fn known_single_encodings() {
        let fc = FloatCalc::default();
        let desc = Descriptor::SINGLE;

        // 1.0f32 = 0x3F800000
        let one = fc.val_from_bytes(&0x3F80_0000u32.to_le_bytes(), &desc);
        assert_eq!(one.class(), Class::Normal);
        assert_eq!(one.exponent(), 0);
        assert!(!one.is_negative());
        let bytes = fc.val_to_bytes(&one).unwrap();
        assert_eq!(bytes.as_slice(), &0x3F80_0000u32.to_le_bytes());

        // -2.5f32 = 0xC0200000
        let v = fc.val_from_bytes(&0xC020_0000u32.to_le_bytes(), &desc);
        assert!(v.is_negative());
        assert_eq!(v.exponent(), 1);
        assert_eq!(
            fc.val_to_bytes(&v).unwrap().as_slice(),
            &0xC020_0000u32.to_le_bytes()
        );

        // smallest positive subnormal = 0x00000001
        let denorm = fc.val_from_bytes(&1u32.to_le_bytes(), &desc);
        assert!(denorm.is_subnormal());
        assert_eq!(
            fc.val_to_bytes(&denorm).unwrap().as_slice(),
            &1u32.to_le_bytes()
        );

        // +inf = 0x7F800000, NaN = 0x7FC00000
        let inf = fc.val_from_bytes(&0x7F80_0000u32.to_le_bytes(), &desc);
        assert!(inf.is_inf());
        assert_eq!(inf, Value::inf(&desc, false));
        let nan = fc.val_from_bytes(&0x7FC0_0000u32.to_le_bytes(), &desc);
        assert!(nan.is_nan());
        assert!(nan.is_quiet_nan());
        assert_eq!(nan, Value::qnan(&desc));
    }

    #[test]
    fn roundtrip_all_classes() {
        let fc = FloatCalc::default();
        for desc in [Descriptor::SINGLE, Descriptor::DOUBLE, Descriptor::EXTENDED] {
            let values = [
                Value::zero(&desc, false),
                Value::zero(&desc, true),
                Value::inf(&desc, false),
                Value::inf(&desc, true),
                Value::qnan(&desc),
                Value::max(&desc, false),
                Value::max(&desc, true),
                Value::small(&desc),
                Value::epsilon(&desc),
            ];
            for v in values {
                assert_eq!(roundtrip(&fc, &v), v, "{desc:?} {v:?}");
            }
        }
    }

    #[test]
    fn short_buffer_reads_zero() {
        let fc = FloatCalc::default();
        let v = fc.val_from_bytes(&[], &Descriptor::SINGLE);
        assert!(v.is_zero());
    }

    #[test]
    fn odd_width_rejected() {
        let fc = FloatCalc::default();
        // 1 + 5 + 10 = 16 bits packs, 1 + 5 + 11 = 17 does not
        let half = Descriptor::new(5, 10, false);
        assert!(fc.val_to_bytes(&Value::small(&half)).is_ok());
        let odd = Descriptor::new(5, 11, false);
        assert_eq!(
            fc.val_to_bytes(&Value::small(&odd)),
            Err(BytesError::NotByteAligned(17))
        );
    }

    #[test]
    fn packed_byte_extraction() {
        let fc = FloatCalc::default();
        let desc = Descriptor::SINGLE;
        let one = fc.val_from_bytes(&0x3F80_0000u32.to_le_bytes(), &desc);
        assert_eq!(fc.packed_byte(&one, 32, 0), 0x00);
        assert_eq!(fc.packed_byte(&one, 32, 2), 0x80);
        assert_eq!(fc.packed_byte(&one, 32, 3), 0x3F);
        assert_eq!(fc.packed_byte(&one, 32, 4), 0x00);
    }

    #[test]
    fn extended_explicit_integer_bit() {
        let fc = FloatCalc::default();
        let desc = Descriptor::EXTENDED;

        // 1.0 in x86 extended: exponent = bias, mantissa = 0x8000000000000000
        let mut image = [0u8; 10];
        image[7] = 0x80;
        image[8] = 0xFF;
        image[9] = 0x3F;
        let one = fc.val_from_bytes(&image, &desc);
        assert_eq!(one.class(), Class::Normal);
        assert_eq!(one.exponent(), 0);
        assert_eq!(fc.val_to_bytes(&one).unwrap().as_slice(), &image);

        // infinity carries the integer bit in the packed form
        let inf = Value::inf(&desc, true);
        let bytes = fc.val_to_bytes(&inf).unwrap();
        assert_eq!(bytes[7], 0x80);
        assert_eq!(bytes[8], 0xFF);
        assert_eq!(bytes[9], 0xFF);
        assert_eq!(fc.val_from_bytes(&bytes, &desc), inf);
    }
}
