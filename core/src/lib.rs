//! Soft floating-point engine for cross-target constant folding.
//!
//! Performs IEEE-754-style arithmetic on values of arbitrary user-chosen
//! width with explicit rounding-mode control, correct subnormal, infinity
//! and NaN handling, and bit-exact packed byte import/export. Compiler
//! front-ends and code generators use it to fold float constants for
//! targets whose semantics differ from the host's: every operation runs on
//! a wide internal mantissa and rounds to the target format afterwards, so
//! results are identical on every host.
//!
//! ```
//! use floe_core::{Base, Descriptor, FloatCalc};
//!
//! let mut fc = FloatCalc::default();
//! let one = fc.cast(&fc.val_from_str("1"), &Descriptor::SINGLE);
//! let two = fc.cast(&fc.val_from_str("2"), &Descriptor::SINGLE);
//! let half = fc.div(&one, &two);
//! assert!(fc.is_exact());
//! assert_eq!(fc.format(&half, Base::Packed), "0x3f000000");
//! ```

pub mod calc;
pub mod fp;
pub mod wideint;

pub use calc::bytes::BytesError;
pub use calc::format::Base;
pub use calc::{DEFAULT_PRECISION, FloatCalc, Flt2IntError, MAX_PRECISION};
pub use fp::{Class, Descriptor, ROUNDING_BITS, RoundingMode, Value};
