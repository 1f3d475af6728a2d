//! Shared plumbing for the decimal newtypes.
//!
//! `Price` and `Size` are both thin wrappers around `rust_decimal::Decimal`;
//! this macro gives them the same constructors, parsing, string-based serde
//! and additive arithmetic, leaving only the grid logic to each type.

macro_rules! decimal_newtype {
    ($name:ident) => {
        impl $name {
            pub const ZERO: $name = $name(rust_decimal::Decimal::ZERO);

            pub fn new(value: rust_decimal::Decimal) -> Self {
                Self(value)
            }

            pub fn value(&self) -> rust_decimal::Decimal {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.is_zero()
            }

            pub fn is_positive(&self) -> bool {
                self.0.is_sign_positive() && !self.0.is_zero()
            }
        }

        impl std::str::FromStr for $name {
            type Err = rust_decimal::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<rust_decimal::Decimal>().map(Self)
            }
        }

        impl From<rust_decimal::Decimal> for $name {
            fn from(value: rust_decimal::Decimal) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        // Venues quote decimals as strings; keep them that way on the wire
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::ops::Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl std::ops::Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl std::ops::Neg for $name {
            type Output = Self;

            fn neg(self) -> Self {
                Self(-self.0)
            }
        }
    };
}

pub(crate) use decimal_newtype;

/// Snap `value` onto the grid of `step` using `round`. Non-positive steps are ignored.
pub(crate) fn snap(
    value: rust_decimal::Decimal,
    step: rust_decimal::Decimal,
    round: impl FnOnce(rust_decimal::Decimal) -> rust_decimal::Decimal,
) -> rust_decimal::Decimal {
    if step <= rust_decimal::Decimal::ZERO {
        return value;
    }
    round(value / step) * step
}
