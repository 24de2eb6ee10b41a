//! Scalar keys and values: integers, floats and strings.
//!
//! Keys are ordered numerically across integers and floats, and every number
//! sorts before every string. Values are persisted as canonical UTF-8 text
//! and coerced back with [`Scalar::from_text`].

use crate::error::Error;
use std::cmp::Ordering;
use std::fmt;

/// A key or value stored in the tree.
#[derive(Debug, Clone)]
pub enum Scalar {
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
}

impl Scalar {
    /// Parses text as an integer, else as a float, else keeps it as a string.
    pub fn from_text(text: &str) -> Self {
        if let Ok(i) = text.parse::<i64>() {
            Self::Int(i)
        } else if let Ok(f) = text.parse::<f64>() {
            Self::Float(f)
        } else {
            Self::Str(text.to_string())
        }
    }

    /// Canonical text form used when the scalar is stored as a value.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }

    /// Returns the integer if this is an [`Scalar::Int`].
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float if this is a [`Scalar::Float`].
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string if this is a [`Scalar::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        // Matches f64::total_cmp: positive NaN above every number.
        return if f.is_sign_negative() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    // Every i64 lies in [-2^63, 2^63).
    if f >= 9_223_372_036_854_775_808.0 {
        return Ordering::Less;
    }
    if f < -9_223_372_036_854_775_808.0 {
        return Ordering::Greater;
    }
    let truncated = f.trunc();
    match i.cmp(&(truncated as i64)) {
        Ordering::Equal => 0.0f64.total_cmp(&(f - truncated)),
        other => other,
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => {
                if a == b {
                    // 0.0 and -0.0 are the same key.
                    Ordering::Equal
                } else {
                    a.total_cmp(b)
                }
            }
            (Self::Int(a), Self::Float(b)) => cmp_int_float(*a, *b),
            (Self::Float(a), Self::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Str(_), _) => Ordering::Greater,
            (_, Self::Str(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => {
                let text = x.to_string();
                // Keep floats distinguishable from integers once stored as text.
                if x.is_finite() && !text.contains(['.', 'e', 'E']) {
                    write!(f, "{}.0", text)
                } else {
                    f.write_str(&text)
                }
            }
            Self::Str(s) => f.write_str(s),
        }
    }
}

macro_rules! scalar_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Scalar {
                fn from(value: $t) -> Self {
                    Self::Int(i64::from(value))
                }
            }
        )*
    };
}

scalar_from_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! scalar_try_from_int {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for Scalar {
                type Error = Error;

                fn try_from(value: $t) -> Result<Self, Error> {
                    i64::try_from(value).map(Self::Int).map_err(|_| Error::InvalidType {
                        role: "scalar",
                        reason: format!(
                            "{} value {} does not fit in a 64-bit signed integer",
                            stringify!($t),
                            value
                        ),
                    })
                }
            }
        )*
    };
}

scalar_try_from_int!(u64, usize, isize, i128, u128);

impl From<f32> for Scalar {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for Scalar {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}
