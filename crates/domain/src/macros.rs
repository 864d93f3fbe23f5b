//! Macro for implementing Display and FromStr for string-backed enums
//!
//! Presence statuses and anomaly kinds round-trip through TEXT columns in the
//! shared store; this macro keeps both directions in one declaration.

/// Implements Display and FromStr for an enum whose variants map to
/// lowercase string representations.
///
/// Parsing is case-insensitive; Display always produces the lowercase form
/// stored in the database.
#[macro_export]
macro_rules! impl_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
