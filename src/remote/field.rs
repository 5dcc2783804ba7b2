//! Field Names
//!
//! Remote stores address values by string. `ToField` turns a cache key into
//! that string: primitives format directly, `ByDisplay` defers to the key's
//! own `Display`, and `Encoded` falls back to the codec.

use std::fmt;

use serde::Serialize;

use crate::codec::Codec;
use crate::error::CodecError;

// == ToField Trait ==
/// Converts a cache key into its remote field name.
pub trait ToField {
    fn to_field<C: Codec>(&self, codec: &C) -> Result<String, CodecError>;
}

impl<T: ToField + ?Sized> ToField for &T {
    fn to_field<C: Codec>(&self, codec: &C) -> Result<String, CodecError> {
        (**self).to_field(codec)
    }
}

impl ToField for str {
    fn to_field<C: Codec>(&self, _codec: &C) -> Result<String, CodecError> {
        Ok(self.to_string())
    }
}

impl ToField for String {
    fn to_field<C: Codec>(&self, _codec: &C) -> Result<String, CodecError> {
        Ok(self.clone())
    }
}

/// Bytes are taken as text; invalid UTF-8 is replaced.
impl ToField for [u8] {
    fn to_field<C: Codec>(&self, _codec: &C) -> Result<String, CodecError> {
        Ok(String::from_utf8_lossy(self).into_owned())
    }
}

impl ToField for Vec<u8> {
    fn to_field<C: Codec>(&self, codec: &C) -> Result<String, CodecError> {
        self.as_slice().to_field(codec)
    }
}

// Display of integers, floats, bool and char is already the canonical form;
// floats print their shortest round-trip decimal without an exponent.
macro_rules! display_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToField for $ty {
                fn to_field<C: Codec>(&self, _codec: &C) -> Result<String, CodecError> {
                    Ok(self.to_string())
                }
            }
        )*
    };
}

display_field!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

// == Wrappers ==
/// Key whose field name is its `Display` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByDisplay<T>(pub T);

impl<T: fmt::Display> ToField for ByDisplay<T> {
    fn to_field<C: Codec>(&self, _codec: &C) -> Result<String, CodecError> {
        Ok(self.0.to_string())
    }
}

/// Key whose field name is its codec encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Encoded<T>(pub T);

impl<T: Serialize> ToField for Encoded<T> {
    fn to_field<C: Codec>(&self, codec: &C) -> Result<String, CodecError> {
        let bytes = codec.encode(&self.0)?;
        String::from_utf8(bytes).map_err(|e| CodecError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
    struct UserId {
        tenant: u32,
        id: u64,
    }

    impl fmt::Display for UserId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}", self.tenant, self.id)
        }
    }

    #[test]
    fn test_primitive_fields() {
        let codec = JsonCodec;
        assert_eq!("abc".to_field(&codec).unwrap(), "abc");
        assert_eq!(String::from("abc").to_field(&codec).unwrap(), "abc");
        assert_eq!((-42i32).to_field(&codec).unwrap(), "-42");
        assert_eq!(u64::MAX.to_field(&codec).unwrap(), "18446744073709551615");
        assert_eq!(true.to_field(&codec).unwrap(), "true");
        assert_eq!('x'.to_field(&codec).unwrap(), "x");
        assert_eq!(b"raw".to_vec().to_field(&codec).unwrap(), "raw");
    }

    #[test]
    fn test_float_fields_use_shortest_decimal() {
        let codec = JsonCodec;
        assert_eq!(1.5f64.to_field(&codec).unwrap(), "1.5");
        assert_eq!(3.0f64.to_field(&codec).unwrap(), "3");
        assert_eq!(0.1f32.to_field(&codec).unwrap(), "0.1");
        assert_eq!(1e21f64.to_field(&codec).unwrap(), "1000000000000000000000");
    }

    #[test]
    fn test_wrapper_fields() {
        let codec = JsonCodec;
        let user = UserId { tenant: 7, id: 99 };

        assert_eq!(ByDisplay(user.clone()).to_field(&codec).unwrap(), "7:99");
        assert_eq!(
            Encoded(user).to_field(&codec).unwrap(),
            r#"{"tenant":7,"id":99}"#
        );
    }

    #[test]
    fn test_reference_fields() {
        let codec = JsonCodec;
        let key = String::from("k");
        let by_ref: &String = &key;
        assert_eq!(by_ref.to_field(&codec).unwrap(), "k");
        assert_eq!((&&7u8).to_field(&codec).unwrap(), "7");
    }
}
