//! [`ToValue`]/[`FromValue`] impls for the primitive and standard-library
//! types a `#[derive(ToValue, FromValue)]` struct's fields are typically
//! made of. A derived impl just calls `to_value`/`from_value` on each field
//! in turn, so these are what make the derive useful out of the box.

use crate::error::{
    Error,
    Result,
};
use crate::value::{
    Symbol,
    Value,
};
use crate::{
    FromValue,
    ToValue,
};

macro_rules! int_impl {
    ($($t:ty),+) => {
        $(
            impl ToValue for $t {
                fn to_value(&self) -> Value {
                    Value::Int(*self as i64)
                }
            }

            impl FromValue for $t {
                fn from_value(value: &Value) -> Result<Self> {
                    match value {
                        Value::Int(i) => Ok(*i as $t),
                        other => Err(Error::TypeMismatch {
                            expected: stringify!($t),
                            found: other.type_name().to_string(),
                        }),
                    }
                }
            }
        )+
    };
}

int_impl!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::TypeMismatch {
                expected: "bool",
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::string(self.as_bytes().to_vec())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Str(bytes) => Ok(String::from_utf8_lossy(&bytes.borrow()).into_owned()),
            other => Err(Error::TypeMismatch {
                expected: "String",
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl ToValue for Symbol {
    fn to_value(&self) -> Value {
        Value::Symbol(self.clone())
    }
}

impl FromValue for Symbol {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Symbol(s) => Ok(s.clone()),
            other => Err(Error::TypeMismatch {
                expected: "Symbol",
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.borrow().iter().map(T::from_value).collect(),
            other => Err(Error::TypeMismatch {
                expected: "Vec<_>",
                found: other.type_name().to_string(),
            }),
        }
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Nil,
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Nil => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_roundtrip_through_value() {
        assert_eq!(i32::from_value(&42i32.to_value()).unwrap(), 42);
    }

    #[test]
    fn vec_of_strings_roundtrips() {
        let v = vec!["a".to_string(), "b".to_string()];
        let value = v.to_value();
        assert_eq!(Vec::<String>::from_value(&value).unwrap(), v);
    }

    #[test]
    fn option_none_is_nil() {
        let none: Option<i32> = None;
        assert_eq!(none.to_value(), Value::Nil);
        assert_eq!(Option::<i32>::from_value(&Value::Nil).unwrap(), None);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let err = i32::from_value(&Value::Bool(true)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
