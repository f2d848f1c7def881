//! A bit-compatible binary object marshal codec.
//!
//! Wire-compatible with a dynamic-language object marshal format at version
//! 4.8: a tagged, length-prefixed binary encoding with a variable-length
//! integer scheme, symbol/object back-references for sharing and cycles,
//! and an extensible per-class hook protocol (`marshal_dump`/`marshal_load`,
//! `_dump`/`_load`, `_dump_data`/`_load_data`).
//!
//! ```
//! use marshal::{dump_to_bytes, load_from_bytes, registry::Registry, DumpOptions, Value};
//!
//! let registry = Registry::new();
//! let value = Value::array(vec![Value::Int(1), Value::string(*b"hi")]);
//! let bytes = dump_to_bytes(&value, DumpOptions::default()).unwrap();
//! let back = load_from_bytes(&bytes, &registry).unwrap();
//! assert_eq!(value, back);
//! ```

pub mod convert;
pub mod decode;
pub mod encode;
pub mod error;
pub mod intern;
pub mod io;
pub mod registry;
pub mod tag;
pub mod value;
pub mod varint;

#[cfg(feature = "derive")]
pub use marshal_derive::{
    FromValue,
    ToValue,
};

pub use decode::{
    load,
    load_from_bytes,
    LoadOptions,
};
#[cfg(feature = "std")]
pub use decode::load_from_stream;
pub use encode::{
    dump,
    dump_to_bytes,
    DumpOptions,
};
#[cfg(feature = "std")]
pub use encode::dump_to_stream;
pub use error::{
    Error,
    Result,
};
pub use value::{
    HashData,
    HashDefault,
    Symbol,
    Value,
};

/// `load`/`load_from_bytes`/`load_from_stream`'s conventional alias, matching
/// the reference module surface's own `restore` name.
pub use load as restore;

/// Major version this codec writes and accepts.
pub const MAJOR_VERSION: u8 = 4;
/// Minor version this codec writes; it accepts any minor version up to and
/// including this one.
pub const MINOR_VERSION: u8 = 8;

/// A bridge trait from a native Rust type to the dynamic [`Value`]
/// representation, implemented by `#[derive(ToValue)]` (spec §9's "derive
/// helper" layer described in the design notes).
pub trait ToValue {
    /// Converts `self` into a [`Value::Object`] (or another variant, for
    /// manual implementations bridging to a built-in type).
    fn to_value(&self) -> Value;
}

/// The converse of [`ToValue`], implemented by `#[derive(FromValue)]`.
pub trait FromValue: Sized {
    /// Attempts to reconstruct `Self` from a decoded [`Value`].
    fn from_value(value: &Value) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn version_constants_match_the_wire_format() {
        let bytes = dump_to_bytes(&Value::Nil, DumpOptions::default()).unwrap();
        assert_eq!(&bytes[..2], &[MAJOR_VERSION, MINOR_VERSION]);
    }

    #[test]
    fn restore_is_an_alias_for_load() {
        let registry = Registry::new();
        let bytes = dump_to_bytes(&Value::Int(5), DumpOptions::default()).unwrap();
        let mut slice = bytes.as_slice();
        let value = restore(&mut slice, &registry, LoadOptions::default()).unwrap();
        assert_eq!(value, Value::Int(5));
    }

    #[test]
    fn public_api_roundtrips_a_nested_value() {
        let registry = Registry::new();
        let value = Value::array(vec![
            Value::Int(1),
            Value::string(*b"hi"),
            Value::hash(vec![(Value::Symbol(Symbol::new("k")), Value::Bool(true))]),
        ]);
        let bytes = dump_to_bytes(&value, DumpOptions::default()).unwrap();
        let back = load_from_bytes(&bytes, &registry).unwrap();
        assert_eq!(value, back);
    }
}
