//! Derive macros bridging native Rust structs/enums to the marshal crate's
//! dynamic [`Value::Object`](marshal::Value) representation.

#![deny(unused_must_use)]

extern crate proc_macro;
mod from_value;
mod to_value;

use self::{
    from_value::from_value_derive,
    to_value::to_value_derive,
};

synstructure::decl_derive!(
    [ToValue] =>
    /// Derives `marshal::ToValue` for a struct or enum, converting it to a
    /// `Value::Object` whose instance variables mirror the type's fields
    /// (an enum's variant name becomes part of the class name).
    to_value_derive
);
synstructure::decl_derive!(
    [FromValue] =>
    /// Derives `marshal::FromValue`, the converse of `ToValue`.
    from_value_derive
);
