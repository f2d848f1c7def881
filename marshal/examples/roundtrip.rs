//! Dumps and reloads a derived struct through its `Value::Object` form.

use marshal::registry::{
    Hooks,
    Registry,
};
use marshal::{
    dump_to_bytes,
    load_from_bytes,
    DumpOptions,
    FromValue,
    ToValue,
};

#[derive(ToValue, FromValue, Debug, PartialEq)]
struct Point {
    x: i64,
    y: i64,
    label: String,
}

fn main() {
    let point = Point {
        x: 3,
        y: 4,
        label: "origin+3,4".to_string(),
    };

    let bytes = dump_to_bytes(&point.to_value(), DumpOptions::default()).unwrap();
    println!("dumped {} bytes", bytes.len());

    let mut registry = Registry::new();
    registry.define_class("Point", Hooks::default());
    let value = load_from_bytes(&bytes, &registry).unwrap();
    let back = Point::from_value(&value).unwrap();

    assert_eq!(point, back);
    println!("roundtrip ok: {back:?}");
}
