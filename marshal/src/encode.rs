//! The encoder: spec §4.3/§4.5's recursive dump walker.
//!
//! Dispatch order is fixed: object-ref check, then immediates, then the
//! user-marshal hook, then the user-dump hook, then the built-in type's own
//! tag. Object-table insertion timing differs per branch — see each
//! `encode_*` method's doc comment for exactly when it happens and why.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{
    Error,
    Result,
};
use crate::intern::ObjectTable;
use crate::intern::SymbolTable;
use crate::io::Output;
use crate::registry::{
    ClassRef,
    DumpBytesHook,
    ValueHook,
};
use crate::tag;
use crate::value::{
    ObjectData,
    Symbol,
    Value,
};

/// Configuration for a dump call (spec §4's `DumpOptions`).
#[derive(Clone, Copy, Debug)]
pub struct DumpOptions {
    /// Maximum composite nesting depth before failing with
    /// [`Error::DepthLimitExceeded`] (spec §8 property 6).
    pub depth_limit: i32,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions { depth_limit: 100 }
    }
}

thread_local! {
    // Set for the duration of any top-level `dump`/`dump_to_bytes`/
    // `dump_to_stream` call. A user hook that calls back into one of those
    // entry points while this is already set is reentering the same dump
    // (spec §5's reentry guard, §8 property 7) rather than starting an
    // independent one — there is no way for a hook to observe or extend an
    // in-progress `Encoder` directly, since hooks only ever receive `Value`s.
    static DUMP_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

struct ReentryGuard(&'static std::thread::LocalKey<Cell<bool>>);

impl ReentryGuard {
    fn enter(flag: &'static std::thread::LocalKey<Cell<bool>>, who: &str) -> Result<Self> {
        let already = flag.with(Cell::get);
        if already {
            return Err(Error::Reentered(who.to_string()));
        }
        flag.with(|c| c.set(true));
        Ok(ReentryGuard(flag))
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        self.0.with(|c| c.set(false));
    }
}

/// The recursive encoder. Holds the write-side intern tables and the
/// remaining recursion budget for one top-level [`dump`] call.
pub struct Encoder<'o, O: Output + ?Sized> {
    out: &'o mut O,
    symbols: SymbolTable,
    objects: ObjectTable,
    depth: i32,
}

impl<'o, O: Output + ?Sized> Encoder<'o, O> {
    fn new(out: &'o mut O, opts: DumpOptions) -> Self {
        Encoder {
            out,
            symbols: SymbolTable::default(),
            objects: ObjectTable::default(),
            depth: opts.depth_limit,
        }
    }

    fn write_varint(&mut self, x: i64) -> Result<()> {
        crate::varint::encode(x, self.out)
    }

    fn write_length_prefixed(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as i64)?;
        self.out.write(bytes)?;
        Ok(())
    }

    fn write_symbol(&mut self, sym: &Symbol) -> Result<()> {
        if let Some(idx) = self.symbols.get(sym) {
            self.out.push_byte(tag::SYMLINK)?;
            return self.write_varint(idx as i64);
        }
        self.symbols.insert(sym.clone());
        self.out.push_byte(tag::SYMBOL)?;
        self.write_length_prefixed(sym.as_str().as_bytes())
    }

    fn enter_composite(&mut self) -> Result<()> {
        if self.depth <= 0 {
            return Err(Error::DepthLimitExceeded);
        }
        self.depth -= 1;
        Ok(())
    }

    fn leave_composite(&mut self) {
        self.depth += 1;
    }

    /// Encodes one value, per spec §4.3/§4.5's dispatch order.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn encode_value(&mut self, value: &Value) -> Result<()> {
        // 1. object-ref check — before anything else, immediates excepted.
        if let Some(id) = value.identity() {
            if let Some(idx) = self.objects.get(id) {
                tracing::trace!(idx, "object-ref");
                self.out.push_byte(tag::OBJECT_REF)?;
                return self.write_varint(idx as i64);
            }
        }

        // 2. immediates: never occupy an object-table slot.
        match value {
            Value::Nil => return self.out.push_byte(tag::NIL),
            Value::Bool(true) => return self.out.push_byte(tag::TRUE),
            Value::Bool(false) => return self.out.push_byte(tag::FALSE),
            Value::Int(i) => {
                self.out.push_byte(tag::INT)?;
                return self.write_varint(*i);
            }
            Value::Symbol(s) => return self.write_symbol(s),
            _ => {}
        }

        self.enter_composite()?;
        let result = self.encode_composite(value);
        self.leave_composite();
        result
    }

    fn encode_composite(&mut self, value: &Value) -> Result<()> {
        tracing::trace!(kind = value.type_name(), "encode composite");
        match value {
            Value::Object(rc) => {
                let id = value.identity().unwrap();
                let class = rc.borrow().class.clone();
                if let Some(hook) = class.hooks.marshal_dump.clone() {
                    return self.encode_user_marshal(value, id, &class, &rc.borrow(), hook);
                }
                if let Some(hook) = class.hooks.dump.clone() {
                    return self.encode_user_dump(value, id, &class, &rc.borrow(), hook);
                }
                self.objects.insert(id);
                self.out.push_byte(tag::OBJECT)?;
                self.write_symbol(&Symbol::new(&class.name))?;
                self.encode_ivar_block(&rc.borrow().ivars)
            }
            Value::Struct(rc) => {
                let id = value.identity().unwrap();
                self.objects.insert(id);
                let data = rc.borrow();
                self.out.push_byte(tag::STRUCT)?;
                self.write_symbol(&Symbol::new(&data.class.name))?;
                self.write_varint(data.members.len() as i64)?;
                for (name, member) in &data.members {
                    self.write_symbol(name)?;
                    self.encode_value(member)?;
                }
                Ok(())
            }
            Value::Data(rc) => {
                let id = value.identity().unwrap();
                self.objects.insert(id);
                let class = rc.borrow().class.clone();
                let hook = class.hooks.dump_data.clone().ok_or_else(|| Error::MissingHook {
                    class: class.name.clone(),
                    hook: "_dump_data",
                })?;
                self.out.push_byte(tag::DATA)?;
                self.write_symbol(&Symbol::new(&class.name))?;
                let payload = hook(value)?;
                self.encode_value(&payload)
            }
            Value::Float(rc) => {
                let id = value.identity().unwrap();
                self.objects.insert(id);
                self.out.push_byte(tag::FLOAT)?;
                let formatted = format_float(*rc.borrow());
                self.write_length_prefixed(formatted.as_bytes())
            }
            Value::Str(rc) => {
                let id = value.identity().unwrap();
                self.objects.insert(id);
                self.out.push_byte(tag::STRING)?;
                self.write_length_prefixed(&rc.borrow())
            }
            Value::Array(rc) => {
                let id = value.identity().unwrap();
                self.objects.insert(id);
                self.out.push_byte(tag::ARRAY)?;
                let len = rc.borrow().len();
                self.write_varint(len as i64)?;
                for i in 0..len {
                    let item = rc.borrow()[i].clone();
                    self.encode_value(&item)?;
                }
                if rc.borrow().len() != len {
                    return Err(Error::ContainerModifiedDuringDump);
                }
                Ok(())
            }
            Value::Hash(rc) => {
                let id = value.identity().unwrap();
                if rc.borrow().default.is_some() {
                    return Err(Error::HashDefaultUnsupported);
                }
                self.objects.insert(id);
                self.out.push_byte(tag::HASH)?;
                let len = rc.borrow().entries.len();
                self.write_varint(len as i64)?;
                for i in 0..len {
                    let (k, v) = rc.borrow().entries[i].clone();
                    self.encode_value(&k)?;
                    self.encode_value(&v)?;
                }
                if rc.borrow().entries.len() != len {
                    return Err(Error::ContainerModifiedDuringDump);
                }
                Ok(())
            }
            Value::Class(class) => self.encode_class_or_module(tag::CLASS, class),
            Value::Module(class) => self.encode_class_or_module(tag::MODULE, class),
            Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Symbol(_) => {
                unreachable!("immediates are handled by encode_value before recursion")
            }
        }
    }

    /// `marshal_dump`: inserted into the object table *first* — the
    /// replacement value is free to contain a `@` reference back to this
    /// object (spec §4.3 step 3).
    fn encode_user_marshal(
        &mut self,
        value: &Value,
        id: *const (),
        class: &ClassRef,
        data: &ObjectData,
        hook: ValueHook,
    ) -> Result<()> {
        self.objects.insert(id);
        let replacement = hook(value)?;
        let ivars = data.ivars.clone();
        if !ivars.is_empty() {
            self.out.push_byte(tag::IVAR)?;
        }
        self.out.push_byte(tag::USER_MARSHAL)?;
        self.write_symbol(&Symbol::new(&class.name))?;
        self.encode_value(&replacement)?;
        if !ivars.is_empty() {
            self.encode_ivar_block(&ivars)?;
        }
        Ok(())
    }

    /// `_dump`: its payload is opaque bytes, so (unlike `marshal_dump`) it
    /// cannot self-reference — the object table is only updated *after* the
    /// hook returns (spec §4.3 step 4).
    fn encode_user_dump(
        &mut self,
        value: &Value,
        id: *const (),
        class: &ClassRef,
        data: &ObjectData,
        hook: DumpBytesHook,
    ) -> Result<()> {
        let bytes = hook(value, self.depth)?;
        let ivars = data.ivars.clone();
        if !ivars.is_empty() {
            self.out.push_byte(tag::IVAR)?;
        }
        self.out.push_byte(tag::USER_DEF)?;
        self.write_symbol(&Symbol::new(&class.name))?;
        self.write_length_prefixed(&bytes)?;
        if !ivars.is_empty() {
            self.encode_ivar_block(&ivars)?;
        }
        self.objects.insert(id);
        Ok(())
    }

    fn encode_ivar_block(&mut self, ivars: &[(Symbol, Value)]) -> Result<()> {
        self.write_varint(ivars.len() as i64)?;
        for (name, value) in ivars {
            self.write_symbol(name)?;
            self.encode_value(value)?;
        }
        Ok(())
    }

    fn encode_class_or_module(&mut self, wire_tag: u8, class: &ClassRef) -> Result<()> {
        let id = Rc::as_ptr(class) as *const ();
        self.objects.insert(id);
        self.out.push_byte(wire_tag)?;
        self.write_length_prefixed(class.name.as_bytes())
    }
}

/// Formats a float the way the wire format requires: `"inf"`/`"-inf"`/
/// `"nan"`/`"0"`/`"-0"` for their special cases, otherwise a fixed-point
/// rendering with trailing zeros (and a trailing `.`) trimmed off.
fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    let mut s = format!("{f:.17}");
    if let Some(dot) = s.find('.') {
        let trim_from = s[dot..]
            .rfind(|c: char| c != '0')
            .map(|i| dot + i + 1)
            .unwrap_or(dot);
        s.truncate(trim_from.max(dot + 2));
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

/// Dumps `value` to `out`, preceded by the two-byte version prefix (spec
/// §8 property 1).
#[tracing::instrument(level = "debug", skip(value, out))]
pub fn dump<O: Output + ?Sized>(value: &Value, out: &mut O, opts: DumpOptions) -> Result<()> {
    let _guard = ReentryGuard::enter(&DUMP_ACTIVE, "dump")?;
    out.push_byte(crate::MAJOR_VERSION)?;
    out.push_byte(crate::MINOR_VERSION)?;
    let mut encoder = Encoder::new(out, opts);
    encoder.encode_value(value)
}

/// Dumps `value` to a freshly allocated buffer.
pub fn dump_to_bytes(value: &Value, opts: DumpOptions) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    dump(value, &mut buf, opts)?;
    Ok(buf)
}

#[cfg(feature = "std")]
pub fn dump_to_stream<W: std::io::Write>(
    value: &Value,
    w: &mut W,
    opts: DumpOptions,
) -> Result<()> {
    let mut writer = crate::io::StreamWriter(w);
    dump(value, &mut writer, opts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{
        ClassKind,
        Hooks,
    };
    use crate::value::ObjectData;
    use std::cell::RefCell;

    #[test]
    fn nil_is_a_single_byte() {
        assert_eq!(dump_to_bytes(&Value::Nil, DumpOptions::default()).unwrap(), vec![4, 8, b'0']);
    }

    #[test]
    fn small_int_uses_varint() {
        let bytes = dump_to_bytes(&Value::Int(1), DumpOptions::default()).unwrap();
        assert_eq!(bytes, vec![4, 8, b'i', 6]);
    }

    #[test]
    fn string_has_no_ivar_wrapper() {
        let bytes = dump_to_bytes(&Value::string(*b"ab"), DumpOptions::default()).unwrap();
        assert_eq!(bytes, vec![4, 8, b'"', 7, b'a', b'b']);
    }

    #[test]
    fn shared_strings_dump_as_one_object_plus_a_reference() {
        let shared = Value::string(*b"x");
        let array = Value::array(vec![shared.clone(), shared]);
        let bytes = dump_to_bytes(&array, DumpOptions::default()).unwrap();
        // `[`, count=2, `"` string #0, then `@` ref to index 0.
        assert_eq!(bytes[2], b'[');
        assert!(bytes.contains(&tag::OBJECT_REF));
    }

    #[test]
    fn cyclic_array_encodes_without_looping_forever() {
        let array = Rc::new(RefCell::new(Vec::new()));
        array.borrow_mut().push(Value::Array(array.clone()));
        let bytes = dump_to_bytes(&Value::Array(array), DumpOptions::default()).unwrap();
        assert_eq!(bytes, vec![4, 8, b'[', 6, b'@', 0]);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut value = Value::array(vec![]);
        for _ in 0..200 {
            value = Value::array(vec![value]);
        }
        let err = dump_to_bytes(&value, DumpOptions { depth_limit: 100 }).unwrap_err();
        assert!(matches!(err, Error::DepthLimitExceeded));
    }

    #[test]
    fn hash_with_default_is_refused() {
        let hash = Value::Hash(Rc::new(RefCell::new(crate::value::HashData {
            entries: vec![],
            default: Some(crate::value::HashDefault::Value(Value::Int(0))),
        })));
        assert!(matches!(
            dump_to_bytes(&hash, DumpOptions::default()),
            Err(Error::HashDefaultUnsupported)
        ));
    }

    #[test]
    fn mutating_an_array_mid_dump_is_detected() {
        let inner = Rc::new(RefCell::new(Vec::new()));
        let weak_inner = inner.clone();
        // A marshal_dump hook that mutates a sibling array while it's mid-encode.
        let hooks = Hooks {
            marshal_dump: Some(Rc::new(move |_v| {
                weak_inner.borrow_mut().push(Value::Int(1));
                Ok(Value::Nil)
            })),
            ..Hooks::default()
        };
        let class_with_hook = Rc::new(crate::registry::ClassDef {
            name: "Mutator".to_string(),
            kind: ClassKind::Class,
            struct_members: None,
            hooks,
        });
        let hooked = Value::Object(Rc::new(RefCell::new(ObjectData {
            class: class_with_hook,
            ivars: vec![],
        })));
        let array = Value::Array(inner.clone());
        inner.borrow_mut().push(hooked);
        let err = dump_to_bytes(&array, DumpOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ContainerModifiedDuringDump));
    }

    #[test]
    fn float_formatting_matches_the_wire_rules() {
        let bytes = dump_to_bytes(&Value::float(1.5), DumpOptions::default()).unwrap();
        assert_eq!(&bytes[4..], b"1.5");
        let bytes = dump_to_bytes(&Value::float(0.0), DumpOptions::default()).unwrap();
        assert_eq!(&bytes[4..], b"0");
        let bytes = dump_to_bytes(&Value::float(f64::INFINITY), DumpOptions::default()).unwrap();
        assert_eq!(&bytes[4..], b"inf");
    }

    #[test]
    fn reentrant_dump_is_rejected() {
        let class_with_hook = {
            let hooks = Hooks {
                marshal_dump: Some(Rc::new(|_v| {
                    let result = dump_to_bytes(&Value::Int(1), DumpOptions::default());
                    assert!(matches!(result, Err(Error::Reentered(_))));
                    Ok(Value::Nil)
                })),
                ..Hooks::default()
            };
            Rc::new(crate::registry::ClassDef {
                name: "Reentrant".to_string(),
                kind: ClassKind::Class,
                struct_members: None,
                hooks,
            })
        };
        let value = Value::Object(Rc::new(RefCell::new(ObjectData {
            class: class_with_hook,
            ivars: vec![],
        })));
        dump_to_bytes(&value, DumpOptions::default()).unwrap();
    }
}
