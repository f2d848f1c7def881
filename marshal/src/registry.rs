//! Class & symbol registry: the host-runtime collaborator from spec §6.
//!
//! The wire codec needs to resolve a dotted class name to a class handle,
//! instantiate new instances, and look up the optional user-hook methods a
//! class defines. A real host language runtime would own all of this; this
//! crate provides `Registry`, a concrete in-memory implementation, so the
//! codec is usable (and testable) standalone. Anything implementing
//! [`ClassResolver`] can stand in for it.

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{
    Error,
    Result,
};
use crate::value::{
    Symbol,
    Value,
};

/// Whether a class handle names a `class` or a `module`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// A regular class, instantiable via `allocate`.
    Class,
    /// A module, used only for namespacing / `extend`.
    Module,
}

/// `marshal_dump`/`_dump_data`: replaces the object with another value to
/// dump, or produces the value to recursively marshal.
pub type ValueHook = Rc<dyn Fn(&Value) -> Result<Value>>;
/// `marshal_load`/`_load_data`: populates a freshly allocated+interned
/// instance from a decoded value.
pub type LoadHook = Rc<dyn Fn(&Value, Value) -> Result<()>>;
/// `_dump(limit)`: serializes the object to an opaque byte string.
pub type DumpBytesHook = Rc<dyn Fn(&Value, i32) -> Result<Vec<u8>>>;
/// Class-level `_load(bytes)`: builds a fresh instance from bytes.
pub type LoadBytesHook = Rc<dyn Fn(&[u8]) -> Result<Value>>;
/// Custom `allocate` class method.
pub type AllocateHook = Rc<dyn Fn(&ClassRef) -> Result<Value>>;

/// The optional user-hook protocol a class may implement (spec §4.5, §9).
///
/// Each slot mirrors one method from the dispatcher's capability model:
/// `marshal_dump`/`marshal_load` (user-marshal protocol), `dump`/`load`
/// (user-dump protocol, `_dump`/`_load` in the source vocabulary), and
/// `dump_data`/`load_data` (the data-object protocol). All are optional;
/// a class with none of them is encoded/decoded as a plain object.
#[derive(Default, Clone)]
pub struct Hooks {
    /// `marshal_dump`: replaces the object with another value to encode.
    pub marshal_dump: Option<ValueHook>,
    /// `marshal_load`: populates a freshly allocated+interned instance
    /// from the decoded replacement value.
    pub marshal_load: Option<LoadHook>,
    /// `_dump(limit)`: serializes the object to an opaque byte string.
    pub dump: Option<DumpBytesHook>,
    /// Class-level `_load(bytes)`: builds a fresh instance from bytes.
    pub load: Option<LoadBytesHook>,
    /// `_dump_data`: produces the value to recursively marshal for a data object.
    pub dump_data: Option<ValueHook>,
    /// `_load_data`: populates a freshly allocated+interned data object.
    pub load_data: Option<LoadHook>,
    /// Custom `allocate` class method; falls back to the default allocator
    /// (an empty plain object / data object) when absent.
    pub allocate: Option<AllocateHook>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("marshal_dump", &self.marshal_dump.is_some())
            .field("marshal_load", &self.marshal_load.is_some())
            .field("dump", &self.dump.is_some())
            .field("load", &self.load.is_some())
            .field("dump_data", &self.dump_data.is_some())
            .field("load_data", &self.load_data.is_some())
            .field("allocate", &self.allocate.is_some())
            .finish()
    }
}

/// A resolved class or module handle.
#[derive(Debug)]
pub struct ClassDef {
    /// Fully-qualified dotted name, as it appears on the wire.
    pub name: String,
    /// Class vs. module.
    pub kind: ClassKind,
    /// Declared positional member symbols, for `Struct` classes only.
    pub struct_members: Option<Vec<Symbol>>,
    /// The class's optional user-hook protocol.
    pub hooks: Hooks,
}

/// A shared handle to a [`ClassDef`]. Two resolutions of the same class
/// name are the same `Rc` (pointer-equal), which is what lets the encoder's
/// back-reference check and the object intern table treat class/module
/// values like any other interned object.
pub type ClassRef = Rc<ClassDef>;

/// Resolves class/module names to handles, the read side of spec §6's
/// "class & symbol registry interface".
pub trait ClassResolver {
    /// Resolves a dotted class or module name, failing with
    /// [`Error::UndefinedClass`] if the host doesn't know it.
    fn resolve(&self, name: &str) -> Result<ClassRef>;
}

/// A concrete, in-memory class registry.
///
/// This plays the role of "the host runtime" for this crate's own
/// convenience API and tests. A real embedding would implement
/// [`ClassResolver`] directly against its own class table instead.
#[derive(Default)]
pub struct Registry {
    classes: HashMap<String, ClassRef>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class (or replaces an existing one of the same name),
    /// returning the shared handle.
    pub fn define_class(&mut self, name: impl Into<String>, hooks: Hooks) -> ClassRef {
        let name = name.into();
        let def = Rc::new(ClassDef {
            name: name.clone(),
            kind: ClassKind::Class,
            struct_members: None,
            hooks,
        });
        self.classes.insert(name, def.clone());
        def
    }

    /// Registers a `Struct`-backed class with its declared, ordered member
    /// names (spec §4.4's `S` tag requires these to validate a decode).
    pub fn define_struct_class(
        &mut self,
        name: impl Into<String>,
        members: Vec<Symbol>,
        hooks: Hooks,
    ) -> ClassRef {
        let name = name.into();
        let def = Rc::new(ClassDef {
            name: name.clone(),
            kind: ClassKind::Class,
            struct_members: Some(members),
            hooks,
        });
        self.classes.insert(name, def.clone());
        def
    }

    /// Registers a module.
    pub fn define_module(&mut self, name: impl Into<String>) -> ClassRef {
        let name = name.into();
        let def = Rc::new(ClassDef {
            name: name.clone(),
            kind: ClassKind::Module,
            struct_members: None,
            hooks: Hooks::default(),
        });
        self.classes.insert(name, def.clone());
        def
    }
}

impl ClassResolver for Registry {
    fn resolve(&self, name: &str) -> Result<ClassRef> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UndefinedClass(name.to_string()))
    }
}
