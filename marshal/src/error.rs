//! Error types produced by encoding and decoding.

/// Result type used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that can occur while dumping or loading a value.
///
/// Each variant corresponds to one of the error kinds from the wire format
/// design: format errors (truncated/malformed input), version mismatches,
/// type errors (a value or hook produced the wrong shape), depth exhaustion,
/// the one intentionally unsupported tag (bignum), and runtime misuse
/// (reentry, concurrent mutation).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reader returned fewer bytes than required to make progress.
    #[error("marshal data too short")]
    DataTooShort,
    /// An unrecognized tag byte was encountered.
    #[error("dump format error(0x{tag:02x})")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
    },
    /// A `float` tag's payload wasn't a valid numeric literal.
    #[error("float format error")]
    InvalidFloatLiteral,
    /// A [`crate::FromValue`] conversion found the wrong `Value` variant.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        /// The Rust type the conversion was attempting to produce.
        expected: &'static str,
        /// The actual runtime type name found on the value.
        found: String,
    },
    /// A `symlink`/`object-ref` tag pointed past the end of its intern table.
    #[error("bad symbol/object link")]
    BadLink,
    /// A varint payload would not fit the host's native integer width.
    #[error("integer too big")]
    IntegerTooBig,
    /// A length prefix was negative where only a non-negative size is valid.
    #[error("negative length")]
    NegativeLength,
    /// A `S` (struct) tag's member count didn't match the registered class.
    #[error("not compatible (struct size differs)")]
    StructSizeMismatch,
    /// A `S` tag's member name didn't match the registered class, in order.
    #[error("not compatible (:{found} for :{expected})")]
    StructMemberMismatch {
        /// Declared member name.
        expected: String,
        /// Member name found on the wire.
        found: String,
    },
    /// The major/minor version prefix didn't match what this codec supports.
    #[error("incompatible marshal file format (can't be read) {major}.{minor}")]
    IncompatibleVersion {
        /// Major version read from the stream.
        major: u8,
        /// Minor version read from the stream.
        minor: u8,
    },
    /// Dumping a hash with a default value or default proc, which this
    /// implementation refuses (see Open Question 2 in the design docs).
    #[error("cannot dump hash with default value or default proc")]
    HashDefaultUnsupported,
    /// A class name on the wire did not resolve to a class/module at all.
    #[error("undefined class/module {0}")]
    UndefinedClass(String),
    /// A class name was expected to resolve to a class but resolved to a
    /// module, or vice versa, or a `C` (uclass) wrapped an incompatible type.
    #[error("{0} does not refer to a class/module")]
    NotAClassOrModule(String),
    /// A required hook (`marshal_load`, `_load`, `_load_data`) was missing.
    #[error("class {class} must have a `{hook}` hook to unmarshal")]
    MissingHook {
        /// Name of the class missing the hook.
        class: String,
        /// Name of the hook that was required.
        hook: &'static str,
    },
    /// Recursion depth limit was exhausted while encoding.
    #[error("exceed depth limit")]
    DepthLimitExceeded,
    /// Bignums (`l` tag) are not implemented by this codec (by design).
    #[error("not implemented: bignum")]
    NotImplemented,
    /// A dump/load call was reentered through a hook on the same state.
    #[error("{0} reentered")]
    Reentered(String),
    /// A container (hash/array) was mutated while being walked for dumping.
    #[error("container modified during dump")]
    ContainerModifiedDuringDump,
    /// The underlying reader/writer failed.
    #[error("io error: {0}")]
    Io(String),
}
