//! Single-byte tag discriminants, as laid out in spec §4.3's type table.

pub const NIL: u8 = b'0';
pub const TRUE: u8 = b'T';
pub const FALSE: u8 = b'F';
pub const INT: u8 = b'i';
pub const SYMBOL: u8 = b':';
pub const SYMLINK: u8 = b';';
pub const FLOAT: u8 = b'f';
pub const STRING: u8 = b'"';
pub const ARRAY: u8 = b'[';
pub const HASH: u8 = b'{';
pub const HASH_DEFAULT: u8 = b'}';
pub const CLASS: u8 = b'c';
pub const MODULE: u8 = b'm';
pub const STRUCT: u8 = b'S';
pub const OBJECT: u8 = b'o';
pub const DATA: u8 = b'd';
pub const OBJECT_REF: u8 = b'@';
pub const IVAR: u8 = b'I';
pub const USER_DEF: u8 = b'u';
pub const USER_MARSHAL: u8 = b'U';
pub const UCLASS: u8 = b'C';
pub const EXTENDED: u8 = b'e';
pub const BIGNUM: u8 = b'l';
