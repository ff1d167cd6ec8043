mod bytes;
mod decode;
mod encode;
mod error;
mod file;
mod header;
mod seen;
mod tag;
mod value;

/// Bounded byte cursor, writer, and primitive field types.
pub use bytes::{Cursor, Endianness, IntWidth, Writer};
/// Decoder entry points and options.
pub use decode::{DecodeOptions, Thawed, thaw, thaw_with};
/// Encoder entry points and options.
pub use encode::{EncodeOptions, freeze, freeze_with};
/// Error and result aliases.
pub use error::{Result, StorableError};
/// File-backed wrappers.
pub use file::{retrieve, retrieve_with, store, store_with};
/// Image header representation.
pub use header::{ByteOrder, Framing, Header, Layout, MAGIC, MAJOR, MAX_MINOR, NativeLayout};
/// Object-index and class-name tables.
pub use seen::{ClassTable, SeenTable, TagTable};
/// Tag catalog.
pub use tag::{MAX_SHORT_CLASS, MAX_SHORT_STRING, REGEXP_LARGE_PATTERN, Shape, TAGS, Tag, TagInfo, hook_flags};
/// Object graph types.
pub use value::{ClassName, CodeSource, Graph, HASH_RESTRICTED, Hook, HookKind, Immortal, MapEntry, Mapping, NodeId, TieKind, Value, key_flags};
