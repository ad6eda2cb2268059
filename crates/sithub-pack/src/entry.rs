use sithub_store::ObjectKind;

/// Stream magic.
pub const PACK_MAGIC: &[u8; 4] = b"SHPK";

/// Current stream format version.
pub const PACK_VERSION: u32 = 1;

/// Tag byte that introduces the end marker.
pub const END_TAG: u8 = 0;

/// Largest compressed record the reader will buffer.
pub const MAX_RECORD_SIZE: u64 = 512 * 1024 * 1024;

/// Record tag byte for an object kind.
pub fn kind_tag(kind: ObjectKind) -> u8 {
    match kind {
        ObjectKind::Blob => 1,
        ObjectKind::Tree => 2,
        ObjectKind::Commit => 3,
    }
}

/// Object kind for a record tag byte. `None` for the end tag and unknown tags.
pub fn kind_from_tag(tag: u8) -> Option<ObjectKind> {
    match tag {
        1 => Some(ObjectKind::Blob),
        2 => Some(ObjectKind::Tree),
        3 => Some(ObjectKind::Commit),
        _ => None,
    }
}
