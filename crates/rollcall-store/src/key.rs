//! Storage key scheme: `faces/{identity}/{timestamp}-{seq}-{suffix}.{ext}`.
//!
//! Timestamps are fixed-width UTC and `seq` numbers the images of one upload
//! batch, so lexicographic key order is upload order. The random suffix keeps
//! two uploads in the same instant apart.
//!
//! An identity owns only the keys directly under its prefix. Identities may
//! contain `/`, so `faces/u1/x/...` belongs to `u1/x` and never to `u1`.

use chrono::{DateTime, Utc};
use rollcall_core::Identity;
use uuid::Uuid;

const ROOT: &str = "faces";
const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

/// Prefix under which every object for `identity` lives. Also used as the
/// identity's placeholder ("directory") key.
pub fn identity_prefix(identity: &Identity) -> String {
    format!("{ROOT}/{identity}/")
}

/// Fresh, never-reused key for the `seq`-th image of a batch uploaded at `at`.
pub fn reference_key(identity: &Identity, at: DateTime<Utc>, seq: usize, extension: &str) -> String {
    format!(
        "{}{}-{seq:04}-{}.{extension}",
        identity_prefix(identity),
        at.format("%Y%m%dT%H%M%S%.6fZ"),
        Uuid::new_v4().simple()
    )
}

/// Whether reference images may be stored with this file extension.
pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e))
}

/// Whether `key` names a reference image (as opposed to a placeholder or
/// some other object sharing the prefix).
pub fn is_image_key(key: &str) -> bool {
    key.rsplit_once('.')
        .map(|(_, ext)| is_image_extension(ext))
        .unwrap_or(false)
}

/// Whether `key` lives directly under `identity`'s prefix.
pub fn belongs_to(identity: &Identity, key: &str) -> bool {
    key.strip_prefix(&identity_prefix(identity))
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// Whether `key` is one of `identity`'s reference images.
pub fn is_reference_of(identity: &Identity, key: &str) -> bool {
    belongs_to(identity, key) && is_image_key(key)
}
