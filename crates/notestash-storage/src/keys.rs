//! Shared naming helpers for storage backends.
//!
//! Filesystem and WebDAV store files as `{uuid}.{ext}`; S3 and Azure key
//! objects by the bare uuid.

use crate::{MediaError, MediaResult};

/// Whether `segment` can be used as a single path/URL segment.
///
/// Rejects empty values, `..` and path separators so a name can never
/// resolve outside the upload directory.
pub(crate) fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains("..")
        && !segment.contains('/')
        && !segment.contains('\\')
}

/// Build the stored file name for an upload: `{uuid}.{ext}`.
pub(crate) fn file_name(uuid: &str, ext: &str) -> MediaResult<String> {
    if !is_safe_segment(uuid) {
        return Err(MediaError::InvalidKey(format!(
            "uuid {:?} is not usable as a file name",
            uuid
        )));
    }
    if !is_safe_segment(ext) {
        return Err(MediaError::InvalidKey(format!(
            "extension {:?} is not usable as a file name",
            ext
        )));
    }
    Ok(format!("{}.{}", uuid, ext))
}

/// Join URL segments with exactly one `/` between them.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        url.push('/');
        url.push_str(segment);
    }
    url
}
