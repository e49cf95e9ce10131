//! Media types for downloadable payloads
//!
//! Lookup is by file extension, ignoring case, over the kinds of files that
//! are usually fetched with range requests: archives, disk images, installer
//! packages and media. Anything else is reported as unknown; callers then
//! send [`OCTET_STREAM`].

use std::path::Path;

/// Media type for payloads with no better description
pub const OCTET_STREAM: &str = "application/octet-stream";

const MEDIA_TYPES: &[(&str, &str)] = &[
    // Archives and compressed streams
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tgz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("bz2", "application/x-bzip2"),
    ("xz", "application/x-xz"),
    ("zst", "application/zstd"),
    ("7z", "application/x-7z-compressed"),
    ("rar", "application/vnd.rar"),
    // Disk images
    ("iso", "application/x-iso9660-image"),
    ("img", OCTET_STREAM),
    ("dmg", "application/x-apple-diskimage"),
    // Installers and packages
    ("deb", "application/vnd.debian.binary-package"),
    ("rpm", "application/x-rpm"),
    ("apk", "application/vnd.android.package-archive"),
    ("msi", "application/x-msi"),
    ("exe", "application/vnd.microsoft.portable-executable"),
    ("wasm", "application/wasm"),
    // Video
    ("mp4", "video/mp4"),
    ("m4v", "video/mp4"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("ts", "video/mp2t"),
    // Audio
    ("mp3", "audio/mpeg"),
    ("m4a", "audio/mp4"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    // Documents and images
    ("pdf", "application/pdf"),
    ("epub", "application/epub+zip"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    // Text that travels next to downloads (checksums, manifests)
    ("txt", "text/plain; charset=utf-8"),
    ("sha256", "text/plain; charset=utf-8"),
    ("sig", "application/pgp-signature"),
    ("asc", "application/pgp-signature"),
    ("json", "application/json"),
    ("csv", "text/csv"),
];

/// Media type for an extension such as `"iso"` or `"MP4"`
///
/// # Examples
/// ```
/// use rangeserve::http::mime::from_extension;
/// assert_eq!(from_extension("ISO"), Some("application/x-iso9660-image"));
/// assert_eq!(from_extension("unknown"), None);
/// ```
pub fn from_extension(extension: &str) -> Option<&'static str> {
    MEDIA_TYPES
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|&(_, media_type)| media_type)
}

/// Media type for a file path, `None` when the extension is missing or unknown
pub fn from_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(from_extension)
}
