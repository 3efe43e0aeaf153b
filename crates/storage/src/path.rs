//! Path validation.
//!
//! Every path handed to a backend is relative to that backend's root. These
//! helpers make sure nothing (a hostile manga identifier, a sloppy template)
//! can walk back out of it.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a relative storage path.
///
/// `.` components and redundant separators are dropped, `..` is resolved, and
/// anything that would climb above the root (or names a Windows prefix, or
/// smuggles a NUL byte) is rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use folio_storage::validate_path;
/// assert!(validate_path("solo-leveling/12/page_0000.png").is_ok());
/// assert!(validate_path("solo-leveling/../other/1").is_ok()); // (never leaves root)
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("x/../solo-leveling/./12//").unwrap(),
///     Path::new("solo-leveling/12")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a string intended to be used as exactly one path component
/// (a directory or file name), such as a manga identifier.
///
/// Stricter than [`validate`]: separators, `.`/`..` and leading dots are all
/// rejected rather than resolved, so the component can be joined onto any
/// relative path without changing its depth or hiding itself.
///
/// ```
/// use folio_storage::validate_component;
/// assert!(validate_component("solo-leveling").is_ok());
/// assert!(validate_component("a/b").is_err());
/// assert!(validate_component("..").is_err());
/// assert!(validate_component(".staging").is_err());
/// ```
pub fn validate_component(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).components().count() != 1;
    if invalid {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(name)));
    }
    Ok(name)
}
