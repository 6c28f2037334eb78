//! Space and precondition checks.
//!
//! `check` is the read-only gate every run passes through before anything on
//! disk is touched. It validates the source, rejects overlapping
//! source/destination pairs, walks the source into a `TreePlan` and compares
//! the tree size against the free space on the destination's volume.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::fs_ops::{self, TreePlan};
use crate::model::{backup_path_for, CopyOptions, CopyRequest};

/// Result of a successful precondition check.
#[derive(Debug, Clone)]
pub struct SpaceReport {
    /// Sum of file (and symlink) sizes under the source
    pub required_bytes: u64,
    /// Free bytes on the destination volume
    pub available_bytes: u64,
    /// Margin demanded on top of `required_bytes`
    pub reserve_bytes: u64,
    pub files_total: u64,
    pub dirs_total: u64,
    /// The walk used to size the tree, reused for copying
    pub plan: TreePlan,
}

/// Validate a request without mutating anything.
pub fn check_request(
    request: &CopyRequest,
    options: &CopyOptions,
) -> Result<SpaceReport, EngineError> {
    check(&request.source_path, &request.destination_path, options)
}

/// Validate `source` against `destination`.
///
/// # Errors
/// - `SourceNotFound` / `SourceNotDirectory` if the source is unusable
/// - `InvalidRequest` if the two paths are the same or nested
/// - `InsufficientSpace` if the tree plus reserve exceeds free space
pub fn check(
    source: &Path,
    destination: &Path,
    options: &CopyOptions,
) -> Result<SpaceReport, EngineError> {
    let source_real = validate_source(source)?;
    validate_pairing(&source_real, destination)?;

    let plan = fs_ops::enumerate_tree(source)?;
    let required_bytes = plan.total_bytes();
    let reserve_bytes = options.space_reserve.reserve_for(required_bytes);

    let volume_root = nearest_existing_ancestor(destination)?;
    let available_bytes = available_space(&volume_root).map_err(|e| {
        EngineError::SpaceQueryFailed {
            path: volume_root.clone(),
            source: e,
        }
    })?;

    tracing::debug!(
        required = required_bytes,
        reserve = reserve_bytes,
        available = available_bytes,
        volume = %volume_root.display(),
        "space check"
    );

    ensure_fits(required_bytes, reserve_bytes, available_bytes)?;

    Ok(SpaceReport {
        required_bytes,
        available_bytes,
        reserve_bytes,
        files_total: plan.file_count(),
        dirs_total: plan.dir_count(),
        plan,
    })
}

/// Exact comparison: one byte over is a failure.
fn ensure_fits(required: u64, reserve: u64, available: u64) -> Result<(), EngineError> {
    let needed = required.saturating_add(reserve);
    if needed > available {
        return Err(EngineError::InsufficientSpace {
            required: needed,
            available,
        });
    }
    Ok(())
}

fn validate_source(source: &Path) -> Result<PathBuf, EngineError> {
    match std::fs::metadata(source) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::SourceNotDirectory {
                path: source.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(EngineError::SourceNotFound {
                path: source.to_path_buf(),
            })
        }
    }
    source
        .canonicalize()
        .map_err(|_| EngineError::SourceNotFound {
            path: source.to_path_buf(),
        })
}

/// Reject destinations that would clobber or recurse into the source.
fn validate_pairing(source_real: &Path, destination: &Path) -> Result<(), EngineError> {
    if destination.as_os_str().is_empty() {
        return Err(EngineError::InvalidRequest {
            reason: "destination path is empty".to_string(),
        });
    }

    let backup = backup_path_for(destination).ok_or_else(|| EngineError::InvalidRequest {
        reason: format!(
            "destination {} has no final component to derive a backup name from",
            destination.display()
        ),
    })?;

    let destination_real = resolve_lexically(destination)?;
    let backup_real = resolve_lexically(&backup)?;

    if destination_real == source_real {
        return Err(EngineError::InvalidRequest {
            reason: format!(
                "source and destination are the same path: {}",
                source_real.display()
            ),
        });
    }
    if destination_real.starts_with(source_real) {
        return Err(EngineError::InvalidRequest {
            reason: format!(
                "destination {} lies inside source {}",
                destination.display(),
                source_real.display()
            ),
        });
    }
    if source_real.starts_with(&destination_real) {
        return Err(EngineError::InvalidRequest {
            reason: format!(
                "source {} lies inside destination {}",
                source_real.display(),
                destination.display()
            ),
        });
    }
    if source_real.starts_with(&backup_real) {
        return Err(EngineError::InvalidRequest {
            reason: format!(
                "source {} is the destination's backup folder {}; it would be deleted",
                source_real.display(),
                backup.display()
            ),
        });
    }

    Ok(())
}

/// Canonicalise the longest existing prefix of `path` and re-append the rest.
///
/// This lets paths that do not exist yet be compared against real ones.
fn resolve_lexically(path: &Path) -> Result<PathBuf, EngineError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| EngineError::InvalidRequest {
                reason: format!("cannot resolve relative path {}: {}", path.display(), e),
            })?
            .join(path)
    };

    let mut existing = absolute.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            let mut resolved = real;
            for component in tail.iter().rev() {
                resolved.push(component);
            }
            return Ok(resolved);
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(absolute),
        }
    }
}

/// The destination itself if it exists, otherwise its closest existing parent.
fn nearest_existing_ancestor(destination: &Path) -> Result<PathBuf, EngineError> {
    let absolute = resolve_lexically(destination)?;
    let mut cursor = absolute.as_path();
    loop {
        if cursor.exists() {
            return Ok(cursor.to_path_buf());
        }
        match cursor.parent() {
            Some(parent) => cursor = parent,
            None => {
                return Err(EngineError::SpaceQueryFailed {
                    path: destination.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no existing ancestor"),
                })
            }
        }
    }
}

/// Free bytes available to the current user on the volume holding `path`.
#[cfg(unix)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    let available = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
    Ok(available)
}

/// Free bytes available to the current user on the volume holding `path`.
#[cfg(windows)]
pub fn available_space(path: &Path) -> io::Result<u64> {
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;

    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
    let mut free_to_caller: u64 = 0;
    // SAFETY: wide is NUL-terminated; null pointers are allowed for the
    // totals we do not need.
    let ok = unsafe {
        GetDiskFreeSpaceExW(
            wide.as_ptr(),
            &mut free_to_caller,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(free_to_caller)
}

#[cfg(not(any(unix, windows)))]
pub fn available_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space query is not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpaceReserve;
    use std::fs;

    fn source_with_files(root: &Path) -> PathBuf {
        let src = root.join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("x.txt"), b"hi").unwrap();
        fs::write(src.join("sub").join("y.txt"), b"yo").unwrap();
        src
    }

    #[test]
    fn test_check_reports_sizes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = source_with_files(temp_dir.path());
        let dst = temp_dir.path().join("dst");

        let report = check(&src, &dst, &CopyOptions::default()).expect("check failed");
        assert_eq!(report.required_bytes, 4);
        assert_eq!(report.files_total, 2);
        assert_eq!(report.dirs_total, 1);
        assert_eq!(report.reserve_bytes, 0);
        assert!(report.available_bytes >= 4);
    }

    #[test]
    fn test_missing_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = check(
            &temp_dir.path().join("nope"),
            &temp_dir.path().join("dst"),
            &CopyOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::SourceNotFound { .. })));
    }

    #[test]
    fn test_file_as_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();
        let result = check(&file, &temp_dir.path().join("dst"), &CopyOptions::default());
        assert!(matches!(result, Err(EngineError::SourceNotDirectory { .. })));
    }

    #[test]
    fn test_same_path_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = source_with_files(temp_dir.path());
        let alias = temp_dir.path().join("src").join("..").join("src");
        let result = check(&src, &alias, &CopyOptions::default());
        assert!(matches!(result, Err(EngineError::InvalidRequest { .. })));
    }

    #[test]
    fn test_nested_paths_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = source_with_files(temp_dir.path());

        let inside = check(&src, &src.join("copy"), &CopyOptions::default());
        assert!(matches!(inside, Err(EngineError::InvalidRequest { .. })));

        let outer = check(&src.join("sub"), &src, &CopyOptions::default());
        assert!(matches!(outer, Err(EngineError::InvalidRequest { .. })));
    }

    #[test]
    fn test_source_equal_to_backup_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("b_old");
        fs::create_dir(&src).unwrap();
        let result = check(&src, &temp_dir.path().join("b"), &CopyOptions::default());
        assert!(matches!(result, Err(EngineError::InvalidRequest { .. })));
    }

    #[test]
    fn test_exact_space_boundary() {
        assert!(ensure_fits(100, 0, 100).is_ok());
        assert!(matches!(
            ensure_fits(101, 0, 100),
            Err(EngineError::InsufficientSpace {
                required: 101,
                available: 100
            })
        ));
        assert!(ensure_fits(99, 1, 100).is_ok());
        assert!(ensure_fits(99, 2, 100).is_err());
    }

    #[test]
    fn test_reserve_can_exceed_available() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = source_with_files(temp_dir.path());
        let options = CopyOptions {
            space_reserve: SpaceReserve::Bytes(u64::MAX),
            ..CopyOptions::default()
        };
        let result = check(&src, &temp_dir.path().join("dst"), &options);
        assert!(matches!(result, Err(EngineError::InsufficientSpace { .. })));
    }

    #[test]
    fn test_nearest_ancestor_for_missing_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nearest = nearest_existing_ancestor(&temp_dir.path().join("a").join("b"))
            .expect("ancestor lookup failed");
        assert_eq!(nearest, temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_available_space_on_temp_dir() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let free = available_space(temp_dir.path()).expect("statvfs failed");
        assert!(free > 0);
    }
}
