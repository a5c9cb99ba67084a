use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use crate::DocfillError;
use crate::DocfillResult;

/// Supplies the text of imported templates.
pub trait TemplateLoader {
	/// Load `path`, which has already been checked to be a relative path that
	/// stays inside `root`.
	fn load(&self, root: &Path, path: &Path) -> DocfillResult<String>;
}

/// Loads imports from the file system. Symlinks that lead outside the root
/// are rejected after canonicalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl TemplateLoader for FsLoader {
	fn load(&self, root: &Path, path: &Path) -> DocfillResult<String> {
		let not_found = || {
			DocfillError::ImportNotFound {
				path: path.display().to_string(),
				root: root.display().to_string(),
			}
		};

		let canonical_root = root.canonicalize().map_err(|_| not_found())?;
		let canonical = canonical_root
			.join(path)
			.canonicalize()
			.map_err(|_| not_found())?;

		if !canonical.starts_with(&canonical_root) {
			return Err(DocfillError::ImportSecurityViolation {
				path: path.display().to_string(),
				root: root.display().to_string(),
			});
		}

		if !canonical.is_file() {
			return Err(not_found());
		}

		Ok(std::fs::read_to_string(&canonical)?)
	}
}

/// Normalize an import path and make sure it cannot leave the template root.
///
/// Absolute paths and any `..` that climbs above the root are rejected
/// whether or not the target exists.
pub fn resolve_import(root: &Path, import: &str) -> DocfillResult<PathBuf> {
	let violation = || {
		DocfillError::ImportSecurityViolation {
			path: import.to_string(),
			root: root.display().to_string(),
		}
	};

	let mut normalized = PathBuf::new();
	for component in Path::new(import).components() {
		match component {
			Component::Normal(part) => normalized.push(part),
			Component::CurDir => {}
			Component::ParentDir => {
				if !normalized.pop() {
					return Err(violation());
				}
			}
			Component::RootDir | Component::Prefix(_) => return Err(violation()),
		}
	}

	if normalized.as_os_str().is_empty() {
		return Err(DocfillError::ImportNotFound {
			path: import.to_string(),
			root: root.display().to_string(),
		});
	}

	Ok(normalized)
}
