use crate::config::{Allowlist, PolicyConfig};
use crate::error::PolicyViolation;
use serde::{Serialize, Serializer};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// An absolute path with every symlink resolved. Only constructible through canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    /// Canonicalize an existing path.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        fs::canonicalize(path).map(Self)
    }

    /// Canonicalize a path whose tail may not exist yet: the deepest existing ancestor is
    /// resolved and the missing components are appended. `..` is not allowed in the missing part.
    pub fn new_lenient(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let mut existing = absolute.as_path();
        let mut missing = Vec::new();
        loop {
            match fs::canonicalize(existing) {
                Ok(resolved) => {
                    let mut full = resolved;
                    for component in missing.iter().rev() {
                        full.push(component);
                    }
                    return Ok(Self(full));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    let Some(name) = existing.file_name() else {
                        return Err(e);
                    };
                    missing.push(name.to_os_string());
                    existing = match existing.parent() {
                        Some(parent) => parent,
                        None => return Err(e),
                    };
                    // `Path::file_name` is None for `..`, so a parent-dir in the tail lands here.
                    if matches!(existing.components().next_back(), Some(Component::ParentDir)) {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "parent traversal in a path that does not exist",
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// True if `self` equals `root` or lies beneath it, compared per path segment.
    pub fn is_within(&self, root: &CanonicalPath) -> bool {
        self.0.starts_with(&root.0)
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl Serialize for CanonicalPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.display())
    }
}

/// Confines working directories and path parameters to the allowed roots.
pub struct RootConfinement<'a> {
    roots: &'a Allowlist<CanonicalPath>,
}

impl<'a> RootConfinement<'a> {
    pub fn new(policy: &'a PolicyConfig) -> Self {
        Self {
            roots: &policy.allowed_roots,
        }
    }

    /// Check a working directory. It must exist.
    pub fn check_dir(&self, path: impl AsRef<Path>) -> Result<PathBuf, PolicyViolation> {
        self.check_with(path.as_ref(), |p| CanonicalPath::new(p))
    }

    /// Check a path parameter, which may name something not created yet.
    pub fn check_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, PolicyViolation> {
        self.check_with(path.as_ref(), |p| CanonicalPath::new_lenient(p))
    }

    fn check_with(
        &self,
        path: &Path,
        canonicalize: impl Fn(&Path) -> io::Result<CanonicalPath>,
    ) -> Result<PathBuf, PolicyViolation> {
        let roots = match self.roots {
            Allowlist::Unrestricted => {
                return Ok(canonicalize(path)
                    .map(CanonicalPath::into_path_buf)
                    .unwrap_or_else(|_| path.to_path_buf()));
            }
            Allowlist::Only(roots) => roots,
        };

        let outside = || PolicyViolation::PathOutsideAllowedRoots(path.display().to_string());
        let canonical = canonicalize(path).map_err(|_| outside())?;
        if roots.iter().any(|root| canonical.is_within(root)) {
            Ok(canonical.into_path_buf())
        } else {
            tracing::warn!(path = %canonical, "Path outside allowed roots");
            Err(outside())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn policy_with_roots(roots: &[&Path]) -> PolicyConfig {
        PolicyConfig {
            allowed_roots: Allowlist::Only(
                roots
                    .iter()
                    .map(|r| CanonicalPath::new(r).unwrap())
                    .collect::<BTreeSet<_>>(),
            ),
            ..PolicyConfig::unrestricted()
        }
    }

    #[test]
    fn test_root_itself_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let policy = policy_with_roots(&[dir.path()]);
        assert!(RootConfinement::new(&policy).check_dir(dir.path()).is_ok());
    }

    #[test]
    fn test_sibling_with_shared_prefix_rejected() {
        let base = tempfile::tempdir().unwrap();
        let user = base.path().join("user");
        let evil = base.path().join("user-evil");
        let user2 = base.path().join("user2");
        for d in [&user, &evil, &user2] {
            fs::create_dir(d).unwrap();
        }
        let policy = policy_with_roots(&[&user]);
        let guard = RootConfinement::new(&policy);

        assert!(matches!(
            guard.check_dir(&evil),
            Err(PolicyViolation::PathOutsideAllowedRoots(_))
        ));
        assert!(guard.check_dir(&user2).is_err());
    }

    #[test]
    fn test_dotdot_escape_resolved_before_compare() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("root");
        fs::create_dir(&root).unwrap();
        let policy = policy_with_roots(&[&root]);

        let sneaky = root.join("..");
        assert!(RootConfinement::new(&policy).check_dir(sneaky).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("root");
        let outside = base.path().join("outside");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let policy = policy_with_roots(&[&root]);
        assert!(RootConfinement::new(&policy).check_dir(root.join("link")).is_err());
    }

    #[test]
    fn test_lenient_allows_new_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let policy = policy_with_roots(&[dir.path()]);
        let target = dir.path().join("new-dir").join("file.txt");

        let checked = RootConfinement::new(&policy).check_path(&target).unwrap();
        assert!(checked.ends_with("new-dir/file.txt"));
    }

    #[test]
    fn test_lenient_rejects_traversal_in_missing_tail() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("..").join("..").join("x");
        assert!(CanonicalPath::new_lenient(target).is_err());
    }

    #[test]
    fn test_unrestricted_passes_missing_paths() {
        let policy = PolicyConfig::unrestricted();
        let result = RootConfinement::new(&policy).check_dir("/definitely/not/here");
        assert_eq!(result.unwrap(), PathBuf::from("/definitely/not/here"));
    }
}
