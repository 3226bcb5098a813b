//! Filesystem capability behind `listFiles`, `readFile` and `writeFile`
//!
//! The VM never touches the filesystem directly; it calls a [`FileSystem`]
//! and maps any failure to a `null` result.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Filesystem operations available to programs
pub trait FileSystem: std::fmt::Debug {
    /// Names of the entries in `dir`, sorted
    fn list_files(&self, dir: &str) -> io::Result<Vec<String>>;

    fn read_file(&self, path: &str) -> io::Result<String>;

    fn write_file(&self, path: &str, contents: &str) -> io::Result<()>;
}

/// Filesystem rooted at a directory
///
/// Paths are resolved relative to the root; absolute paths and `..`
/// components that would leave the root are rejected.
#[derive(Debug, Clone)]
pub struct SandboxedFs {
    root: PathBuf,
}

impl SandboxedFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let mut resolved = PathBuf::new();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(escape_error(path));
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape_error(path)),
            }
        }
        Ok(self.root.join(resolved))
    }
}

fn escape_error(path: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("path '{}' is outside the sandbox root", path),
    )
}

impl FileSystem for SandboxedFs {
    fn list_files(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(dir)?)? {
            if let Some(name) = entry?.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path)?)
    }

    fn write_file(&self, path: &str, contents: &str) -> io::Result<()> {
        fs::write(self.resolve(path)?, contents)
    }
}

impl<F: FileSystem + ?Sized> FileSystem for Arc<F> {
    fn list_files(&self, dir: &str) -> io::Result<Vec<String>> {
        (**self).list_files(dir)
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        (**self).read_file(path)
    }

    fn write_file(&self, path: &str, contents: &str) -> io::Result<()> {
        (**self).write_file(path, contents)
    }
}

/// Filesystem that refuses every operation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFs;

fn disabled() -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, "filesystem access is disabled")
}

impl FileSystem for NoFs {
    fn list_files(&self, _dir: &str) -> io::Result<Vec<String>> {
        Err(disabled())
    }

    fn read_file(&self, _path: &str) -> io::Result<String> {
        Err(disabled())
    }

    fn write_file(&self, _path: &str, _contents: &str) -> io::Result<()> {
        Err(disabled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sandbox_read_write_list() {
        let dir = TempDir::new().unwrap();
        let fs = SandboxedFs::new(dir.path());
        fs.write_file("b.txt", "two").unwrap();
        fs.write_file("./a.txt", "one").unwrap();

        assert_eq!(fs.read_file("a.txt").unwrap(), "one");
        assert_eq!(fs.list_files(".").unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_sandbox_rejects_escapes() {
        let dir = TempDir::new().unwrap();
        let fs = SandboxedFs::new(dir.path());
        assert_eq!(
            fs.read_file("../etc/passwd").unwrap_err().kind(),
            io::ErrorKind::PermissionDenied
        );
        assert!(fs.read_file("/etc/passwd").is_err());
        assert!(fs.write_file("sub/../../x", "no").is_err());
    }

    #[test]
    fn test_no_fs_fails_everything() {
        assert!(NoFs.list_files(".").is_err());
        assert!(NoFs.read_file("a").is_err());
        assert!(NoFs.write_file("a", "b").is_err());
    }
}
