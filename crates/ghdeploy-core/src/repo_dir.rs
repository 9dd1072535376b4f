//! Location of the working directory relative to the enclosing git root.
//!
//! The walk lists each directory on the way up and stops at the first one
//! that contains a `.git` directory. Ascent ends with
//! [`DeployError::NotInRepository`] once splitting a directory no longer
//! yields a different parent, which is what happens at the filesystem root.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{DeployError, Result};

pub const GIT_DIR_NAME: &str = ".git";

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub is_dir: bool,
}

impl DirEntryInfo {
    pub fn dir(name: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }

    pub fn file(name: impl Into<OsString>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }
}

/// Directory listing capability used by the ascent.
pub trait Filesystem: Send + Sync {
    fn list_children(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>>;

    /// Split `dir` into its parent and final component.
    ///
    /// At the root this returns the root itself and an empty component.
    fn split_parent(&self, dir: &Path) -> (PathBuf, OsString) {
        match (dir.parent(), dir.file_name()) {
            (Some(parent), Some(name)) => (parent.to_path_buf(), name.to_os_string()),
            _ => (dir.to_path_buf(), OsString::new()),
        }
    }
}

/// The local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn list_children(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
        let mut children = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            // file_type does not follow symlinks
            let is_dir = entry.file_type()?.is_dir();
            children.push(DirEntryInfo {
                name: entry.file_name(),
                is_dir,
            });
        }
        Ok(children)
    }
}

/// Path segments from the repository root down to the start directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoRelativePath {
    segments: Vec<String>,
}

impl RepoRelativePath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

impl fmt::Display for RepoRelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(MAIN_SEPARATOR_STR))
    }
}

impl Serialize for RepoRelativePath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

fn has_git_dir(children: &[DirEntryInfo]) -> bool {
    children
        .iter()
        .any(|child| child.is_dir && child.name == GIT_DIR_NAME)
}

/// Walk up from `start` until a directory containing `.git/` is found.
///
/// A relative `start` is taken against the process working directory. The
/// number of steps is bounded by the depth of `start`.
pub fn resolve_repo_dir(
    fs: &dyn Filesystem,
    cancel: &CancellationToken,
    start: &Path,
) -> Result<RepoRelativePath> {
    let mut current = if start.is_relative() {
        current_dir()?.join(start)
    } else {
        start.to_path_buf()
    };
    let mut reversed: Vec<String> = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let children = fs.list_children(&current).map_err(|source| DeployError::Io {
            path: current.clone(),
            source,
        })?;

        if has_git_dir(&children) {
            reversed.reverse();
            let path = RepoRelativePath::new(reversed);
            debug!(root = %current.display(), repo_dir = %path, "found repository root");
            return Ok(path);
        }

        let (parent, component) = fs.split_parent(&current);
        if parent == current {
            return Err(DeployError::NotInRepository {
                start: start.to_path_buf(),
            });
        }

        trace!(dir = %current.display(), "no .git here, ascending");
        if !component.is_empty() {
            reversed.push(component.to_string_lossy().into_owned());
        }
        current = parent;
    }
}

/// Snapshot of the process working directory.
pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| DeployError::Io {
        path: PathBuf::from("."),
        source,
    })
}

/// Resolve relative to a snapshot of the process working directory.
pub fn resolve_repo_dir_from_cwd(
    fs: &dyn Filesystem,
    cancel: &CancellationToken,
) -> Result<RepoRelativePath> {
    resolve_repo_dir(fs, cancel, &current_dir()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory tree keyed by absolute path.
    struct FakeFs {
        dirs: HashMap<PathBuf, Vec<DirEntryInfo>>,
        listings: AtomicUsize,
    }

    impl FakeFs {
        fn new() -> Self {
            Self {
                dirs: HashMap::new(),
                listings: Default::default(),
            }
        }

        fn with_dir(mut self, path: &str, children: Vec<DirEntryInfo>) -> Self {
            self.dirs.insert(PathBuf::from(path), children);
            self
        }

        fn listings(&self) -> usize {
            self.listings.load(Ordering::SeqCst)
        }
    }

    impl Filesystem for FakeFs {
        fn list_children(&self, dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            self.dirs
                .get(dir)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such dir"))
        }
    }

    fn tree_with_root_at(root: &str) -> FakeFs {
        FakeFs::new()
            .with_dir("/", vec![DirEntryInfo::dir("work")])
            .with_dir("/work", vec![DirEntryInfo::dir("root")])
            .with_dir(
                root,
                vec![DirEntryInfo::dir(".git"), DirEntryInfo::dir("a")],
            )
            .with_dir("/work/root/a", vec![DirEntryInfo::dir("b")])
            .with_dir("/work/root/a/b", vec![DirEntryInfo::dir("c")])
            .with_dir("/work/root/a/b/c", vec![DirEntryInfo::file("main.rs")])
    }

    #[test]
    fn nested_directory_yields_relative_segments() {
        let fs = tree_with_root_at("/work/root");
        let path =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/work/root/a/b/c"))
                .unwrap();
        assert_eq!(path.segments(), ["a", "b", "c"]);
        assert_eq!(path.to_path_buf(), PathBuf::from("a").join("b").join("c"));
    }

    #[test]
    fn root_itself_yields_empty_path() {
        let fs = tree_with_root_at("/work/root");
        let path =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/work/root")).unwrap();
        assert!(path.is_empty());
        assert_eq!(path.to_string(), "");
    }

    #[test]
    fn git_file_is_not_a_root() {
        let fs = FakeFs::new()
            .with_dir("/", vec![])
            .with_dir("/repo", vec![DirEntryInfo::file(".git")]);
        let err =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/repo")).unwrap_err();
        assert!(matches!(err, DeployError::NotInRepository { .. }));
    }

    #[test]
    fn chain_without_root_terminates_within_depth() {
        let fs = FakeFs::new()
            .with_dir("/", vec![])
            .with_dir("/x", vec![])
            .with_dir("/x/y", vec![])
            .with_dir("/x/y/z", vec![]);
        let err =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/x/y/z")).unwrap_err();
        match err {
            DeployError::NotInRepository { start } => assert_eq!(start, PathBuf::from("/x/y/z")),
            other => panic!("unexpected error: {other:?}"),
        }
        // "/x/y/z", "/x/y", "/x", "/"
        assert_eq!(fs.listings(), 4);
    }

    #[test]
    fn listing_failure_is_io_error() {
        let fs = FakeFs::new().with_dir("/x/y", vec![]);
        let err =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/x/y")).unwrap_err();
        match err {
            DeployError::Io { path, .. } => assert_eq!(path, PathBuf::from("/x")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn cancelled_token_stops_walk() {
        let fs = tree_with_root_at("/work/root");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolve_repo_dir(&fs, &cancel, Path::new("/work/root/a")).unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
        assert_eq!(fs.listings(), 0);
    }

    #[test]
    fn split_that_never_moves_is_detected() {
        struct StuckFs {
            calls: AtomicUsize,
        }

        impl Filesystem for StuckFs {
            fn list_children(&self, _dir: &Path) -> io::Result<Vec<DirEntryInfo>> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }

            fn split_parent(&self, dir: &Path) -> (PathBuf, OsString) {
                (dir.to_path_buf(), OsString::new())
            }
        }

        let fs = StuckFs {
            calls: AtomicUsize::new(0),
        };
        let err =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("/anywhere")).unwrap_err();
        assert!(matches!(err, DeployError::NotInRepository { .. }));
        assert_eq!(fs.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn relative_start_is_anchored_at_cwd() {
        let cwd = current_dir().unwrap();
        let fs = FakeFs {
            dirs: HashMap::from([
                (
                    cwd.clone(),
                    vec![DirEntryInfo::dir(".git"), DirEntryInfo::dir("a")],
                ),
                (cwd.join("a"), vec![DirEntryInfo::dir("b")]),
                (cwd.join("a").join("b"), vec![]),
            ]),
            listings: Default::default(),
        };

        let path =
            resolve_repo_dir(&fs, &CancellationToken::new(), Path::new("a/b")).unwrap();

        assert_eq!(path.segments(), ["a", "b"]);
        assert_eq!(fs.listings(), 3);
    }

    #[test]
    fn cwd_walk_matches_explicit_walk() {
        let cancel = CancellationToken::new();
        let from_cwd = resolve_repo_dir_from_cwd(&LocalFs, &cancel);
        let explicit = resolve_repo_dir(&LocalFs, &cancel, &current_dir().unwrap());
        match (from_cwd, explicit) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (
                Err(DeployError::NotInRepository { .. }),
                Err(DeployError::NotInRepository { .. }),
            ) => {}
            other => panic!("walks disagree: {other:?}"),
        }
    }

    #[test]
    fn display_uses_platform_separator() {
        let path = RepoRelativePath::new(vec!["services".into(), "api".into()]);
        assert_eq!(path.to_string(), format!("services{MAIN_SEPARATOR_STR}api"));
        assert_eq!(
            serde_json::to_string(&path).unwrap(),
            serde_json::to_string(&path.to_string()).unwrap()
        );
    }
}
