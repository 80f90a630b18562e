//! Path segmenter.
//!
//! Splits a URL path into the longest prefix of segments that are existing
//! directories under a root, the first segment past that prefix, and the
//! remaining tail.
//!
//! ```text
//! root/
//! └── blog/            GET /blog/post/list_all
//!     └── server/        dirs = [blog]
//!                        next = Some(post)
//!                        tail = [list_all]
//! ```

use std::path::{Path, PathBuf};

/// Result of segmenting a path against a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segments {
    /// Longest all-directories prefix.
    pub dirs: Vec<String>,
    /// First segment that is not a directory.
    pub next: Option<String>,
    /// Everything after `next`.
    pub tail: Vec<String>,
}

impl Segments {
    /// Directory named by `dirs`, below `root`.
    pub fn dir_path(&self, root: &Path) -> PathBuf {
        self.dirs.iter().fold(root.to_path_buf(), |path, s| path.join(s))
    }

    /// `dirs` joined with `/`.
    pub fn dir_name(&self) -> String {
        self.dirs.join("/")
    }
}

/// Split a URL path into non-empty segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Probe `root` one segment at a time.
///
/// Never fails: anything that cannot be stat'ed counts as "not a directory".
pub async fn segment(root: &Path, segments: &[&str]) -> Segments {
    let mut current = root.to_path_buf();
    let mut depth = 0;

    // Invariant: segments[..depth] are all directories under root.
    while depth < segments.len() {
        let segment = segments[depth];
        if segment == "." || segment == ".." {
            break;
        }

        current.push(segment);
        if !is_dir(&current).await {
            break;
        }
        depth += 1;
    }

    Segments {
        dirs: segments[..depth].iter().map(|s| s.to_string()).collect(),
        next: segments.get(depth).map(|s| s.to_string()),
        tail: segments.iter().skip(depth + 1).map(|s| s.to_string()).collect(),
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blog/server")).unwrap();
        fs::create_dir_all(dir.path().join("react/admin")).unwrap();
        fs::write(dir.path().join("blog/server/post.js"), "").unwrap();
        fs::write(dir.path().join("react/readme.html"), "").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_stops_at_first_file_segment() {
        let root = tree();
        let result = segment(root.path(), &["blog", "post", "list_all"]).await;

        assert_eq!(result.dirs, vec!["blog"]);
        assert_eq!(result.next.as_deref(), Some("post"));
        assert_eq!(result.tail, vec!["list_all"]);
        assert_eq!(result.dir_path(root.path()), root.path().join("blog"));
    }

    #[tokio::test]
    async fn test_nested_directories() {
        let root = tree();
        let result = segment(root.path(), &["react", "admin", "users", "edit", "7"]).await;

        assert_eq!(result.dir_name(), "react/admin");
        assert_eq!(result.next.as_deref(), Some("users"));
        assert_eq!(result.tail, vec!["edit", "7"]);
    }

    #[tokio::test]
    async fn test_all_directories() {
        let root = tree();
        let result = segment(root.path(), &["react", "admin"]).await;

        assert_eq!(result.dirs, vec!["react", "admin"]);
        assert_eq!(result.next, None);
        assert!(result.tail.is_empty());
    }

    #[tokio::test]
    async fn test_regular_file_is_not_a_directory() {
        let root = tree();
        let result = segment(root.path(), &["react", "readme.html", "extra"]).await;

        assert_eq!(result.dirs, vec!["react"]);
        assert_eq!(result.next.as_deref(), Some("readme.html"));
        assert_eq!(result.tail, vec!["extra"]);
    }

    #[tokio::test]
    async fn test_missing_root_and_dot_segments() {
        let result = segment(Path::new("/definitely/not/here"), &["a", "b"]).await;
        assert!(result.dirs.is_empty());
        assert_eq!(result.next.as_deref(), Some("a"));

        let root = tree();
        let result = segment(root.path(), &["blog", "..", "react"]).await;
        assert_eq!(result.dirs, vec!["blog"]);
        assert_eq!(result.next.as_deref(), Some(".."));
    }

    #[test]
    fn test_split_path_drops_empty_segments() {
        assert_eq!(split_path("/blog//post/"), vec!["blog", "post"]);
        assert!(split_path("/").is_empty());
    }
}
