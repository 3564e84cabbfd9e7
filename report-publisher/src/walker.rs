use object_store::path::{Path as ObjectPath, PathPart};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::errors::Error;

/// A local file found under the publish root
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub absolute_path: PathBuf,
    /// Relative to the publish root
    pub relative_path: PathBuf,
}

impl FileEntry {
    /// Remote key for this file: the relative path joined onto `prefix`
    pub fn remote_key(&self, prefix: &ObjectPath) -> Result<ObjectPath, Error> {
        let mut key = prefix.clone();
        for component in self.relative_path.components() {
            let part = component.as_os_str().to_str().ok_or_else(|| {
                Error::InvalidKey(format!(
                    "File path is not valid UTF-8: {}",
                    self.relative_path.display()
                ))
            })?;
            let part = PathPart::parse(part).map_err(|e| Error::InvalidKey(e.to_string()))?;
            key = key.child(part);
        }
        Ok(key)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Recursive,
    /// Only the files directly inside the root
    Immediate,
}

/// List regular files under `root`. Directories, symlinks and other special entries are skipped.
pub fn list_files(root: &Path, depth: Depth) -> Result<Vec<FileEntry>, Error> {
    list_files_filtered(root, depth, &[])
}

/// List regular files under `root`, additionally dropping entries matched by any of `exclude`
pub fn list_files_filtered(
    root: &Path,
    depth: Depth,
    exclude: &[&dyn Fn(&DirEntry) -> bool],
) -> Result<Vec<FileEntry>, Error> {
    let mut walker = WalkDir::new(root).min_depth(1).follow_links(false);
    if depth == Depth::Immediate {
        walker = walker.max_depth(1);
    }

    let mut entries = vec![];
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || exclude.iter().any(|skip| skip(&entry)) {
            continue;
        }
        let relative_path = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?
            .to_path_buf();
        tracing::trace!(file = tracing::field::debug(&relative_path), "Found file");
        entries.push(FileEntry {
            absolute_path: entry.path().to_path_buf(),
            relative_path,
        });
    }
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::create_report_tree;

    #[test]
    fn test_recursive_lists_files_only() {
        let dir = create_report_tree(&[
            ("a.html", b"<html></html>".as_slice()),
            ("sub/b.json", b"{}".as_slice()),
            ("sub/deeper/c.csv", b"1,2".as_slice()),
        ])
        .unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let files = list_files(dir.path(), Depth::Recursive).unwrap();
        let relative: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a.html"),
                PathBuf::from("sub/b.json"),
                PathBuf::from("sub/deeper/c.csv"),
            ]
        );
        assert!(files.iter().all(|f| f.absolute_path.is_file()));
    }

    #[test]
    fn test_immediate_skips_directories() {
        let dir = create_report_tree(&[
            ("index.html", b"x".as_slice()),
            ("sub/b.json", b"{}".as_slice()),
        ])
        .unwrap();

        let files = list_files(dir.path(), Depth::Immediate).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("index.html"));
    }

    #[test]
    fn test_exclude_predicate() {
        let dir = create_report_tree(&[
            ("report.html", b"x".as_slice()),
            ("trace.log", b"y".as_slice()),
        ])
        .unwrap();
        let skip_logs =
            |entry: &DirEntry| entry.path().extension().is_some_and(|ext| ext == "log");

        let exclude: [&dyn Fn(&DirEntry) -> bool; 1] = [&skip_logs];

        let files = list_files_filtered(dir.path(), Depth::Recursive, &exclude).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, PathBuf::from("report.html"));
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            list_files(&missing, Depth::Recursive),
            Err(Error::Walk(_))
        ));
    }

    #[test]
    fn test_remote_key_joins_prefix() {
        let entry = FileEntry {
            absolute_path: PathBuf::from("/out/sub/b.json"),
            relative_path: PathBuf::from("sub/b.json"),
        };
        let key = entry.remote_key(&ObjectPath::from("run1")).unwrap();
        assert_eq!(key.as_ref(), "run1/sub/b.json");

        let key = entry.remote_key(&ObjectPath::from("")).unwrap();
        assert_eq!(key.as_ref(), "sub/b.json");
    }

    #[test]
    fn test_remote_key_keeps_reserved_characters() {
        let entry = FileEntry {
            absolute_path: PathBuf::from("/out/page%20x/[1].json"),
            relative_path: PathBuf::from("page%20x/[1].json"),
        };
        let prefix = ObjectPath::parse("run~1").unwrap();
        let key = entry.remote_key(&prefix).unwrap();
        assert_eq!(key.as_ref(), "run~1/page%20x/[1].json");

        let entry = FileEntry {
            absolute_path: PathBuf::from("/out/a~b.html"),
            relative_path: PathBuf::from("a~b.html"),
        };
        assert_eq!(entry.remote_key(&prefix).unwrap().as_ref(), "run~1/a~b.html");
    }

    #[test]
    fn test_remote_key_rejects_control_characters() {
        let entry = FileEntry {
            absolute_path: PathBuf::from("/out/bell\u{7}.html"),
            relative_path: PathBuf::from("bell\u{7}.html"),
        };
        assert!(matches!(
            entry.remote_key(&ObjectPath::from("run1")),
            Err(Error::InvalidKey(_))
        ));
    }
}
