use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};
use walkdir::WalkDir;

const FALLBACK_FILE_NAME: &str = "file";

/// A concrete file on disk selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileRef {
    pub path: PathBuf,
    pub display_name: String,
    pub size_bytes: u64,
}

impl LocalFileRef {
    /// Reads name and size metadata for a regular file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            display_name: display_name_for(path),
            size_bytes: metadata.len(),
        })
    }
}

fn display_name_for(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// A temporary copy of some content handle. The copy is removed when this is dropped.
#[derive(Debug)]
pub struct MaterializedFile {
    file: LocalFileRef,
    _temp_path: TempPath,
}

impl MaterializedFile {
    pub fn file(&self) -> &LocalFileRef {
        &self.file
    }
}

/// Copies everything readable from `source` into a fresh temporary file.
pub fn materialize<R: Read>(source: &mut R, display_name: &str) -> io::Result<MaterializedFile> {
    let temp_file = NamedTempFile::new()?;
    copy_into(source, temp_file, display_name)
}

/// Same as [`materialize`] but places the copy inside `dir`.
pub fn materialize_in<R: Read>(
    source: &mut R,
    display_name: &str,
    dir: &Path,
) -> io::Result<MaterializedFile> {
    let temp_file = NamedTempFile::new_in(dir)?;
    copy_into(source, temp_file, display_name)
}

fn copy_into<R: Read>(
    source: &mut R,
    mut temp_file: NamedTempFile,
    display_name: &str,
) -> io::Result<MaterializedFile> {
    let size_bytes = io::copy(source, &mut temp_file)?;
    temp_file.flush()?;
    let temp_path = temp_file.into_temp_path();

    debug!(path = %temp_path.display(), size_bytes, "materialized content to temporary file");

    let display_name = if display_name.trim().is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        display_name.to_string()
    };

    Ok(MaterializedFile {
        file: LocalFileRef {
            path: temp_path.to_path_buf(),
            display_name,
            size_bytes,
        },
        _temp_path: temp_path,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of turning user-supplied paths into uploadable files.
#[derive(Debug, Default)]
pub struct Selection {
    pub files: Vec<LocalFileRef>,
    pub skipped: Vec<SkippedPath>,
}

/// Path argument standing for standard input.
pub const STDIN_PATH: &str = "-";

/// Resolves `paths` in order. Paths that cannot be read are skipped and reported
/// instead of failing the whole selection. Directories are expanded in name order
/// when `recursive` is set.
pub fn collect_local_files(paths: &[PathBuf], recursive: bool) -> Selection {
    let mut selection = Selection::default();
    for path in paths {
        selection.push_any(path, recursive);
    }
    selection
}

/// Same as [`collect_local_files`], except that a [`STDIN_PATH`] entry is
/// replaced, in place, by a temporary copy of `stdin` named `stdin_name`.
/// The returned copy must be kept alive until the upload is done.
pub fn collect_with_stdin<R: Read>(
    paths: &[PathBuf],
    recursive: bool,
    stdin: &mut R,
    stdin_name: &str,
) -> io::Result<(Selection, Option<MaterializedFile>)> {
    if paths.iter().filter(|path| is_stdin(path)).count() > 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "standard input (-) can only be given once",
        ));
    }

    let mut selection = Selection::default();
    let mut stdin_copy = None;

    for path in paths {
        if is_stdin(path) {
            let copy = materialize(stdin, stdin_name)?;
            selection.files.push(copy.file().clone());
            stdin_copy = Some(copy);
        } else {
            selection.push_any(path, recursive);
        }
    }

    Ok((selection, stdin_copy))
}

fn is_stdin(path: &Path) -> bool {
    path.as_os_str() == STDIN_PATH
}

impl Selection {
    fn push_any(&mut self, path: &Path, recursive: bool) {
        if !path.is_dir() {
            self.push_path(path);
            return;
        }

        if !recursive {
            self.skip(path, "is a directory (pass --recursive to include its files)");
            return;
        }

        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => self.push_path(entry.path()),
                Ok(_) => {}
                Err(e) => {
                    let failed = e.path().unwrap_or(path).to_path_buf();
                    self.skip(&failed, &e.to_string());
                }
            }
        }
    }

    fn push_path(&mut self, path: &Path) {
        match LocalFileRef::from_path(path) {
            Ok(file) => self.files.push(file),
            Err(e) => self.skip(path, &e.to_string()),
        }
    }

    fn skip(&mut self, path: &Path, reason: &str) {
        warn!(path = %path.display(), reason, "skipping file");
        self.skipped.push(SkippedPath {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        });
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|file| file.size_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_path_reads_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        fs::write(&path, b"twelve bytes").unwrap();

        let file = LocalFileRef::from_path(&path).unwrap();
        assert_eq!(file.display_name, "photo.jpg");
        assert_eq!(file.size_bytes, 12);
        assert_eq!(file.path, path);
    }

    #[test]
    fn test_from_path_rejects_directories() {
        let dir = tempdir().unwrap();
        let err = LocalFileRef::from_path(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_materialize_copies_content_and_cleans_up() {
        let dir = tempdir().unwrap();
        let mut source = io::Cursor::new(b"test content".to_vec());

        let materialized = materialize_in(&mut source, "notes.txt", dir.path()).unwrap();
        let path = materialized.file().path.clone();
        assert_eq!(fs::read_to_string(&path).unwrap(), "test content");
        assert_eq!(materialized.file().size_bytes, 12);
        assert_eq!(materialized.file().display_name, "notes.txt");

        drop(materialized);
        assert!(!path.exists());
    }

    #[test]
    fn test_materialize_empty_source_and_blank_name() {
        let mut source = io::empty();
        let materialized = materialize(&mut source, "  ").unwrap();
        assert_eq!(materialized.file().size_bytes, 0);
        assert_eq!(materialized.file().display_name, FALLBACK_FILE_NAME);
    }

    #[test]
    fn test_collect_skips_missing_and_keeps_order() {
        let dir = tempdir().unwrap();
        let b = dir.path().join("b.txt");
        let a = dir.path().join("a.txt");
        fs::write(&b, b"b").unwrap();
        fs::write(&a, b"aa").unwrap();
        let missing = dir.path().join("missing.txt");

        let selection = collect_local_files(&[b.clone(), missing.clone(), a.clone()], false);
        let names: Vec<_> = selection
            .files
            .iter()
            .map(|f| f.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["b.txt", "a.txt"]);
        assert_eq!(selection.skipped.len(), 1);
        assert_eq!(selection.skipped[0].path, missing);
        assert_eq!(selection.total_bytes(), 3);
    }

    #[test]
    fn test_collect_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(dir.path().join("z.txt"), b"z").unwrap();
        fs::write(nested.join("a.txt"), b"a").unwrap();

        let selection = collect_local_files(&[dir.path().to_path_buf()], false);
        assert!(selection.files.is_empty());
        assert_eq!(selection.skipped.len(), 1);

        let selection = collect_local_files(&[dir.path().to_path_buf()], true);
        let names: Vec<_> = selection
            .files
            .iter()
            .map(|f| f.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.txt", "z.txt"]);
        assert!(selection.skipped.is_empty());
    }

    #[test]
    fn test_stdin_keeps_its_place_in_the_selection() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        fs::write(&a, b"a").unwrap();
        fs::write(&b, b"b").unwrap();

        let mut stdin = io::Cursor::new(b"piped".to_vec());
        let (selection, copy) =
            collect_with_stdin(&[a, PathBuf::from(STDIN_PATH), b], false, &mut stdin, "clip.txt")
                .unwrap();

        let names: Vec<_> = selection
            .files
            .iter()
            .map(|f| f.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a.png", "clip.txt", "b.png"]);

        let copy = copy.unwrap();
        assert_eq!(selection.files[1], *copy.file());
        assert_eq!(fs::read_to_string(&copy.file().path).unwrap(), "piped");
    }

    #[test]
    fn test_stdin_given_twice_is_rejected() {
        let mut stdin = io::Cursor::new(b"piped".to_vec());
        let paths = [PathBuf::from(STDIN_PATH), PathBuf::from(STDIN_PATH)];
        let err = collect_with_stdin(&paths, false, &mut stdin, "clip.txt").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(stdin.position(), 0);
    }

    #[test]
    fn test_without_stdin_matches_plain_collection() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, b"a").unwrap();

        let mut stdin = io::empty();
        let (selection, copy) = collect_with_stdin(&[a], false, &mut stdin, "stdin").unwrap();
        assert!(copy.is_none());
        assert_eq!(selection.files.len(), 1);
    }
}
