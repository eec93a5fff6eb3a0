//! Finding the workbooks in a folder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions (compared ASCII case-insensitively) of workbooks we convert.
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

/// Prefix of the owner files Office writes next to a workbook that is open.
const LOCK_FILE_PREFIX: &str = "~$";

/// List the workbooks directly inside `folder`, sorted by file name.
///
/// Subfolders are not searched.
pub fn find_workbooks(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(Error::FolderNotFound(folder.to_path_buf()));
    }

    let read_err = |source| Error::ReadDir {
        path: folder.to_path_buf(),
        source,
    };

    let mut workbooks = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if is_workbook_name(&path) && path.is_file() {
            workbooks.push(path);
        }
    }

    workbooks.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(workbooks)
}

/// Whether a file name looks like a workbook we convert.
pub fn is_workbook_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with(LOCK_FILE_PREFIX) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// The PDF written for a workbook: same folder, same base name.
pub fn pdf_path_for(workbook: &Path) -> PathBuf {
    workbook.with_extension("pdf")
}

/// PDF paths that more than one of `workbooks` would write, e.g. for
/// `a.xlsx` and `a.xlsm`. The later workbook overwrites the earlier PDF.
pub fn shared_pdf_paths(workbooks: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut shared = Vec::new();
    for pdf in workbooks.iter().map(|w| pdf_path_for(w)) {
        if !seen.insert(pdf.clone()) && !shared.contains(&pdf) {
            shared.push(pdf);
        }
    }
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn names(paths: &[PathBuf]) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_finds_only_workbooks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "march.xlsx",
            "January.XLSX",
            "macros.xlsm",
            "notes.txt",
            "legacy.xls",
            "~$march.xlsx",
            "february.xlsx.bak",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("archive.xlsx")).unwrap();

        let found = find_workbooks(dir.path()).unwrap();
        assert_eq!(names(&found), vec!["January.XLSX", "macros.xlsm", "march.xlsx"]);
        assert!(found.iter().all(|p| p.parent() == Some(dir.path())));
    }

    #[test]
    fn test_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_workbooks(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        match find_workbooks(&missing) {
            Err(Error::FolderNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected FolderNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_file_is_not_a_folder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("book.xlsx");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            find_workbooks(&file),
            Err(Error::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_pdf_path_keeps_base_name() {
        assert_eq!(
            pdf_path_for(Path::new("/data/q1.report.xlsm")),
            PathBuf::from("/data/q1.report.pdf")
        );
        assert_eq!(pdf_path_for(Path::new("book.xlsx")), PathBuf::from("book.pdf"));
    }

    #[test]
    fn test_shared_pdf_paths() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.xlsx", "a.xlsm", "b.xlsx"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = find_workbooks(dir.path()).unwrap();
        let shared = shared_pdf_paths(&found);
        assert_eq!(shared, vec![dir.path().join("a.pdf")]);

        let distinct = [PathBuf::from("x.xlsx"), PathBuf::from("y.xlsm")];
        assert!(shared_pdf_paths(&distinct).is_empty());
    }
}
