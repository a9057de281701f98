use super::*;

#[test]
fn validate_path_accepts_documented_examples() {
    assert!(FileLoader::validate_path("CLAUDE.md").is_ok());
    assert!(FileLoader::validate_path("docs/a.md").is_ok());
    assert!(FileLoader::validate_path(".kokino/x.md").is_ok());
}

#[test]
fn validate_path_rejects_absolute_paths() {
    let err = FileLoader::validate_path("/etc/passwd").unwrap_err();
    assert_eq!(err.code, ErrorCode::Validation);
}

#[test]
fn validate_path_rejects_nul_bytes() {
    let err = FileLoader::validate_path("a\0.txt").unwrap_err();
    assert_eq!(err.code, ErrorCode::Validation);
}

#[test]
fn validate_path_rejects_parent_dir_regardless_of_position() {
    assert!(FileLoader::validate_path("../escape.md").is_err());
    assert!(FileLoader::validate_path("docs/../../escape.md").is_err());
    assert!(FileLoader::validate_path("docs/..").is_err());
}

#[test]
fn load_file_reads_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("CLAUDE.md"), "hello context").unwrap();
    let loader = FileLoader::new(dir.path());
    let file = loader.load_file("CLAUDE.md").unwrap();
    assert!(file.loaded);
    assert_eq!(file.content, "hello context");
    assert_eq!(file.size, "hello context".len());
}

#[test]
fn load_file_reports_not_found_without_erroring() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::new(dir.path());
    let file = loader.load_file("missing.md").unwrap();
    assert!(!file.loaded);
    assert_eq!(file.error.as_deref(), Some("File not found"));
}

#[test]
fn load_file_reraises_validation_failures() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileLoader::new(dir.path());
    let err = loader.load_file("../escape.md").unwrap_err();
    assert_eq!(err.code, ErrorCode::Validation);
}

#[test]
fn load_auto_files_discards_not_loaded_entries() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("CLAUDE.md"), "root context").unwrap();
    let loader = FileLoader::new(dir.path());
    let loaded =
        loader.load_auto_files(&["CLAUDE.md".to_owned(), "missing.md".to_owned()]).unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].path, "CLAUDE.md");
}
