//! Scratch space lifecycle and the process-wide context.

use std::sync::Arc;

use junifer::context::Context;
use junifer::workdir::WorkDirManager;
use junifer::assert_result_ok;
use tempfile::TempDir;

#[test]
fn test_default_workdir_nests_under_platform_temp() {
    let manager = assert_result_ok!(WorkDirManager::new(None));
    let expected = std::env::temp_dir().join("junifer");
    assert_eq!(manager.workdir(), expected);

    let dir = assert_result_ok!(manager.get_tempdir(None, None));
    let root = manager.root_tempdir().expect("root is created with the first tempdir");
    assert_eq!(dir.parent(), Some(root.as_path()));
    assert_eq!(root.parent(), Some(expected.as_path()));

    assert_result_ok!(manager.delete_tempdir(&dir));
    assert!(manager.root_tempdir().is_none());
    assert!(!root.exists());
}

#[test]
fn test_moving_workdir_discards_previous_root() {
    let temp = TempDir::new().unwrap();
    let manager = assert_result_ok!(WorkDirManager::new(Some(temp.path().join("a"))));
    let element = assert_result_ok!(manager.get_element_tempdir(Some("fc")));
    let old_root = manager.root_tempdir().unwrap();

    assert_result_ok!(manager.set_workdir(temp.path().join("b")));
    assert!(!element.exists());
    assert!(!old_root.exists());

    let fresh = assert_result_ok!(manager.get_tempdir(Some("warp"), None));
    assert!(fresh.starts_with(temp.path().join("b")));
}

#[test]
fn test_global_context_is_shared_until_reset() {
    let a = Context::global();
    let b = Context::global();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(Arc::ptr_eq(&WorkDirManager::global(), &a.workdir_manager()));
    assert!(Arc::ptr_eq(&a.parcellations(), &b.parcellations()));

    let scratch = assert_result_ok!(a.workdir_manager().get_tempdir(Some("global"), None));
    let root = a.workdir_manager().root_tempdir().expect("root exists after get_tempdir");
    assert!(scratch.exists());

    assert_result_ok!(Context::reset_global());
    assert!(!root.exists());
    assert!(a.workdir_manager().root_tempdir().is_none());
    let c = Context::global();
    assert!(!Arc::ptr_eq(&a, &c));
}
