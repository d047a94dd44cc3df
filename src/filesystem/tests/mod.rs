//! Tests for the filesystem object model

#[cfg(test)]
mod object_tests {
    use crate::error::HostBoxError;
    use crate::filesystem::{
        file_sha256, human_readable_size, list_directory, recursive_size, DescribeOptions,
        FilesystemObject, ObjectType,
    };
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// root/a.txt (5), root/b.bin (3), root/sub/c.txt (7), root/sub/deeper/d.txt (2)
    fn sample_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(&root.join("a.txt"), b"hello");
        write(&root.join("b.bin"), b"abc");
        write(&root.join("sub/c.txt"), b"1234567");
        write(&root.join("sub/deeper/d.txt"), b"xy");
        temp_dir
    }

    #[test]
    fn test_describe_missing_path_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope").join("missing.txt");

        let object = FilesystemObject::describe(&missing, true);
        assert_eq!(object.object_type, ObjectType::Unknown);
        assert_eq!(object.name, "missing.txt");
        assert_eq!(object.size, 0);
        assert!(!object.hash_calculated);
        assert!(object.sha256.is_none());
        assert!(object.last_write.is_none());
    }

    #[test]
    fn test_describe_file_with_hash() {
        let temp_dir = sample_tree();
        let path = temp_dir.path().join("a.txt");

        let object = FilesystemObject::describe(&path, true);
        assert_eq!(object.object_type, ObjectType::File);
        assert_eq!(object.size, 5);
        assert!(object.hash_calculated);
        assert_eq!(
            object.sha256.as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
        assert!(object.last_write.is_some());

        let without_hash = FilesystemObject::describe(&path, false);
        assert!(!without_hash.hash_calculated);
        assert!(without_hash.sha256.is_none());
    }

    #[test]
    fn test_describe_directory_size_is_optional() {
        let temp_dir = sample_tree();

        let sized = FilesystemObject::describe(temp_dir.path(), false);
        assert_eq!(sized.object_type, ObjectType::Directory);
        assert_eq!(sized.size, 17);

        let unsized_dir = FilesystemObject::describe_with(
            temp_dir.path(),
            DescribeOptions {
                compute_hash: false,
                dir_size: false,
            },
        );
        assert_eq!(unsized_dir.object_type, ObjectType::Directory);
        assert_eq!(unsized_dir.size, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_recursive_size_skips_unreadable_entries() {
        let temp_dir = sample_tree();
        std::os::unix::fs::symlink(
            temp_dir.path().join("does-not-exist"),
            temp_dir.path().join("sub/dangling"),
        )
        .unwrap();

        assert_eq!(recursive_size(temp_dir.path()), 17);
        assert_eq!(recursive_size(temp_dir.path().join("missing")), 0);
    }

    #[test]
    fn test_list_directory_puts_directories_first() {
        let temp_dir = sample_tree();
        write(&temp_dir.path().join("0-early.txt"), b"z");

        let objects = list_directory(temp_dir.path(), DescribeOptions::default()).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "0-early.txt", "a.txt", "b.bin"]);
        assert_eq!(objects[0].object_type, ObjectType::Directory);
        assert_eq!(objects[0].size, 0);
        assert!(objects.iter().all(|o| !o.hash_calculated));
    }

    #[test]
    fn test_list_directory_with_sizes_and_hashes() {
        let temp_dir = sample_tree();
        let options = DescribeOptions {
            compute_hash: true,
            dir_size: true,
        };

        let objects = list_directory(temp_dir.path(), options).unwrap();
        assert_eq!(objects[0].size, 9);
        assert!(objects[1..].iter().all(|o| o.hash_calculated));
    }

    #[test]
    fn test_list_directory_rejects_files_and_missing_paths() {
        let temp_dir = sample_tree();
        for path in [temp_dir.path().join("a.txt"), temp_dir.path().join("missing")] {
            let err = list_directory(&path, DescribeOptions::default()).unwrap_err();
            assert_eq!(err.to_string(), "Object is not exists or not directory");
        }
    }

    #[test]
    fn test_compare_requires_hashes_on_both_sides() {
        let temp_dir = sample_tree();
        let path = temp_dir.path().join("a.txt");
        write(&temp_dir.path().join("a-copy.txt"), b"hello");

        let hashed = FilesystemObject::describe(&path, true);
        let same_path_unhashed = FilesystemObject::describe(&path, false);
        let copy_hashed = FilesystemObject::describe(temp_dir.path().join("a-copy.txt"), true);
        let other = FilesystemObject::describe(temp_dir.path().join("b.bin"), true);
        let dir = FilesystemObject::describe(temp_dir.path(), true);

        assert!(hashed.compare_with(&copy_hashed));
        assert!(!hashed.compare_with(&same_path_unhashed));
        assert!(!same_path_unhashed.compare_with(&same_path_unhashed));
        assert!(!hashed.compare_with(&other));
        assert!(!dir.compare_with(&dir));
    }

    #[test]
    fn test_copy_directory_round_trip_preserves_size() {
        let source = sample_tree();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("copy");
        let cancel = CancellationToken::new();

        let object = FilesystemObject::describe(source.path(), false);
        object.copy_to(&dest, false, &cancel).unwrap();

        let copied = FilesystemObject::describe(&dest, false);
        assert_eq!(copied.object_type, ObjectType::Directory);
        assert_eq!(copied.size, object.size);
        assert_eq!(fs::read(dest.join("sub/deeper/d.txt")).unwrap(), b"xy");
    }

    #[test]
    fn test_copy_without_overwrite_fails_on_existing_file() {
        let temp_dir = sample_tree();
        let cancel = CancellationToken::new();
        let source = FilesystemObject::describe(temp_dir.path().join("a.txt"), false);

        let err = source
            .copy_to(temp_dir.path().join("b.bin"), false, &cancel)
            .unwrap_err();
        assert!(matches!(err, HostBoxError::AlreadyExists(_)));
        assert_eq!(fs::read(temp_dir.path().join("b.bin")).unwrap(), b"abc");

        source
            .copy_to(temp_dir.path().join("b.bin"), true, &cancel)
            .unwrap();
        assert_eq!(fs::read(temp_dir.path().join("b.bin")).unwrap(), b"hello");
    }

    #[test]
    fn test_copy_directory_collision_leaves_partial_tree() {
        let source = sample_tree();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("copy");
        write(&dest.join("sub/c.txt"), b"existing");
        let cancel = CancellationToken::new();

        let object = FilesystemObject::describe(source.path(), false);
        assert!(object.copy_to(&dest, false, &cancel).is_err());

        // Top-level files were copied before the collision in sub/ was hit.
        assert!(dest.join("a.txt").exists());
        assert_eq!(fs::read(dest.join("sub/c.txt")).unwrap(), b"existing");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_directory_does_not_follow_directory_links() {
        let source = sample_tree();
        std::os::unix::fs::symlink(source.path(), source.path().join("sub/loop")).unwrap();
        std::os::unix::fs::symlink(source.path().join("a.txt"), source.path().join("a-link.txt"))
            .unwrap();
        let target = TempDir::new().unwrap();
        let dest = target.path().join("copy");
        let cancel = CancellationToken::new();

        let object = FilesystemObject::describe_with(source.path(), DescribeOptions::default());
        object.copy_to(&dest, false, &cancel).unwrap();

        assert!(!dest.join("sub/loop").exists());
        assert_eq!(fs::read(dest.join("a-link.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.join("sub/deeper/d.txt")).unwrap(), b"xy");
    }

    #[test]
    fn test_copy_unknown_object_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let missing = FilesystemObject::describe(temp_dir.path().join("ghost"), false);

        let err = missing
            .copy_to(temp_dir.path().join("dest"), false, &cancel)
            .unwrap_err();
        assert!(matches!(err, HostBoxError::NotFound(_)));
    }

    #[test]
    fn test_move_updates_snapshot() {
        let temp_dir = sample_tree();
        let dest = temp_dir.path().join("moved.txt");

        let mut object = FilesystemObject::describe(temp_dir.path().join("a.txt"), false);
        object.move_to(&dest).unwrap();

        assert_eq!(object.name, "moved.txt");
        assert!(object.full_path.ends_with("moved.txt"));
        assert_eq!(object.object_type, ObjectType::File);
        assert!(dest.exists());
        assert!(!temp_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_move_directory_refuses_existing_destination() {
        let temp_dir = sample_tree();
        let mut object = FilesystemObject::describe(temp_dir.path().join("sub"), false);

        let err = object.move_to(temp_dir.path().join("a.txt")).unwrap_err();
        assert!(matches!(err, HostBoxError::AlreadyExists(_)));

        object.move_to(temp_dir.path().join("renamed")).unwrap();
        assert_eq!(object.name, "renamed");
        assert!(temp_dir.path().join("renamed/deeper/d.txt").exists());
    }

    #[test]
    fn test_remove_directory_recursively() {
        let temp_dir = sample_tree();
        let cancel = CancellationToken::new();
        let sub = temp_dir.path().join("sub");

        let mut object = FilesystemObject::describe(&sub, false);
        object.remove(&cancel).unwrap();

        assert_eq!(object.object_type, ObjectType::Unknown);
        assert!(!sub.exists());
        assert!(temp_dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_remove_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let mut object = FilesystemObject::describe(temp_dir.path().join("ghost"), false);

        let err = object.remove(&cancel).unwrap_err();
        assert!(matches!(err, HostBoxError::NotFound(_)));
    }

    #[test]
    fn test_cancelled_remove_stops_early() {
        let temp_dir = sample_tree();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut object = FilesystemObject::describe(temp_dir.path(), false);
        let err = object.remove(&cancel).unwrap_err();
        assert!(matches!(err, HostBoxError::Cancelled));
        assert!(temp_dir.path().exists());
        assert_eq!(object.object_type, ObjectType::Directory);
    }

    #[test]
    fn test_serialized_shape() {
        let temp_dir = sample_tree();
        let object = FilesystemObject::describe(temp_dir.path().join("a.txt"), false);

        let value = serde_json::to_value(&object).unwrap();
        assert_eq!(value["name"], "a.txt");
        assert_eq!(value["objectType"], "File");
        assert_eq!(value["size"], 5);
        assert_eq!(value["humanReadableSize"], "5 B");
        assert_eq!(value["hashCalculated"], false);
        assert!(value.get("sha256").is_none());
        assert!(value["fullPath"].as_str().unwrap().ends_with("a.txt"));
    }

    #[test]
    fn test_file_sha256_of_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty");
        write(&path, b"");

        assert_eq!(
            file_sha256(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0 B");
        assert_eq!(human_readable_size(512), "512 B");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(human_readable_size(3 * 1024 * 1024 * 1024 + 512 * 1024 * 1024), "3.5 GB");
    }
}
