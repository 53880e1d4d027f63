//! Persistence tests
//!
//! A file-backed disk is formatted, populated, shut down and mounted again;
//! failing writes must surface as storage errors.

use filesys_storage::{FailingBlockDevice, FailurePolicy};
use hal::{FileDisk, RamDisk};
use services_filesys::{FileSystem, FilesysConfig, NamespaceError, NamespaceOperations};

#[test]
fn test_namespace_survives_shutdown_and_mount() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("fs.img");

    let free_before_shutdown = {
        let fs = FileSystem::init(Box::new(FileDisk::create(&image, 128).unwrap()), true).unwrap();
        let ctx = fs.new_context();
        fs.make_directory(&ctx, "/docs").unwrap();
        fs.make_directory(&ctx, "/docs/old").unwrap();
        fs.create(&ctx, "/docs/readme", 32).unwrap();

        let mut file = fs.open(&ctx, "/docs/readme").unwrap();
        file.write(b"persisted across mounts").unwrap();
        drop(file);

        let free = fs.volume().free_sector_count();
        drop(ctx);
        fs.shutdown().unwrap();
        free
    };

    let fs = FileSystem::init(Box::new(FileDisk::open(&image).unwrap()), false).unwrap();
    let mut ctx = fs.new_context();
    assert_eq!(fs.volume().free_sector_count(), free_before_shutdown);

    let mut file = fs.open(&ctx, "/docs/readme").unwrap();
    assert_eq!(file.length(), 32);
    let mut buf = [0u8; 23];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"persisted across mounts");
    drop(file);

    fs.change_directory(&mut ctx, "/docs/old").unwrap();
    fs.change_directory(&mut ctx, "..").unwrap();
    assert!(matches!(
        fs.create(&ctx, "readme", 1),
        Err(NamespaceError::AlreadyExists(_))
    ));
}

#[test]
fn test_remount_with_config_keeps_contents() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("fs.img");

    {
        let config = FilesysConfig::from_json(r#"{"format": true, "buffer_cache_slots": 4}"#).unwrap();
        let fs = FileSystem::init_with_config(Box::new(FileDisk::create(&image, 64).unwrap()), config)
            .unwrap();
        let ctx = fs.new_context();
        for name in ["a", "b", "c", "d", "e"] {
            fs.make_directory(&ctx, &format!("/{}", name)).unwrap();
        }
        fs.remove(&ctx, "/c").unwrap();
        fs.shutdown().unwrap();
    }

    let fs = FileSystem::init(Box::new(FileDisk::open(&image).unwrap()), false).unwrap();
    let ctx = fs.new_context();
    for name in ["a", "b", "d", "e"] {
        assert!(fs.open(&ctx, &format!("/{}", name)).unwrap().is_directory());
    }
    assert!(matches!(fs.open(&ctx, "/c"), Err(NamespaceError::NotFound(_))));
}

#[test]
fn test_write_failures_surface_as_storage_errors() {
    let device = FailingBlockDevice::new(RamDisk::new(64), FailurePolicy::Never);
    let control = device.control();
    let config = FilesysConfig {
        format: true,
        buffer_cache_slots: 1,
        ..FilesysConfig::default()
    };
    let fs = FileSystem::init_with_config(Box::new(device), config).unwrap();
    let ctx = fs.new_context();

    control.set_policy(FailurePolicy::AfterWrites(0));
    // With a single cache slot every new sector evicts a dirty one.
    let result = fs.make_directory(&ctx, "/d");
    assert!(matches!(result, Err(NamespaceError::Storage(_))));
    assert!(matches!(fs.shutdown(), Err(NamespaceError::Storage(_))));

    control.set_policy(FailurePolicy::Never);
    fs.shutdown().unwrap();
}
