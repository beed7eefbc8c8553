//! File Factory Integration Tests
//!
//! Tests for directory traversal, path filtering and adding generated
//! items to storage.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use metags::core::{identify_bytes, Identifier};
use metags::ingest::{FactoryError, FileFactory, WalkOptions, TAG_SIZE};
use metags::plugins::{self, image_labels};
use metags::storage::{MemoryStorage, Query, RelationalStorage, StorageEngine};
use metags::EventBus;
use tempfile::TempDir;

fn tree() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("photos/2024")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("readme.txt"), b"readme").unwrap();
    fs::write(root.join("photos/cat.png"), b"cat").unwrap();
    fs::write(root.join("photos/2024/dog.png"), b"dog").unwrap();
    fs::write(root.join("photos/2024/notes.txt"), b"notes").unwrap();
    temp
}

fn names(items: &[metags::Item]) -> Vec<String> {
    items
        .iter()
        .map(|i| {
            Path::new(&i.url)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .to_string()
        })
        .collect()
}

#[test]
fn test_generate_walks_recursively() {
    let temp = tree();
    let storage = MemoryStorage::new(EventBus::shared());
    let factory = FileFactory::new(&storage, Arc::new(Identifier::new()));

    let items = factory.generate(temp.path(), &WalkOptions::default()).unwrap();

    assert_eq!(names(&items), ["dog.png", "notes.txt", "cat.png", "readme.txt"]);
    assert!(items.iter().all(|i| Path::new(&i.url).is_absolute()));
    // Generating does not store
    assert!(storage.is_empty());
}

#[test]
fn test_pattern_filters_full_paths() {
    let temp = tree();
    let storage = MemoryStorage::new(EventBus::shared());
    let factory = FileFactory::new(&storage, Arc::new(Identifier::new()));

    let options = WalkOptions::default().with_pattern("*.png").unwrap();
    let items = factory.generate(temp.path(), &options).unwrap();
    assert_eq!(names(&items), ["dog.png", "cat.png"]);

    let options = WalkOptions::default().with_pattern("*/2024/*").unwrap();
    let items = factory.generate(temp.path(), &options).unwrap();
    assert_eq!(names(&items), ["dog.png", "notes.txt"]);
}

#[test]
fn test_directory_without_recursion_is_rejected() {
    let temp = tree();
    let storage = MemoryStorage::new(EventBus::shared());
    let factory = FileFactory::new(&storage, Arc::new(Identifier::new()));

    let options = WalkOptions::default().recursive(false);
    let err = factory.generate(temp.path(), &options).unwrap_err();
    assert!(matches!(err, FactoryError::DirectoryNotExpanded(_)));

    // A single file is fine either way
    let items = factory
        .generate(&temp.path().join("readme.txt"), &options)
        .unwrap();
    assert_eq!(names(&items), ["readme.txt"]);
}

#[test]
fn test_missing_path_is_io_error() {
    let temp = TempDir::new().unwrap();
    let storage = MemoryStorage::new(EventBus::shared());
    let factory = FileFactory::new(&storage, Arc::new(Identifier::new()));

    let err = factory
        .generate(&temp.path().join("nope"), &WalkOptions::default())
        .unwrap_err();
    assert!(matches!(err, FactoryError::Io(_)));
}

#[test]
fn test_add_stores_items_and_runs_plugins() {
    let temp = tree();
    let bus = EventBus::shared();
    plugins::register_defaults(&bus).unwrap();

    let identifier = Arc::new(Identifier::new());
    let storage = RelationalStorage::open_in_memory(Arc::clone(&bus))
        .unwrap()
        .with_identifier(Arc::clone(&identifier));
    let factory = FileFactory::new(&storage, Arc::clone(&identifier));

    let stored = factory.add(temp.path(), &WalkOptions::default()).unwrap();
    assert_eq!(stored.len(), 4);
    // Ids were computed once by the factory and cached
    assert_eq!(identifier.cache().len(), 4);

    let images = storage
        .get(&Query::new().meta(image_labels::LABELS, image_labels::IMAGE))
        .unwrap();
    assert_eq!(names(&images), ["dog.png", "cat.png"]);

    let cat = storage
        .get(&Query::new().content_id(identify_bytes(b"cat").to_string()))
        .unwrap();
    assert_eq!(cat.len(), 1);
    assert_eq!(cat[0].values(TAG_SIZE), ["3"]);
}

#[test]
fn test_re_adding_a_tree_is_idempotent() {
    let temp = tree();
    let storage = MemoryStorage::new(EventBus::shared());
    let factory = FileFactory::new(&storage, Arc::new(Identifier::new()));

    factory.add(temp.path(), &WalkOptions::default()).unwrap();
    factory.add(temp.path(), &WalkOptions::default()).unwrap();

    let all = storage.all().unwrap();
    assert_eq!(all.len(), 4);
    assert!(all.iter().all(|i| i.values(TAG_SIZE).len() == 1));
}
