//! Storage Contract Integration Tests
//!
//! Every test runs against both the memory and the SQLite engine and
//! expects identical results.

use std::sync::{Arc, Mutex};

use metags::core::identify_bytes;
use metags::domain::{ContentId, Item};
use metags::storage::{MemoryStorage, Query, RelationalStorage, StorageEngine, StorageError};
use metags::{channels, EventBus};
use tempfile::TempDir;

fn engine(kind: &str, bus: &Arc<EventBus>) -> Box<dyn StorageEngine> {
    match kind {
        "memory" => Box::new(MemoryStorage::new(Arc::clone(bus))),
        _ => Box::new(RelationalStorage::open_in_memory(Arc::clone(bus)).unwrap()),
    }
}

fn engines(bus: &Arc<EventBus>) -> Vec<(&'static str, Box<dyn StorageEngine>)> {
    ["memory", "sqlite"]
        .into_iter()
        .map(|kind| (kind, engine(kind, bus)))
        .collect()
}

fn cid(content: &str) -> ContentId {
    identify_bytes(content.as_bytes())
}

fn urls(items: &[Item]) -> Vec<&str> {
    items.iter().map(|i| i.url.as_str()).collect()
}

#[test]
fn test_add_fills_content_id_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.bin");
    std::fs::write(&path, b"\x00\x01binary\xff").unwrap();
    let url = path.to_string_lossy().to_string();

    for (name, storage) in engines(&EventBus::shared()) {
        let stored = storage.add(Item::new(url.clone())).unwrap();
        assert_eq!(
            stored.content_id,
            Some(identify_bytes(b"\x00\x01binary\xff")),
            "{}",
            name
        );

        let all = storage.all().unwrap();
        assert_eq!(all.len(), 1, "{}", name);
        assert_eq!(all[0].content_id, stored.content_id, "{}", name);
    }
}

#[test]
fn test_identical_content_at_different_locations_shares_id() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a.txt");
    let b = temp.path().join("nested-b.txt");
    std::fs::write(&a, "same bytes").unwrap();
    std::fs::write(&b, "same bytes").unwrap();

    for (name, storage) in engines(&EventBus::shared()) {
        let a = storage.add(Item::new(a.to_string_lossy())).unwrap();
        let b = storage.add(Item::new(b.to_string_lossy())).unwrap();

        assert_eq!(a.content_id, b.content_id, "{}", name);
        // Different urls are different records
        assert_eq!(storage.all().unwrap().len(), 2, "{}", name);

        let by_id = storage
            .get(&Query::new().content_id(a.content_id.unwrap().to_string()))
            .unwrap();
        assert_eq!(by_id.len(), 2, "{}", name);
    }
}

#[test]
fn test_missing_file_without_id_is_io_error() {
    for (name, storage) in engines(&EventBus::shared()) {
        let err = storage
            .add(Item::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Io(_)), "{}: {:?}", name, err);
        assert!(storage.all().unwrap().is_empty(), "{}", name);
    }
}

#[test]
fn test_idempotent_add_unions_metadata() {
    for (name, storage) in engines(&EventBus::shared()) {
        let id = cid("a");
        storage
            .add(Item::new("/data/a.png").with_content_id(id.clone()).with_tag("color", "red"))
            .unwrap();
        storage
            .add(
                Item::new("/data/a.png")
                    .with_content_id(id.clone())
                    .with_tag("color", "blue")
                    .with_tag("color", "red")
                    .with_tag("size", "large"),
            )
            .unwrap();

        let all = storage.all().unwrap();
        assert_eq!(all.len(), 1, "{}", name);
        assert_eq!(all[0].values("color"), ["red", "blue"], "{}", name);
        assert_eq!(all[0].values("size"), ["large"], "{}", name);
    }
}

#[test]
fn test_repeated_values_stored_once() {
    let mut results = Vec::new();

    for (name, storage) in engines(&EventBus::shared()) {
        let mut item = Item::new("/a").with_content_id(cid("a"));
        item.tag_many("color", ["red", "red"]);
        storage.add(item).unwrap();

        let all = storage.all().unwrap();
        assert_eq!(all[0].values("color"), ["red"], "{}", name);
        results.push(all);
    }

    assert_eq!(results[0], results[1]);
}

#[test]
fn test_url_wildcard_exactness() {
    let mut results = Vec::new();

    for (name, storage) in engines(&EventBus::shared()) {
        for url in [
            "/data/a.png",
            "/data/b.png.bak",
            "/data/c.PNG",
            "/other/deep/d.png",
            "/data/e.jpg",
        ] {
            storage.add(Item::new(url).with_content_id(cid(url))).unwrap();
        }

        let found = storage.get(&Query::new().url("*.png")).unwrap();
        assert_eq!(urls(&found), ["/data/a.png", "/other/deep/d.png"], "{}", name);

        let exact = storage.get(&Query::new().url("/data/e.jpg")).unwrap();
        assert_eq!(urls(&exact), ["/data/e.jpg"], "{}", name);

        // No star, no partial match
        assert!(storage.get(&Query::new().url("/data")).unwrap().is_empty(), "{}", name);

        results.push(found);
    }

    assert_eq!(results[0], results[1]);
}

#[test]
fn test_glob_metacharacters_other_than_star_are_literal() {
    for (name, storage) in engines(&EventBus::shared()) {
        storage
            .add(Item::new("/data/file?.txt").with_content_id(cid("q")))
            .unwrap();
        storage
            .add(Item::new("/data/fileX.txt").with_content_id(cid("x")))
            .unwrap();
        storage
            .add(Item::new("/data/file_%.txt").with_content_id(cid("p")))
            .unwrap();

        let found = storage.get(&Query::new().url("*file?.txt")).unwrap();
        assert_eq!(urls(&found), ["/data/file?.txt"], "{}", name);

        let found = storage.get(&Query::new().url("*_%*")).unwrap();
        assert_eq!(urls(&found), ["/data/file_%.txt"], "{}", name);
    }
}

#[test]
fn test_content_id_wildcard() {
    for (name, storage) in engines(&EventBus::shared()) {
        storage.add(Item::new("/a").with_content_id(cid("a"))).unwrap();
        storage.add(Item::new("/b").with_content_id(cid("b"))).unwrap();

        assert_eq!(storage.get(&Query::new().content_id("c4*")).unwrap().len(), 2, "{}", name);
        assert!(storage.get(&Query::new().content_id("c5*")).unwrap().is_empty(), "{}", name);

        let prefix = format!("{}*", &cid("a").as_str()[..20]);
        let found = storage.get(&Query::new().content_id(prefix)).unwrap();
        assert_eq!(urls(&found), ["/a"], "{}", name);
    }
}

#[test]
fn test_metadata_filters_are_anded() {
    let mut results = Vec::new();

    for (name, storage) in engines(&EventBus::shared()) {
        storage
            .add(
                Item::new("/a")
                    .with_content_id(cid("a"))
                    .with_tag("color", "red")
                    .with_tag("size", "large"),
            )
            .unwrap();
        storage
            .add(Item::new("/b").with_content_id(cid("b")).with_tag("color", "red"))
            .unwrap();

        let found = storage
            .get(&Query::new().meta("color", "red").meta("size", "large"))
            .unwrap();
        assert_eq!(urls(&found), ["/a"], "{}", name);

        let found = storage.get(&Query::new().meta("color", "red")).unwrap();
        assert_eq!(urls(&found), ["/a", "/b"], "{}", name);

        results.push(found);
    }

    assert_eq!(results[0], results[1]);
}

#[test]
fn test_every_value_pattern_must_match() {
    for (name, storage) in engines(&EventBus::shared()) {
        let mut both = Item::new("/both").with_content_id(cid("both"));
        both.tag_many("color", ["red", "blue"]);
        storage.add(both).unwrap();
        storage
            .add(Item::new("/red").with_content_id(cid("red")).with_tag("color", "red"))
            .unwrap();

        let found = storage
            .get(&Query::new().meta_all("color", ["red", "blue"]))
            .unwrap();
        assert_eq!(urls(&found), ["/both"], "{}", name);
    }
}

#[test]
fn test_wildcard_keys_and_values() {
    for (name, storage) in engines(&EventBus::shared()) {
        storage
            .add(Item::new("/a").with_content_id(cid("a")).with_tag("colour", "rust"))
            .unwrap();
        storage
            .add(Item::new("/b").with_content_id(cid("b")).with_tag("color", "blue"))
            .unwrap();
        storage
            .add(Item::new("/c").with_content_id(cid("c")).with_tag("shape", "round"))
            .unwrap();

        let found = storage.get(&Query::new().meta("col*", "r*")).unwrap();
        assert_eq!(urls(&found), ["/a"], "{}", name);

        let found = storage.get(&Query::new().meta("*", "*")).unwrap();
        assert_eq!(urls(&found), ["/a", "/b", "/c"], "{}", name);

        // A value matching under a different key does not count
        let found = storage.get(&Query::new().meta("shape", "rust")).unwrap();
        assert!(found.is_empty(), "{}", name);
    }
}

#[test]
fn test_selector_precedence() {
    for (name, storage) in engines(&EventBus::shared()) {
        storage
            .add(Item::new("/a.png").with_content_id(cid("a")).with_tag("k", "v"))
            .unwrap();
        storage
            .add(Item::new("/b.png").with_content_id(cid("b")).with_tag("k", "v"))
            .unwrap();

        let q = Query::new()
            .content_id(cid("a").to_string())
            .url("/b.png")
            .meta("k", "nothing");
        assert_eq!(urls(&storage.get(&q).unwrap()), ["/a.png"], "{}", name);

        let q = Query::new().url("/b.png").meta("k", "nothing");
        assert_eq!(urls(&storage.get(&q).unwrap()), ["/b.png"], "{}", name);

        // No selector means everything
        assert_eq!(storage.get(&Query::new()).unwrap(), storage.all().unwrap(), "{}", name);
    }
}

#[test]
fn test_update_only_adds() {
    for (name, storage) in engines(&EventBus::shared()) {
        let item = Item::new("/a").with_content_id(cid("a")).with_tag("color", "red");
        storage.add(item.clone()).unwrap();

        // An update carrying fewer tags removes nothing
        let update = Item::new("/a")
            .with_content_id(cid("a"))
            .with_tag("labels", "image");
        storage.update(&update).unwrap();

        let all = storage.all().unwrap();
        assert_eq!(all[0].values("color"), ["red"], "{}", name);
        assert_eq!(all[0].values("labels"), ["image"], "{}", name);

        let missing = Item::new("/zzz").with_content_id(cid("a"));
        assert!(
            matches!(storage.update(&missing), Err(StorageError::NotFound { .. })),
            "{}",
            name
        );
    }
}

#[test]
fn test_add_emits_filled_item() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("photo.bin");
    std::fs::write(&path, b"raw bytes").unwrap();

    for kind in ["memory", "sqlite"] {
        let bus = EventBus::shared();
        let seen: Arc<Mutex<Vec<Item>>> = Arc::default();
        let sink = Arc::clone(&seen);
        bus.on(channels::ITEM_ADDED, move |event| {
            sink.lock().unwrap().push(event.item.clone());
            Ok(())
        })
        .unwrap();

        let storage = engine(kind, &bus);
        let returned = storage
            .add(Item::new(path.to_string_lossy()).with_tag("a", "b"))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "{}", kind);
        assert_eq!(seen[0], returned, "{}", kind);
        assert!(seen[0].content_id.is_some(), "{}", kind);
    }
}

#[test]
fn test_concurrent_adds_of_one_item_store_one_record() {
    let bus = EventBus::shared();
    let storage = RelationalStorage::open_in_memory(Arc::clone(&bus)).unwrap();

    std::thread::scope(|scope| {
        for n in 0..8 {
            let storage = &storage;
            scope.spawn(move || {
                storage
                    .add(
                        Item::new("/shared.png")
                            .with_content_id(cid("shared"))
                            .with_tag("worker", n.to_string()),
                    )
                    .unwrap();
            });
        }
    });

    let all = storage.all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].values("worker").len(), 8);
}

#[test]
fn test_sqlite_file_persists_between_connections() {
    let temp = TempDir::new().unwrap();
    let url = format!("sqlite:///{}", temp.path().join("db").join("tags.db").display());

    {
        let storage = RelationalStorage::connect(&url, EventBus::shared()).unwrap();
        storage
            .add(Item::new("/a.png").with_content_id(cid("a")).with_tag("color", "red"))
            .unwrap();
    }

    let storage = RelationalStorage::connect(&url, EventBus::shared()).unwrap();
    let found = storage.get(&Query::new().meta("color", "red")).unwrap();
    assert_eq!(urls(&found), ["/a.png"]);
    assert_eq!(found[0].content_id, Some(cid("a")));
}
