use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use s3up::digest::ContentDigest;
use s3up::logger::NoopLogger;
use s3up::store::RemoteStore;
use s3up::sync::SyncCoordinator;
use s3up::walk::{walk_tree, ExcludeRules, WorkItem};

#[derive(Clone)]
struct StoredObject {
    content: Vec<u8>,
    content_type: String,
    digest: Option<String>,
}

/// In-memory stand-in for S3: a key/value map plus a write counter, with an
/// optional set of keys whose writes fail to simulate store errors.
struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    writes: AtomicUsize,
    fail_keys: HashSet<String>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            fail_keys: HashSet::new(),
        }
    }

    fn failing_on(keys: &[&str]) -> Self {
        let mut store = Self::new();
        store.fail_keys = keys.iter().map(|k| k.to_string()).collect();
        store
    }

    /// Seed an object as if written by some other process.
    fn seed(&self, key: &str, content: &[u8], digest: Option<&str>) {
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                content: content.to_vec(),
                content_type: "application/octet-stream".to_string(),
                digest: digest.map(|d| d.to_string()),
            },
        );
    }

    fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().get(key).cloned()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn bucket_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().contains_key(key))
    }

    async fn read_digest(&self, key: &str) -> Result<Option<ContentDigest>> {
        Ok(self
            .objects
            .lock()
            .get(key)
            .and_then(|o| o.digest.as_deref())
            .map(ContentDigest::from_hex))
    }

    async fn write_file(
        &self,
        key: &str,
        local_path: &Path,
        content_type: &str,
        digest: &ContentDigest,
    ) -> Result<()> {
        if self.fail_keys.contains(key) {
            return Err(anyhow!("injected write failure"));
        }
        let content = std::fs::read(local_path)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().insert(
            key.to_string(),
            StoredObject {
                content,
                content_type: content_type.to_string(),
                digest: Some(digest.as_str().to_string()),
            },
        );
        Ok(())
    }
}

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn enumerate(root: &Path, key_prefix: &str) -> Vec<WorkItem> {
    walk_tree(root, key_prefix, &ExcludeRules::default(), &NoopLogger).unwrap()
}

fn coordinator(store: &Arc<MemoryStore>) -> SyncCoordinator {
    let store: Arc<dyn RemoteStore> = store.clone();
    SyncCoordinator::new(store, Arc::new(NoopLogger)).workers(4)
}

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fresh_tree_uploads_everything_then_rerun_is_idempotent() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("site");
    write_file(&root.join("index.html"), b"<html></html>");
    write_file(&root.join("css/site.css"), b"body{}");
    write_file(&root.join("a/b/deep.txt"), b"deep");

    let prefix = root.to_string_lossy().replace('\\', "/");
    let store = Arc::new(MemoryStore::new());

    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.uploaded, 3);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(store.write_count(), 3);

    // Every stored object carries digest metadata equal to its content MD5.
    for key in ["index.html", "css/site.css", "a/b/deep.txt"] {
        let obj = store.get(key).unwrap_or_else(|| panic!("{key} missing"));
        assert_eq!(
            obj.digest.as_deref().unwrap(),
            format!("{:x}", md5::compute(&obj.content))
        );
    }
    assert_eq!(store.get("index.html").unwrap().content_type, "text/html");

    // An immediate re-run uploads nothing.
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.uploaded, 0);
    assert_eq!(stats.skipped, 3);
    assert_eq!(store.write_count(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_scenario_prefix_stripped_and_digest_stored() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("b.txt"), b"hello");

    let prefix = root.to_string_lossy().replace('\\', "/");
    let store = Arc::new(MemoryStore::new());
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;

    assert_eq!(stats.uploaded, 1);
    let obj = store.get("b.txt").expect("b.txt uploaded under stripped key");
    assert_eq!(obj.digest.as_deref(), Some(HELLO_MD5));
    assert_eq!(obj.content, b"hello");
    assert_eq!(obj.content_type, "text/plain");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matching_digest_skips_with_zero_writes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("b.txt"), b"hello");

    let store = Arc::new(MemoryStore::new());
    store.seed("b.txt", b"hello", Some(HELLO_MD5));

    let prefix = root.to_string_lossy().replace('\\', "/");
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.uploaded, 0);
    assert_eq!(store.write_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn differing_digest_overwrites_content_and_metadata() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("b.txt"), b"hello");

    let store = Arc::new(MemoryStore::new());
    let stale_md5 = format!("{:x}", md5::compute(b"stale"));
    store.seed("b.txt", b"stale", Some(&stale_md5));

    let prefix = root.to_string_lossy().replace('\\', "/");
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.uploaded, 1);

    let obj = store.get("b.txt").unwrap();
    assert_eq!(obj.content, b"hello");
    assert_eq!(obj.digest.as_deref(), Some(HELLO_MD5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn object_without_digest_metadata_is_repaired() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("b.txt"), b"hello");

    // Identical content, but the object predates digest metadata.
    let store = Arc::new(MemoryStore::new());
    store.seed("b.txt", b"hello", None);

    let prefix = root.to_string_lossy().replace('\\', "/");
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.uploaded, 1);
    assert_eq!(store.get("b.txt").unwrap().digest.as_deref(), Some(HELLO_MD5));

    // Second run sees the repaired metadata and skips.
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;
    assert_eq!(stats.skipped, 1);
    assert_eq!(store.write_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_item_gets_exactly_one_outcome_despite_failures() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("tree");
    for i in 0..40 {
        write_file(&root.join(format!("f{i}.txt")), format!("content {i}").as_bytes());
    }

    // Two keys fail on write; the rest of the pool keeps going.
    let store = Arc::new(MemoryStore::failing_on(&["f3.txt", "f17.txt"]));
    let prefix = root.to_string_lossy().replace('\\', "/");
    let items = enumerate(&root, &prefix);
    let total = items.len() as u64;
    assert_eq!(total, 40);

    let stats = coordinator(&store).workers(8).run(items, false).await?;
    assert_eq!(stats.uploaded + stats.skipped + stats.failed, total);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.uploaded, 38);
    assert_eq!(stats.errors.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn excluded_paths_never_reach_the_store() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("proj");
    write_file(&root.join("main.txt"), b"keep");
    write_file(&root.join(".git/HEAD"), b"ref");
    write_file(&root.join("main.txt~"), b"backup");

    let store = Arc::new(MemoryStore::new());
    let prefix = root.to_string_lossy().replace('\\', "/");
    let stats = coordinator(&store).run(enumerate(&root, &prefix), false).await?;

    assert_eq!(stats.total(), 1);
    assert!(store.get("main.txt").is_some());
    assert!(store.get(".git/HEAD").is_none());
    assert!(store.get("main.txt~").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dry_run_decides_but_never_writes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("new.txt"), b"new");
    write_file(&root.join("same.txt"), b"hello");

    let store = Arc::new(MemoryStore::new());
    store.seed("same.txt", b"hello", Some(HELLO_MD5));

    let prefix = root.to_string_lossy().replace('\\', "/");
    let stats = coordinator(&store)
        .dry_run(true)
        .run(enumerate(&root, &prefix), false)
        .await?;

    assert_eq!(stats.uploaded, 1); // would upload new.txt
    assert_eq!(stats.skipped, 1);
    assert_eq!(store.write_count(), 0);
    assert!(store.get("new.txt").is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreadable_local_file_is_surfaced_as_failed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("a");
    write_file(&root.join("ok.txt"), b"fine");

    let prefix = root.to_string_lossy().replace('\\', "/");
    let mut items = enumerate(&root, &prefix);
    // An item whose local file vanished between walk and processing.
    items.push(WorkItem {
        local_path: root.join("gone.txt"),
        key: "gone.txt".to_string(),
    });

    let store = Arc::new(MemoryStore::new());
    let stats = coordinator(&store).run(items, false).await?;
    assert_eq!(stats.uploaded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(store.write_count(), 1);
    Ok(())
}
