//! Shared instance cache behavior across documents and threads.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use common::PathEvaluator;
use horizon_trellis::{
    DataTree, FormDocument, InstanceCaching, InstanceDefinition, InstanceLoader, LoadError,
    ModelDefinition, SharedInstanceCache,
};

/// A loader that counts fetches and takes long enough for waiters to pile
/// up.
struct SlowLoader {
    fetches: AtomicUsize,
    delay: Duration,
}

impl SlowLoader {
    fn new(delay: Duration) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            delay,
        }
    }

    fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl InstanceLoader for SlowLoader {
    fn load(
        &self,
        _resolved_url: &str,
        _follow_includes: bool,
        _read_only: bool,
    ) -> Result<DataTree, LoadError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        let mut tree = DataTree::new("catalog");
        let entry = tree.append_child(tree.root(), "entry").unwrap();
        tree.set_value(entry, "shared").unwrap();
        Ok(tree)
    }
}

#[test]
fn concurrent_requests_share_one_fetch() {
    common::init_tracing();
    let cache = SharedInstanceCache::new();
    let loader = SlowLoader::new(Duration::from_millis(50));
    let key = InstanceCaching::new("http://example.org/catalog.xml", Vec::new());

    let trees: Vec<Arc<DataTree>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = &cache;
                let loader = &loader;
                let key = &key;
                scope.spawn(move || cache.find_content_or_load(key, loader, false).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // One physical fetch, every caller sees the same immutable tree.
    assert_eq!(loader.count(), 1);
    for tree in &trees {
        assert!(Arc::ptr_eq(tree, &trees[0]));
        assert!(tree.is_read_only());
    }
}

#[test]
fn distinct_parameter_fingerprints_fetch_independently() {
    let cache = SharedInstanceCache::new();
    let loader = SlowLoader::new(Duration::ZERO);
    let anonymous = InstanceCaching::new("http://example.org/catalog.xml", Vec::new());
    let localized = InstanceCaching::new(
        "http://example.org/catalog.xml",
        vec![("lang".into(), "fr".into())],
    );

    let first = cache.find_content_or_load(&anonymous, &loader, false).unwrap();
    let second = cache.find_content_or_load(&localized, &loader, false).unwrap();

    assert_eq!(loader.count(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn documents_sharing_a_cache_share_the_fetch() {
    fn cached_definition() -> Arc<ModelDefinition> {
        Arc::new(
            ModelDefinition::new("m").with_instance(
                InstanceDefinition::external("catalog", "http://example.org/catalog.xml")
                    .with_read_only()
                    .with_cache(),
            ),
        )
    }

    let cache = Arc::new(SharedInstanceCache::new());
    let loader_fetches = Arc::new(AtomicUsize::new(0));

    struct CountingLoader(Arc<AtomicUsize>);
    impl InstanceLoader for CountingLoader {
        fn load(
            &self,
            _resolved_url: &str,
            _follow_includes: bool,
            _read_only: bool,
        ) -> Result<DataTree, LoadError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(DataTree::new("catalog"))
        }
    }

    let mut sessions = Vec::new();
    for _ in 0..3 {
        let mut document = FormDocument::builder(PathEvaluator::new())
            .with_loader(CountingLoader(loader_fetches.clone()))
            .with_cache(cache.clone())
            .build();
        let handle = document.add_model(cached_definition());
        document.initialize(true).unwrap();
        sessions.push((document, handle));
    }

    // Three sessions, one physical fetch.
    assert_eq!(loader_fetches.load(Ordering::SeqCst), 1);
    for (document, handle) in &sessions {
        let instance = document.model(*handle).unwrap().instance("catalog").unwrap();
        assert!(instance.is_read_only());
        assert!(instance.caching().is_some());
    }

    // All sessions share the identical tree: same identity, no copies.
    let first = sessions[0].0.model(sessions[0].1).unwrap().instance("catalog").unwrap();
    let second = sessions[1].0.model(sessions[1].1).unwrap().instance("catalog").unwrap();
    assert_eq!(first.tree_id(), second.tree_id());
}

#[test]
fn mutable_view_of_cached_content_gets_its_own_copy() {
    let cache = Arc::new(SharedInstanceCache::new());

    struct StaticLoader;
    impl InstanceLoader for StaticLoader {
        fn load(
            &self,
            _resolved_url: &str,
            _follow_includes: bool,
            _read_only: bool,
        ) -> Result<DataTree, LoadError> {
            let mut tree = DataTree::new("settings");
            let item = tree.append_child(tree.root(), "theme").unwrap();
            tree.set_value(item, "dark").unwrap();
            Ok(tree)
        }
    }

    let definition = Arc::new(
        ModelDefinition::new("m").with_instance(
            // Cacheable but not read-only: the session may edit its copy.
            InstanceDefinition::external("settings", "http://example.org/settings.xml")
                .with_cache(),
        ),
    );

    let mut document = FormDocument::builder(PathEvaluator::new())
        .with_loader(StaticLoader)
        .with_cache(cache.clone())
        .build();
    let handle = document.add_model(definition);
    document.initialize(true).unwrap();

    let model = document.model(handle).unwrap();
    let instance = model.instance("settings").unwrap();
    assert!(!instance.is_read_only());

    let tree = instance.tree();
    let theme = tree.find_child(tree.root(), "theme").unwrap();
    let theme_ref = tree.node_ref(theme);
    document.set_value(theme_ref, "light").unwrap();

    // The cached original is untouched.
    let key = InstanceCaching::new("http://example.org/settings.xml", Vec::new());
    let cached = cache.find_content_or_load(&key, &StaticLoader, false).unwrap();
    let cached_theme = cached.find_child(cached.root(), "theme").unwrap();
    assert_eq!(cached.value(cached_theme), Some("dark"));
}
