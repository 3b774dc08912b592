//! Store 加载流程集成测试

use async_trait::async_trait;
use piecework::{
    Constructor, Export, LoadContext, ManifestResolver, Module, ModuleDescriptor, ModuleTable, Piece, PieceBase,
    PieceError, PieceStatus, Result, Store, Walker,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// 宿主定义的基础契约
trait Command: Piece {
    fn run(&self, input: &str) -> String;
}

static REGISTER_CALLS: AtomicUsize = AtomicUsize::new(0);
static DEREGISTER_CALLS: AtomicUsize = AtomicUsize::new(0);

struct Echo {
    base: PieceBase,
    prefix: String,
}

#[async_trait]
impl Piece for Echo {
    fn base(&self) -> &PieceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PieceBase {
        &mut self.base
    }

    async fn register(&mut self) -> Result<()> {
        REGISTER_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn deregister(&mut self) -> Result<()> {
        DEREGISTER_CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Command for Echo {
    fn run(&self, input: &str) -> String {
        format!("{}{}", self.prefix, input)
    }
}

fn echo() -> Constructor<dyn Command> {
    Constructor::new(|options| {
        let prefix = options.get::<String>("prefix")?.unwrap_or_default();
        Ok(Box::new(Echo {
            base: PieceBase::new(options),
            prefix,
        }) as Box<dyn Command>)
    })
}

fn helper_fn(input: &str) -> usize {
    input.len()
}

fn inventory_exports() -> Module {
    Module::new().with_export(Export::constructor("Echo", echo()))
}

piecework::inventory::submit! {
    ModuleDescriptor { file: "registered/Shout.rs", exports: inventory_exports }
}

fn foo_store(dir: &Path) -> Store<dyn Command> {
    let table = ModuleTable::new().with_module(
        "commands/foo.rs",
        Module::new()
            .with_export(Export::constructor("Foo", echo()))
            .with_export(Export::new("helperFn", helper_fn as fn(&str) -> usize)),
    );
    Store::new("commands", Walker::new(Arc::new(table)).with_root(dir))
}

fn commands_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("commands")).unwrap();
    fs::write(dir.path().join("commands/foo.rs"), "").unwrap();
    fs::write(dir.path().join("commands/README.md"), "").unwrap();
    dir
}

#[tokio::test]
async fn test_load_constructs_matching_exports_only() {
    let dir = commands_dir();
    let store = foo_store(dir.path());

    let loaded = store.load("commands", LoadContext::new()).await.unwrap();
    assert_eq!(loaded.len(), 1);

    let piece = loaded[0].lock().await;
    assert_eq!(piece.name(), "foo");
    assert!(piece.enabled());
    assert_eq!(piece.path(), dir.path().join("commands/foo.rs"));
    assert_eq!(piece.store(), store.handle());
    assert_eq!(piece.run("hi"), "hi");

    assert_eq!(store.names(), vec!["foo"]);
    assert!(!store.contains("helperfn"));
}

#[tokio::test]
async fn test_load_dot_relative_path_yields_normalized_path() {
    let dir = commands_dir();
    let store = foo_store(dir.path());

    let loaded = store.load("./commands/../commands", LoadContext::new()).await.unwrap();
    let expected = dir.path().join("commands").join("foo.rs");

    let piece = loaded[0].lock().await;
    assert_eq!(piece.to_json()["path"], expected.to_str().unwrap());
    assert_eq!(store.summaries()[0].path.to_str(), expected.to_str());
}

#[tokio::test]
async fn test_load_with_disabled_context_deregisters_after_hook() {
    let dir = commands_dir();
    let store = foo_store(dir.path());
    let registers = REGISTER_CALLS.load(Ordering::SeqCst);
    let deregisters = DEREGISTER_CALLS.load(Ordering::SeqCst);

    let loaded = store
        .load("commands", LoadContext::new().with_enabled(false))
        .await
        .unwrap();

    assert!(REGISTER_CALLS.load(Ordering::SeqCst) > registers);
    // 只有本测试会触发注销钩子
    assert_eq!(DEREGISTER_CALLS.load(Ordering::SeqCst) - deregisters, 1);
    assert!(!loaded[0].lock().await.enabled());
    assert_eq!(store.status("foo"), Some(PieceStatus::Disabled));
}

#[tokio::test]
async fn test_load_context_options_reach_piece() {
    let dir = commands_dir();
    let store = foo_store(dir.path());

    let loaded = store
        .load(
            "commands",
            LoadContext::new().with_name("bar").with_option("prefix", "> "),
        )
        .await
        .unwrap();

    let piece = loaded[0].lock().await;
    assert_eq!(piece.name(), "bar");
    assert_eq!(piece.run("hi"), "> hi");
    assert_eq!(piece.to_json()["name"], "bar");
    assert!(store.get("foo").is_none());
}

#[tokio::test]
async fn test_manifest_store_end_to_end() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("admin")).unwrap();
    fs::write(
        root.join("Ping.toml"),
        "[[export]]\nname = \"Ping\"\nkind = \"echo\"\n\n[[export]]\nname = \"util\"\nkind = \"helper\"\n",
    )
    .unwrap();
    fs::write(root.join("admin/ban.json"), r#"{"export": [{"name": "Ban", "kind": "echo"}]}"#).unwrap();
    fs::write(root.join("types.d.toml"), "not a manifest").unwrap();

    let resolver = ManifestResolver::new()
        .with_kind("echo", echo())
        .with_kind("helper", 1u8);
    let store: Store<dyn Command> = Store::new("commands", Walker::new(Arc::new(resolver)));

    let loaded = store.load(root, LoadContext::new()).await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(store.names(), vec!["ban", "ping"]);

    let summaries = store.summaries();
    assert_eq!(summaries[0].path, root.join("admin/ban.json"));
    assert!(summaries.iter().all(|s| s.enabled));
}

#[tokio::test]
async fn test_malformed_module_aborts_load() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.toml"), "[[export]\n").unwrap();

    let store: Store<dyn Command> = Store::new(
        "commands",
        Walker::new(Arc::new(ManifestResolver::new().with_kind("echo", echo()))),
    );

    let result = store.load(dir.path(), LoadContext::new()).await;
    assert!(matches!(result, Err(PieceError::Resolve { .. })));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_inventory_store_and_load_all() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("registered")).unwrap();
    fs::write(dir.path().join("registered/Shout.rs"), "").unwrap();
    fs::create_dir_all(dir.path().join("commands")).unwrap();

    let walker = Walker::new(Arc::new(ModuleTable::from_inventory())).with_root(dir.path());
    let store: Store<dyn Command> = Store::new("commands", walker);

    let loaded = store
        .load_all(["registered", "commands"], LoadContext::new())
        .await
        .unwrap();

    assert_eq!(loaded.len(), 1);
    assert_eq!(store.names(), vec!["shout"]);
    assert_eq!(store.enabled().len(), 1);
}

#[tokio::test]
async fn test_shared_walker_between_stores() {
    let dir = commands_dir();
    let table = ModuleTable::new().with_module(
        "commands/foo.rs",
        Module::new().with_export(Export::constructor("Foo", echo())),
    );
    let walker = Arc::new(Walker::new(Arc::new(table)).with_root(dir.path()));

    let first: Store<dyn Command> = Store::with_walker("first", Arc::clone(&walker));
    let second: Store<dyn Command> = Store::with_walker("second", walker);

    first.load("commands", LoadContext::new()).await.unwrap();
    second.load("commands", LoadContext::new()).await.unwrap();

    let from_first = first.get("foo").unwrap();
    let from_second = second.get("foo").unwrap();
    assert!(!Arc::ptr_eq(&from_first, &from_second));
    assert_eq!(from_second.lock().await.store().name, "second");
}
