// Registry tests: static and file-backed descriptor sources

use mcstatus::models::ServerDescriptor;
use mcstatus::registry::{DescriptorSource, FileRegistry, Registry, StaticRegistry};
use tempfile::TempDir;

#[tokio::test]
async fn static_registry_replace_is_visible() {
    let registry = StaticRegistry::new(vec![ServerDescriptor::new("a", "A", "x")]);
    assert_eq!(registry.descriptors().await.unwrap().len(), 1);

    registry.replace(vec![]);
    assert!(registry.descriptors().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_registry_rereads_on_every_call() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("servers.json");
    let registry = FileRegistry::new(&path);

    std::fs::write(&path, r#"[{"id":"a","name":"A","address":"mc.example.com"}]"#).unwrap();
    let first = registry.descriptors().await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].port, 25565);

    std::fs::write(
        &path,
        r#"[{"id":"a","name":"A","address":"x"},{"id":"b","name":"B","address":"y","isActive":false}]"#,
    )
    .unwrap();
    let second = registry.descriptors().await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(!second[1].active);
}

#[tokio::test]
async fn file_registry_missing_or_empty_is_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("servers.json");
    let registry = FileRegistry::new(&path);
    assert!(registry.descriptors().await.unwrap().is_empty());

    std::fs::write(&path, "  \n").unwrap();
    assert!(registry.descriptors().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_registry_malformed_is_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("servers.json");
    std::fs::write(&path, "{ not json").unwrap();

    let registry = Registry::File(FileRegistry::new(&path));
    let err = registry.descriptors().await.unwrap_err();
    assert!(err.to_string().contains("parse registry file"));
}
