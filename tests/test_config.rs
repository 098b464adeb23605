//! Config resolution through files on disk

use hubseek::config::{Config, FusionMethod, SearchOverrides};
use hubseek::HubseekError;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_resolve_file_then_overrides() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[search]
default_top_k = 7
fusion_method = "linear"

[search.weights]
lexical = 0.5
vector = 0.5
"#,
    );

    let overrides = SearchOverrides {
        default_top_k: Some(3),
        db_path: Some(PathBuf::from("/tmp/other.db")),
        ..SearchOverrides::default()
    };
    let config = Config::resolve(Some(&path), &overrides).unwrap();

    assert_eq!(config.search.default_top_k, 3);
    assert_eq!(config.search.fusion_method, FusionMethod::Linear);
    assert_eq!(config.search.weights.lexical, 0.5);
    // untouched keys keep their defaults
    assert_eq!(config.search.rrf_k, 60);
    assert_eq!(config.search.rerank_blending.top, 0.75);
    assert_eq!(config.index.db_path, PathBuf::from("/tmp/other.db"));
}

#[test]
fn test_resolve_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[search]
rrf_k = 0

[search.weights]
lexical = 0.9
vector = 0.9
"#,
    );

    match Config::resolve(Some(&path), &SearchOverrides::default()) {
        Err(HubseekError::ConfigValidation { errors }) => {
            assert!(errors.len() >= 2);
            println!("✓ Rejected with {} errors", errors.len());
        }
        other => panic!("expected validation errors, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_resolve_rejects_malformed_toml() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[search\ndefault_top_k = ");

    let result = Config::resolve(Some(&path), &SearchOverrides::default());
    assert!(matches!(result, Err(HubseekError::Toml(_))));
}

#[test]
fn test_init_then_resolve_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("hubseek").join("config.toml");

    Config::default().save(&path).unwrap();
    let config = Config::resolve(Some(&path), &SearchOverrides::default()).unwrap();

    assert_eq!(config.search.default_top_k, 10);
    assert_eq!(config.llm.provider, "none");
}
