use codegraph_core::{CodeGraphConfig, EmbeddingProviderKind, LogFormat};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_partial_file_keeps_defaults_for_missing_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[logging]
level = "debug"
format = "json"

[git]
cache_max_age_secs = 3600
default_branch = "develop"
"#,
    )
    .unwrap();

    let config = CodeGraphConfig::load(Some(&path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.git.cache_max_age_secs, 3600);
    assert_eq!(config.git.default_branch, "develop");
    assert_eq!(config.git.clone_depth, 1);
    assert_eq!(config.scan.batch_size, 100);
    assert_eq!(config.graph.list_limit, 1000);
}

#[test]
fn test_invalid_file_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[embedding]\nsimilarity_threshold = 2.0\n").unwrap();
    assert!(CodeGraphConfig::load(Some(&path)).is_err());

    fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
    assert!(CodeGraphConfig::load(Some(&path)).is_err());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(CodeGraphConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_provider_names_parse() {
    assert_eq!(
        "OpenAI".parse::<EmbeddingProviderKind>().unwrap(),
        EmbeddingProviderKind::OpenAi
    );
    assert_eq!(
        "none".parse::<EmbeddingProviderKind>().unwrap(),
        EmbeddingProviderKind::Disabled
    );
    assert!("faiss".parse::<EmbeddingProviderKind>().is_err());
}
