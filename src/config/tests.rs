use super::*;
use std::fs;
use tempfile::TempDir;

fn write_project_config(root: &Path, content: &str) {
    let dir = root.join(PROJECT_CONFIG_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), content).unwrap();
}

#[test]
fn test_load_project_config() {
    let temp_dir = TempDir::new().unwrap();
    write_project_config(
        temp_dir.path(),
        r#"
model = "gpt-4o"

[llm]
max_retries = 5
retry_base_ms = 250

[agent]
max_iterations = 8
models = ["small", "large"]
model_rules = [{ keyword = "refactor", model = "large" }]
"#,
    );

    let cfg = load_project_config(temp_dir.path()).unwrap();
    assert_eq!(cfg.model, Some("gpt-4o".to_string()));
    let llm = cfg.llm.unwrap();
    assert_eq!(llm.max_retries, Some(5));
    assert_eq!(llm.retry_base_ms, Some(250));
    let agent = cfg.agent.unwrap();
    assert_eq!(agent.max_iterations, Some(8));
    assert_eq!(agent.models, Some(vec!["small".into(), "large".into()]));
    assert_eq!(agent.model_rules.unwrap()[0].model, "large");
}

#[test]
fn test_load_project_config_not_exists() {
    let temp_dir = TempDir::new().unwrap();
    let cfg = load_project_config(temp_dir.path()).unwrap();
    assert_eq!(cfg, FileConfig::default());
}

#[test]
fn test_invalid_project_config_falls_back_to_default() {
    let temp_dir = TempDir::new().unwrap();
    write_project_config(temp_dir.path(), "model = [not toml");
    let cfg = load_project_config(temp_dir.path()).unwrap();
    assert_eq!(cfg, FileConfig::default());
}

#[test]
fn test_merge_priority() {
    let project = FileConfig {
        model: Some("project-model".into()),
        llm: Some(PartialLlmConfig {
            max_retries: Some(1),
            ..Default::default()
        }),
        ..Default::default()
    };
    let global = FileConfig {
        model: Some("global-model".into()),
        base_url: Some("https://global.example/v1".into()),
        llm: Some(PartialLlmConfig {
            max_retries: Some(9),
            retry_base_ms: Some(42),
            ..Default::default()
        }),
        agent: Some(PartialAgentConfig {
            max_iterations: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };
    let env = EnvOverrides {
        api_key: Some("env-key".into()),
        ..Default::default()
    };
    let cli = CliOverrides {
        max_iterations: Some(7),
        ..Default::default()
    };

    let cfg = AppConfig::merge(cli, env, project, global, PathBuf::from("/tmp"));
    assert_eq!(cfg.model.as_deref(), Some("project-model"));
    assert_eq!(cfg.base_url, "https://global.example/v1");
    assert_eq!(cfg.api_key.as_deref(), Some("env-key"));
    assert_eq!(cfg.llm.max_retries, 1);
    assert_eq!(cfg.llm.retry_base_ms, 42);
    assert_eq!(cfg.llm.retry_max_delay_ms, LlmConfig::default().retry_max_delay_ms);
    assert_eq!(cfg.agent.max_iterations, 7);
    assert_eq!(cfg.project_root, PathBuf::from("/tmp"));
}

#[test]
fn test_defaults_without_any_layer() {
    let cfg = AppConfig::merge(
        CliOverrides::default(),
        EnvOverrides::default(),
        FileConfig::default(),
        FileConfig::default(),
        PathBuf::from("."),
    );
    assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    assert!(cfg.model.is_none());
    assert_eq!(cfg.llm, LlmConfig::default());
    assert_eq!(cfg.agent, AgentConfig::default());
}
