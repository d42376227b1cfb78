use std::path::{Path, PathBuf};

use tp_domain::config::{Config, ConfigSeverity};

#[test]
fn default_connection_options() {
    let config = Config::default();
    assert_eq!(config.connection.max_attempts, 3);
    assert_eq!(config.connection.retry_delay_ms, 5000);
    assert_eq!(config.connection.max_delay_ms, 30_000);
}

#[test]
fn default_providers_file() {
    let config = Config::default();
    assert_eq!(config.providers.file, PathBuf::from("providers.json"));
}

#[test]
fn empty_toml_yields_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.agents.is_empty());
    assert_eq!(config.connection.request_timeout_ms, 30_000);
    assert!(config.validate().is_empty());
}

#[test]
fn parses_agents_with_private_tools() {
    let toml_str = r#"
[agents.researcher]
description = "Digs through papers"
tools_file = "agents/researcher.json"

[agents.writer]
description = "Drafts prose"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.agents.len(), 2);
    assert!(config.agents["researcher"].has_private_tools());
    assert!(!config.agents["writer"].has_private_tools());
}

#[test]
fn partial_connection_section_keeps_other_defaults() {
    let toml_str = r#"
[connection]
max_attempts = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.connection.max_attempts, 5);
    assert_eq!(config.connection.retry_delay_ms, 5000);
}

#[test]
fn zero_attempts_is_an_error() {
    let toml_str = r#"
[connection]
max_attempts = 0
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "connection.max_attempts"));
}

#[test]
fn absolute_agent_tools_file_warns() {
    let toml_str = r#"
[agents.rogue]
tools_file = "/etc/providers.json"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].field, "agents.rogue.tools_file");
}

#[test]
fn root_defaults_to_config_directory() {
    let config = Config::default();
    assert_eq!(
        config.resolve_root(Path::new("/srv/toolport/config.toml")),
        PathBuf::from("/srv/toolport")
    );
    assert_eq!(config.resolve_root(Path::new("config.toml")), PathBuf::from("."));
}

#[test]
fn explicit_root_wins() {
    let config: Config = toml::from_str(r#"root = "/opt/tp""#).unwrap();
    assert_eq!(
        config.resolve_root(Path::new("/srv/toolport/config.toml")),
        PathBuf::from("/opt/tp")
    );
}
