//! Unit tests for configuration parsing and validation.

use agent_switchboard::config::{GlobalConfig, LogLevel, BOT_TOKEN_ENV};
use agent_switchboard::AppError;
use serial_test::serial;

fn minimal(extra: &str) -> String {
    format!(
        r#"
bot_token = "test-token"
agent_name = "fake-agent"
{extra}
"#
    )
}

#[test]
#[serial]
fn defaults_apply() {
    let config = GlobalConfig::from_toml_str(&minimal("")).expect("valid config");
    assert_eq!(config.max_workers, 5);
    assert_eq!(config.idle_timeout_seconds, 30);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(
        config.workspace_base_path,
        std::path::PathBuf::from("./workspaces/")
    );
    assert_eq!(
        config.agent_config_path,
        std::path::PathBuf::from("./agent-config/")
    );
    assert!(config.allowed_user_ids.is_empty());
    assert!(config.agent_args.is_empty());
}

#[test]
#[serial]
fn missing_bot_token_fails_when_env_is_unset() {
    std::env::remove_var(BOT_TOKEN_ENV);
    let raw = "agent_name = \"fake-agent\"\n";
    let result = GlobalConfig::from_toml_str(raw);
    assert!(
        matches!(result, Err(AppError::Config(_))),
        "got {result:?}"
    );
}

#[test]
#[serial]
fn bot_token_falls_back_to_the_environment() {
    std::env::set_var(BOT_TOKEN_ENV, "env-token");
    let raw = "agent_name = \"fake-agent\"\n";
    let config = GlobalConfig::from_toml_str(raw).expect("env token accepted");
    assert_eq!(config.bot_token().expect("token present"), "env-token");
    std::env::remove_var(BOT_TOKEN_ENV);
}

#[test]
#[serial]
fn zero_workers_is_rejected() {
    let result = GlobalConfig::from_toml_str(&minimal("max_workers = 0"));
    assert!(
        matches!(result, Err(AppError::Config(_))),
        "got {result:?}"
    );
}

#[test]
#[serial]
fn agent_name_must_match_the_pattern() {
    for bad in ["ab", "has space", "../sneaky", "dot.name"] {
        let raw = format!("bot_token = \"t\"\nagent_name = \"{bad}\"\n");
        let result = GlobalConfig::from_toml_str(&raw);
        assert!(
            matches!(result, Err(AppError::Config(_))),
            "'{bad}' must be rejected, got {result:?}"
        );
    }
}

#[test]
#[serial]
fn empty_allowlist_denies_everyone() {
    let config = GlobalConfig::from_toml_str(&minimal("")).expect("valid config");
    assert!(!config.is_user_allowed(1));
    assert!(!config.is_user_allowed(0));
}

#[test]
#[serial]
fn allowlist_admits_only_listed_ids() {
    let config =
        GlobalConfig::from_toml_str(&minimal("allowed_user_ids = [10, 20]")).expect("valid");
    assert!(config.is_user_allowed(10));
    assert!(config.is_user_allowed(20));
    assert!(!config.is_user_allowed(30));
}

#[test]
#[serial]
fn log_level_parses_the_uppercase_names() {
    let config =
        GlobalConfig::from_toml_str(&minimal("log_level = \"WARNING\"")).expect("valid");
    assert_eq!(config.log_level, LogLevel::Warning);
    assert_eq!(config.log_level.as_filter(), "warn");
}

#[test]
#[serial]
fn db_path_lives_under_the_workspace_base() {
    let config =
        GlobalConfig::from_toml_str(&minimal("workspace_base_path = \"/tmp/ws\"")).expect("valid");
    assert_eq!(
        config.db_path(),
        std::path::PathBuf::from("/tmp/ws/.switchboard/bindings.db")
    );
}
