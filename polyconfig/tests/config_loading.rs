use polyconfig::Config;
use std::fs;

#[test]
fn test_load_config_from_directory() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("config.yaml"),
        "restreamer:\n  host: restreamer.lan\n  username: admin\nhealth:\n  failure_threshold: 4\n",
    )?;

    let config = Config::load_config(dir.path().to_str().unwrap())?;

    assert_eq!(config.get_restreamer_host(), "restreamer.lan");
    assert_eq!(config.get_restreamer_username(), "admin");
    assert_eq!(config.get_health_failure_threshold(), 4);
    assert_eq!(config.get_max_reconnect_attempts(), 5);
    assert!(config.config_file().ends_with("config.yaml"));
    Ok(())
}

#[test]
fn test_missing_file_uses_defaults_and_writes_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let config = Config::load_config(dir.path().to_str().unwrap())?;

    assert_eq!(config.get_restreamer_port(), 8080);
    assert_eq!(config.get_log_level(), "info");
    assert!(!dir.path().join("config.yaml").exists());
    Ok(())
}

#[test]
fn test_empty_file_keeps_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("config.yaml"), "")?;

    let config = Config::load_config(dir.path().to_str().unwrap())?;

    assert_eq!(config.get_health_check_interval_secs(), 30);
    Ok(())
}

#[test]
fn test_invalid_yaml_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("config.yaml"), "restreamer: [unclosed\n")?;

    assert!(Config::load_config(dir.path().to_str().unwrap()).is_err());
    Ok(())
}

#[test]
fn test_env_override_applies() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::env::set_var("POLYEMESIS_CONFIG__PREVIEW__DEFAULT_DURATION_SECS", "120");

    let config = Config::load_config(dir.path().to_str().unwrap())?;
    std::env::remove_var("POLYEMESIS_CONFIG__PREVIEW__DEFAULT_DURATION_SECS");

    assert_eq!(config.get_preview_default_duration_secs(), 120);
    Ok(())
}
