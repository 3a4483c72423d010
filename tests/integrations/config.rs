use logrelay::cli::Cli;
use logrelay::config::Config;
use logrelay::formatting::DisplayZone;
use logrelay::severity::SeverityModel;
use clap::Parser;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        [watch]
        log_dir = "/var/log/app"
        file_name = "app.log"
        debounce_ms = 500
        [dispatch]
        poll_interval_seconds = 0.5
        epsilon_seconds = 0.2
        send_timeout_ms = 2500
        display_time_zone = "utc"
        [subscribers]
        store_path = "/var/lib/logrelay/subscribers.json"
        default_threshold = "info"
        [severity.levels]
        ERROR = 3
        WARNING = 4
        INFO = 6
        DEBUG = 7
        [telegram]
        enabled = true
        token = "123:abc"
        poll_timeout_seconds = 20
        [metrics]
        enabled = true
        listen_address = "0.0.0.0:9100"
    "#;

    with_config_file(toml_content, |path| {
        let cli = Cli::try_parse_from(["logrelay", "--config", path.to_str().unwrap()]).unwrap();
        let config = Config::load(&cli).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_path(), PathBuf::from("/var/log/app/app.log"));
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.dispatch.poll_interval_seconds, 0.5);
        assert_eq!(config.dispatch.send_timeout_ms, 2500);
        assert_eq!(config.dispatch.display_time_zone, DisplayZone::Utc);
        assert_eq!(config.subscribers.default_threshold, "info");
        assert_eq!(config.severity.levels().get("WARNING"), Some(&4));
        assert_eq!(config.telegram_token().unwrap(), "123:abc");
        assert_eq!(config.telegram.poll_timeout_seconds, 20);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_address.port(), 9100);
    });
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let cli = Cli::try_parse_from(["logrelay", "--config", "/nonexistent/logrelay.toml"]).unwrap();
    let config = Config::load(&cli).unwrap();

    assert_eq!(config.log_path(), PathBuf::from("logs/logs.log"));
    assert_eq!(config.watch.debounce_ms, 200);
    assert_eq!(config.subscribers.default_threshold, "ERROR");
    assert_eq!(config.severity.levels, None);
    assert_eq!(config.severity.levels().len(), 3);
}

#[test]
#[serial]
fn test_configured_levels_replace_the_defaults() {
    let toml_content = r#"
        [subscribers]
        default_threshold = "FATAL"
        [severity.levels]
        FATAL = 3
    "#;

    with_config_file(toml_content, |path| {
        let cli = Cli::try_parse_from(["logrelay", "--config", path.to_str().unwrap()]).unwrap();
        let config = Config::load(&cli).unwrap();

        let levels = config.severity.levels();
        assert_eq!(levels.len(), 1);
        assert_eq!(levels.get("FATAL"), Some(&3));
        let model = SeverityModel::new(&levels).unwrap();
        assert!(model.parse("DEBUG").is_err());
    });
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let toml_content = r#"
        [watch]
        debounce_ms = 500
        [dispatch]
        send_timeout_ms = 2500
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("LOGRELAY_WATCH__DEBOUNCE_MS", "750");
        std::env::set_var("LOGRELAY_LOG_LEVEL", "trace");
        let cli = Cli::try_parse_from(["logrelay", "--config", path.to_str().unwrap()]).unwrap();
        let result = Config::load(&cli);
        std::env::remove_var("LOGRELAY_WATCH__DEBOUNCE_MS");
        std::env::remove_var("LOGRELAY_LOG_LEVEL");

        let config = result.unwrap();
        assert_eq!(config.watch.debounce_ms, 750);
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.dispatch.send_timeout_ms, 2500);
    });
}

#[test]
#[serial]
fn test_cli_overrides_environment_and_file() {
    let toml_content = r#"
        [watch]
        log_dir = "/from/file"
        debounce_ms = 500
    "#;

    with_config_file(toml_content, |path| {
        std::env::set_var("LOGRELAY_WATCH__DEBOUNCE_MS", "750");
        let cli = Cli::try_parse_from([
            "logrelay",
            "--config",
            path.to_str().unwrap(),
            "--debounce-ms",
            "900",
            "--log-dir",
            "/from/cli",
            "--default-threshold",
            "DEBUG",
        ])
        .unwrap();
        let result = Config::load(&cli);
        std::env::remove_var("LOGRELAY_WATCH__DEBOUNCE_MS");

        let config = result.unwrap();
        assert_eq!(config.watch.debounce_ms, 900);
        assert_eq!(config.watch.log_dir, PathBuf::from("/from/cli"));
        assert_eq!(config.subscribers.default_threshold, "DEBUG");
    });
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    let toml_content = r#"
        [dispatch]
        poll_interval_seconds = 0.0
    "#;

    with_config_file(toml_content, |path| {
        let cli = Cli::try_parse_from(["logrelay", "--config", path.to_str().unwrap()]).unwrap();
        assert!(Config::load(&cli).is_err());
    });
}

#[test]
#[serial]
fn test_default_threshold_must_be_a_configured_level() {
    let toml_content = r#"
        [subscribers]
        default_threshold = "VERBOSE"
    "#;

    with_config_file(toml_content, |path| {
        let cli = Cli::try_parse_from(["logrelay", "--config", path.to_str().unwrap()]).unwrap();
        let err = Config::load(&cli).unwrap_err();
        assert!(err.to_string().contains("VERBOSE"), "{err}");
    });
}
