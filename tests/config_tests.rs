use hpcflow_core::config::{ConfigLoader, ConfigurationError, Environment, OrchestratorConfig};
use hpcflow_core::orchestration::BackoffCalculator;
use std::io::Write;
use std::time::Duration;

fn toml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write toml");
    file
}

#[test]
fn environment_profiles_differ_where_expected() {
    let test = OrchestratorConfig::for_environment(Environment::Test);
    assert_eq!(test.backoff.base_delay_ms, 0);
    assert!(!test.backoff.jitter_enabled);
    assert_eq!(test.monitor.poll_interval(), Duration::from_secs(1));
    assert_eq!(
        test.orchestration.cancel_timeout(),
        Duration::from_secs(5)
    );

    let production = OrchestratorConfig::for_environment(Environment::Production);
    assert!(production.logging.json);
    assert_eq!(production.orchestration.max_task_retries, 3);

    for environment in [
        Environment::Development,
        Environment::Test,
        Environment::Production,
    ] {
        assert!(OrchestratorConfig::for_environment(environment)
            .validate()
            .is_ok());
    }
}

#[test]
fn environment_names_parse_with_aliases() {
    assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
    assert_eq!("TEST".parse::<Environment>().unwrap(), Environment::Test);
    assert!(matches!(
        "staging".parse::<Environment>(),
        Err(ConfigurationError::UnknownEnvironment(_))
    ));
}

#[test]
fn file_layers_over_the_selected_profile() {
    let file = toml_file(
        r#"
[orchestration]
max_task_retries = 1

[monitor]
poll_interval_seconds = 30

[execution]
script_directory = "/var/lib/hpcflow/scripts"
"#,
    );

    let config = ConfigLoader::new()
        .with_environment(Environment::Test)
        .with_file(file.path())
        .without_env_overrides()
        .load()
        .unwrap();

    assert_eq!(config.environment, Environment::Test);
    assert_eq!(config.orchestration.max_task_retries, 1);
    assert_eq!(config.monitor.poll_interval_seconds, 30);
    assert_eq!(
        config.execution.script_directory.to_str(),
        Some("/var/lib/hpcflow/scripts")
    );
    // Untouched keys keep the profile's values
    assert_eq!(config.backoff.base_delay_ms, 0);
}

#[test]
fn environment_variables_win_over_the_file() {
    let file = toml_file("[backoff]\nmax_delay_ms = 5000\n");
    std::env::set_var("HPCFLOW__BACKOFF__MAX_DELAY_MS", "9000");

    let result = ConfigLoader::new()
        .with_environment(Environment::Development)
        .with_file(file.path())
        .load();
    std::env::remove_var("HPCFLOW__BACKOFF__MAX_DELAY_MS");

    let config = result.unwrap();
    assert_eq!(config.backoff.max_delay_ms, 9_000);
}

#[test]
fn inconsistent_backoff_is_rejected() {
    let file = toml_file("[backoff]\nbase_delay_ms = 10000\nmax_delay_ms = 100\n");

    let err = ConfigLoader::new()
        .with_environment(Environment::Development)
        .with_file(file.path())
        .without_env_overrides()
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}

#[test]
fn malformed_file_is_a_load_error() {
    let file = toml_file("[orchestration\nmax_task_retries = ");

    let err = ConfigLoader::new()
        .with_environment(Environment::Development)
        .with_file(file.path())
        .without_env_overrides()
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::LoadError { .. }));
}

#[test]
fn backoff_follows_the_loaded_settings() {
    let file = toml_file(
        "[backoff]\nbase_delay_ms = 100\nmax_delay_ms = 1000\nmultiplier = 2.0\njitter_enabled = false\n",
    );
    let config = ConfigLoader::new()
        .with_environment(Environment::Development)
        .with_file(file.path())
        .without_env_overrides()
        .load()
        .unwrap();

    let calculator = BackoffCalculator::new(config.backoff);
    assert_eq!(calculator.calculate(1).delay(), Duration::from_millis(100));
    assert_eq!(calculator.calculate(2).delay(), Duration::from_millis(200));
    assert_eq!(calculator.calculate(10).delay(), Duration::from_millis(1000));
}

#[test]
fn monitor_needs_at_least_one_gone_confirmation() {
    let file = toml_file("[monitor]\ngone_confirmations = 0\n");

    let err = ConfigLoader::new()
        .with_environment(Environment::Development)
        .with_file(file.path())
        .without_env_overrides()
        .load()
        .unwrap_err();

    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));

    let defaults = OrchestratorConfig::for_environment(Environment::Production);
    assert_eq!(defaults.monitor.gone_confirmations, 3);
    assert_eq!(
        defaults.monitor.max_queue_wait(),
        Duration::from_secs(7 * 24 * 3_600)
    );
}
