use clusterflow_monitoring::{init_logging, LoggingConfig};

#[test]
fn test_init_logging_with_file_output_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoggingConfig {
        log_filter: "debug".to_string(),
        json: true,
        log_file: Some(dir.path().join("clusterflowd.log")),
        ..LoggingConfig::default()
    };

    init_logging(&config).unwrap();
    tracing::info!(flow_id = "f-1", "written to the rolling file");

    let written = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().starts_with("clusterflowd.log"));
    assert!(written);

    assert!(init_logging(&LoggingConfig::default()).is_err());
}
