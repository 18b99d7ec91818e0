use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_kensa"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "kensa init failed: {}", String::from_utf8_lossy(&output.stderr));

    let config_path = dir.path().join(".kensa.toml");
    assert!(config_path.exists(), ".kensa.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[llm]"));
    assert!(content.contains("[review]"));
    assert!(content.contains("[github]"));

    // The commented template must parse to the defaults
    let config: kensa_core::KensaConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.llm.model, "gpt-4o-mini");
    assert_eq!(config.review.max_concurrency, 4);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".kensa.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_kensa"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".kensa.toml")).unwrap();
    assert_eq!(content, "# existing");
}
