use anyhow::Result;
use datamill::config::{Config, DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_EVERY};
use datamill::Mode;
use std::io::Write;

fn parse(json: &str) -> Config {
    serde_json::from_str(json).expect("config document parses")
}

#[test]
fn defaults_applied_on_validate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("data.csv");
    writeln!(std::fs::File::create(&input)?, "a,b\n1,2")?;

    let mut config = parse(&format!(
        r#"{{"mode":"import","dsn":"postgres://u:p@h/db","input_file":{:?},"table":"t"}}"#,
        input.to_str().unwrap()
    ));
    config.validate()?;
    assert_eq!(config.mode, Mode::Import);
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.progress_every, DEFAULT_PROGRESS_EVERY);
    assert_eq!(config.input_format, "auto");

    config.normalize()?;
    assert!(config.workers >= 1);
    assert_eq!(config.input_format, "csv");
    Ok(())
}

#[test]
fn dsn_is_required() {
    let mut config = parse(r#"{"mode":"export","dsn":"","output_file":"o.csv","output_format":"csv","query":"SELECT 1"}"#);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("dsn is required"));
}

#[test]
fn oversized_batch_rejected() {
    let mut config = parse(
        r#"{"mode":"export","dsn":"postgres://u:p@h/db","batch_size":50001,"output_file":"o.csv","output_format":"csv","query":"SELECT 1"}"#,
    );
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("batch_size too large"));
}

#[test]
fn import_requires_existing_input_file() {
    let mut config = parse(
        r#"{"mode":"import","dsn":"postgres://u:p@h/db","input_file":"/no/such/file.csv","table":"t"}"#,
    );
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn import_requires_table() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("data.csv");
    writeln!(std::fs::File::create(&input)?, "a\n1")?;

    let mut config = parse(&format!(
        r#"{{"mode":"import","dsn":"postgres://u:p@h/db","input_file":{:?}}}"#,
        input.to_str().unwrap()
    ));
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("table is required"));
    Ok(())
}

#[test]
fn unknown_input_format_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("data.csv");
    writeln!(std::fs::File::create(&input)?, "a\n1")?;

    let mut config = parse(&format!(
        r#"{{"mode":"import","dsn":"postgres://u:p@h/db","input_file":{:?},"table":"t","input_format":"avro"}}"#,
        input.to_str().unwrap()
    ));
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("invalid input_format"));
    Ok(())
}

#[test]
fn export_requires_query_and_format() {
    let mut config =
        parse(r#"{"mode":"export","dsn":"postgres://u:p@h/db","output_file":"o.csv","output_format":"csv"}"#);
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("query is required"));

    let mut config = parse(
        r#"{"mode":"export","dsn":"postgres://u:p@h/db","output_file":"o.csv","output_format":"xml","query":"SELECT 1"}"#,
    );
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("invalid output_format"));
}
