use anyhow::Result;
use datamill::format::{detect_format, InputFormat};
use std::fs::File;
use std::io::Write;

#[test]
fn extensions_decide_first() -> Result<()> {
    // The extension path never opens the file, so the paths need not exist.
    assert_eq!(detect_format("data.csv")?, InputFormat::Csv);
    assert_eq!(detect_format("data.CSV")?, InputFormat::Csv);
    assert_eq!(detect_format("data.tsv")?, InputFormat::Tsv);
    assert_eq!(detect_format("data.jsonl")?, InputFormat::Jsonl);
    assert_eq!(detect_format("data.ndjson")?, InputFormat::Jsonl);
    assert_eq!(detect_format("data.xlsx")?, InputFormat::Xlsx);
    Ok(())
}

#[test]
fn legacy_excel_extension_is_rejected() {
    let err = detect_format("report.xls").unwrap_err();
    assert!(err.to_string().contains("XLS"));
    assert!(err.to_string().contains("legacy"));
}

#[test]
fn bare_json_extension_is_rejected() {
    let err = detect_format("records.json").unwrap_err();
    assert!(err.to_string().contains("JSONL"));
}

#[test]
fn zip_signature_sniffs_as_xlsx() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("workbook");
    File::create(&path)?.write_all(&[0x50, 0x4B, 0x03, 0x04, 0x00, 0x00])?;
    assert_eq!(detect_format(&path)?, InputFormat::Xlsx);
    Ok(())
}

#[test]
fn ole2_signature_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("legacy");
    File::create(&path)?.write_all(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])?;
    let err = detect_format(&path).unwrap_err();
    assert!(err.to_string().contains("XLS format detected"));
    Ok(())
}

#[test]
fn plain_text_defaults_to_csv() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("noext");
    File::create(&path)?.write_all(b"id,name\n1,Alice\n")?;
    assert_eq!(detect_format(&path)?, InputFormat::Csv);
    Ok(())
}

#[test]
fn empty_file_cannot_be_detected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty");
    File::create(&path)?;
    let err = detect_format(&path).unwrap_err();
    assert!(err.to_string().contains("empty"));
    Ok(())
}
