use anyhow::Result;
use datamill::format::xlsx::{XlsxReader, MAX_XLSX_BYTES};
use std::fs::File;

#[test]
fn size_ceiling_rejects_before_the_workbook_opens() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("huge.xlsx");
    // A sparse file at exactly the ceiling; nothing ever reads its content.
    let file = File::create(&path)?;
    file.set_len(MAX_XLSX_BYTES)?;
    drop(file);

    let err = XlsxReader::open(&path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("too large"));
    assert!(msg.contains("convert to CSV"));
    Ok(())
}

#[test]
fn missing_file_fails_at_open() {
    let err = XlsxReader::open("/no/such/workbook.xlsx").unwrap_err();
    assert!(err.to_string().contains("workbook.xlsx"));
}

#[test]
fn non_archive_content_fails_at_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("fake.xlsx");
    std::fs::write(&path, "this is not a zip archive")?;

    assert!(XlsxReader::open(&path).is_err());
    Ok(())
}
