use anyhow::Result;
use datamill::format::jsonl::{JsonlReader, JsonlWriter};
use datamill::Value;
use std::fs;

#[test]
fn columns_follow_first_object_key_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rows.jsonl");
    fs::write(&path, "{\"zeta\":1,\"alpha\":2,\"mid\":3}\n")?;

    let reader = JsonlReader::open(&path)?;
    assert_eq!(reader.columns(), ["zeta", "alpha", "mid"]);
    Ok(())
}

#[test]
fn first_object_is_replayed_as_first_row() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rows.jsonl");
    fs::write(&path, "{\"a\":1,\"b\":\"x\"}\n{\"a\":2,\"b\":\"y\"}\n")?;

    let mut reader = JsonlReader::open(&path)?;
    assert_eq!(
        reader.next_row()?.unwrap(),
        vec![Value::Int(1), Value::Text("x".into())]
    );
    assert_eq!(
        reader.next_row()?.unwrap(),
        vec![Value::Int(2), Value::Text("y".into())]
    );
    assert!(reader.next_row()?.is_none());
    Ok(())
}

#[test]
fn missing_keys_become_null_and_extra_keys_are_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rows.jsonl");
    fs::write(
        &path,
        "{\"a\":1,\"b\":true}\n{\"b\":false,\"extra\":\"dropped\"}\n{}\n",
    )?;

    let mut reader = JsonlReader::open(&path)?;
    reader.next_row()?;
    assert_eq!(
        reader.next_row()?.unwrap(),
        vec![Value::Null, Value::Bool(false)]
    );
    assert_eq!(reader.next_row()?.unwrap(), vec![Value::Null, Value::Null]);
    Ok(())
}

#[test]
fn value_types_decode_natively() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("types.jsonl");
    fs::write(
        &path,
        "{\"i\":7,\"f\":1.25,\"s\":\"text\",\"b\":false,\"n\":null,\"nested\":[1,2]}\n",
    )?;

    let mut reader = JsonlReader::open(&path)?;
    assert_eq!(
        reader.next_row()?.unwrap(),
        vec![
            Value::Int(7),
            Value::Float(1.25),
            Value::Text("text".into()),
            Value::Bool(false),
            Value::Null,
            Value::Text("[1,2]".into()),
        ]
    );
    Ok(())
}

#[test]
fn invalid_line_is_fatal_and_names_the_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bad.jsonl");
    fs::write(&path, "{\"a\":1}\n{not json\n")?;

    let mut reader = JsonlReader::open(&path)?;
    reader.next_row()?;
    let err = reader.next_row().unwrap_err();
    assert!(err.to_string().contains("line 2"));
    Ok(())
}

#[test]
fn array_lines_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("array.jsonl");
    fs::write(&path, "[1,2,3]\n")?;

    let err = JsonlReader::open(&path).unwrap_err();
    assert!(err.to_string().contains("line 1"));
    Ok(())
}

#[test]
fn empty_file_fails_at_open() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty.jsonl");
    fs::write(&path, "")?;

    let err = JsonlReader::open(&path).unwrap_err();
    assert!(err.to_string().contains("empty file"));
    Ok(())
}

#[test]
fn blank_lines_are_skipped() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("gaps.jsonl");
    fs::write(&path, "{\"a\":1}\n\n{\"a\":2}\n")?;

    let mut reader = JsonlReader::open(&path)?;
    assert_eq!(reader.next_row()?.unwrap(), vec![Value::Int(1)]);
    assert_eq!(reader.next_row()?.unwrap(), vec![Value::Int(2)]);
    assert!(reader.next_row()?.is_none());
    Ok(())
}

#[test]
fn writer_emits_one_compact_object_per_line() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.jsonl");

    let cols = vec!["id".to_string(), "name".to_string(), "score".to_string()];
    let mut writer = JsonlWriter::open(&path, &cols)?;
    writer.write_row(&vec![
        Value::Int(1),
        Value::Text("Alice".into()),
        Value::Float(9.5),
    ])?;
    // Short row: trailing columns are null.
    writer.write_row(&vec![Value::Int(2)])?;
    writer.close()?;

    let contents = fs::read_to_string(&path)?;
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("{\"id\":1,\"name\":\"Alice\",\"score\":9.5}")
    );
    assert_eq!(lines.next(), Some("{\"id\":2,\"name\":null,\"score\":null}"));
    assert_eq!(lines.next(), None);
    Ok(())
}

#[test]
fn zero_rows_produce_an_empty_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("empty_out.jsonl");

    let cols = vec!["id".to_string()];
    let writer = JsonlWriter::open(&path, &cols)?;
    writer.close()?;

    assert_eq!(fs::read_to_string(&path)?, "");
    Ok(())
}

#[test]
fn jsonl_roundtrip_preserves_values() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("roundtrip.jsonl");

    let cols = vec!["i".to_string(), "s".to_string(), "b".to_string()];
    let rows = vec![
        vec![Value::Int(1), Value::Text("x".into()), Value::Bool(true)],
        vec![Value::Int(2), Value::Null, Value::Bool(false)],
    ];

    let mut writer = JsonlWriter::open(&path, &cols)?;
    for row in &rows {
        writer.write_row(row)?;
    }
    writer.close()?;

    let mut reader = JsonlReader::open(&path)?;
    assert_eq!(reader.columns(), cols.as_slice());
    let mut read_back = Vec::new();
    while let Some(row) = reader.next_row()? {
        read_back.push(row);
    }
    assert_eq!(read_back, rows);
    Ok(())
}
