use super::*;
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_semicolon_separated() {
    let sqls = parse_workload(
        "SELECT * FROM orders WHERE customer_id = 1;\n\
         -- ignored; comment\n\
         SELECT * FROM orders WHERE note = 'a;b';\n\n",
    )
    .unwrap();
    assert_eq!(
        sqls,
        vec![
            "SELECT * FROM orders WHERE customer_id = 1".to_string(),
            "SELECT * FROM orders WHERE note = 'a;b'".to_string(),
        ]
    );
}

#[test]
fn test_json_array() {
    let sqls = parse_workload(r#"["SELECT 1", "  ", "SELECT 2;"]"#).unwrap();
    assert_eq!(sqls, vec!["SELECT 1".to_string(), "SELECT 2;".to_string()]);
}

#[test]
fn test_invalid_json_is_an_error() {
    assert!(parse_workload("[1, 2]").is_err());
}

#[test]
fn test_read_workload_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "SELECT 1; SELECT 2").unwrap();
    let sqls = read_workload(file.path()).unwrap();
    assert_eq!(sqls, vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);
}

#[test]
fn test_literal_argument_is_trimmed() {
    assert_eq!(read_sql("  SELECT 1 \n").unwrap(), "SELECT 1");
}
