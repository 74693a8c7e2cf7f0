use std::io::Write;
use std::process::Command;
use rustmemorm::{AttributeMapping, BootModel, ManagedTypeMapping, SqlType};
use tempfile::NamedTempFile;

fn mapping_file() -> NamedTempFile {
    let boot = BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Item")
                .table("item")
                .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                .attribute(AttributeMapping::many_to_one("owner", "Person", &["owner_id"])),
        )
        .with_type(
            ManagedTypeMapping::entity("Person")
                .table("person")
                .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
        );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(&boot).unwrap().as_bytes())
        .unwrap();
    file
}

fn inspect(args: &[&str]) -> (bool, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_model-inspect"))
        .args(args)
        .output()
        .unwrap();
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn test_model_lists_types_and_tables() {
    let file = mapping_file();
    let path = file.path().to_str().unwrap();
    let (ok, stdout, _) = inspect(&["--mapping", path, "model"]);

    assert!(ok);
    assert!(stdout.contains("Hierarchies:"));
    assert!(stdout.contains("  Item ("));
    assert!(stdout.contains("  Person ("));
    assert!(stdout.contains("person"));
}

#[test]
fn test_shape_prints_selected_columns() {
    let file = mapping_file();
    let path = file.path().to_str().unwrap();
    let (ok, stdout, _) = inspect(&["--mapping", path, "shape", "--entity", "Item", "--alias", "i"]);

    assert!(ok);
    assert!(stdout.contains("Columns:"));
    assert!(stdout.contains("i.owner_id"));
    assert!(stdout.contains("i_owner.name"));
}

#[test]
fn test_unknown_entity_fails() {
    let file = mapping_file();
    let path = file.path().to_str().unwrap();
    let (ok, _, stderr) = inspect(&["--mapping", path, "shape", "--entity", "Ghost"]);

    assert!(!ok);
    assert!(stderr.contains("Ghost"));
}

#[test]
fn test_missing_mapping_document_fails() {
    let (ok, _, stderr) = inspect(&["--mapping", "/nonexistent/mapping.json", "model"]);
    assert!(!ok);
    assert!(stderr.contains("failed to read mapping document"));
}
