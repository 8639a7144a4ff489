use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use docx_formatter::test_support::DocxBuilder;

fn format_docx(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_format-docx"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("run format-docx")
}

fn write_rules(dir: &Path, body: &str) {
    fs::write(dir.join("rules.yaml"), body).expect("write rules");
}

const BODY_RULES: &str = "\
engine: docx
steps:
  - name: Body
    select: { document: true }
    actions:
      - style_apply: { name: Body Text }
";

#[test]
fn run_writes_the_formatted_document() {
    let temp = tempfile::tempdir().expect("tempdir");
    DocxBuilder::new()
        .paragraph("One")
        .paragraph("Two")
        .write_to(temp.path(), "memo.docx");
    write_rules(temp.path(), BODY_RULES);

    let output = format_docx(
        temp.path(),
        &["run", "memo.docx", "--rules", "rules.yaml", "--engine", "docx", "--audit"],
    );

    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("2 modification(s) with the docx engine"), "{stdout}");
    assert!(temp.path().join("output/memo/memo.docx").exists());
    assert!(temp.path().join("output/memo/memo.audit.json").exists());
}

#[test]
fn unknown_recipe_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    DocxBuilder::new().paragraph("Text").write_to(temp.path(), "memo.docx");
    write_rules(
        temp.path(),
        "steps:\n  - name: Custom\n    select: { document: true }\n    actions:\n      - word_recipe: { name: nope }\n",
    );

    let output = format_docx(temp.path(), &["run", "memo.docx", "--rules", "rules.yaml", "--engine", "docx"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
    assert!(!temp.path().join("output/memo/memo.docx").exists());
}

#[test]
fn no_matching_inputs_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_rules(temp.path(), BODY_RULES);

    let output = format_docx(temp.path(), &["run", "in/*.docx", "--rules", "rules.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no input files matched"));
}

#[test]
fn missing_rules_file_exits_with_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    DocxBuilder::new().paragraph("Text").write_to(temp.path(), "memo.docx");

    let output = format_docx(temp.path(), &["run", "memo.docx", "--rules", "absent.yaml"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("absent.yaml"));
}

#[test]
fn check_reports_valid_and_invalid_rules() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_rules(temp.path(), BODY_RULES);
    let ok = format_docx(temp.path(), &["check", "rules.yaml"]);
    assert_eq!(ok.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&ok.stdout).contains("ok (1 step(s), engine docx)"));

    fs::write(
        temp.path().join("bad.yaml"),
        "steps:\n  - name: Broken\n    select: { by_colour: red }\n    actions:\n      - style_apply: { name: x }\n",
    )
    .expect("write bad rules");
    let bad = format_docx(temp.path(), &["check", "bad.yaml"]);
    assert_eq!(bad.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&bad.stderr).contains("Broken"));
}

#[test]
fn config_init_refuses_to_overwrite_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");

    let first = format_docx(temp.path(), &["config", "init"]);
    assert_eq!(first.status.code(), Some(0));
    let written = fs::read_to_string(temp.path().join("format-docx.toml")).expect("config");
    assert!(written.contains("[output]"));

    let second = format_docx(temp.path(), &["config", "init"]);
    assert_eq!(second.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&second.stderr).contains("--force"));

    let forced = format_docx(temp.path(), &["config", "init", "--force"]);
    assert_eq!(forced.status.code(), Some(0));
}

#[test]
fn recipes_lists_builtin_names() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = format_docx(temp.path(), &["recipes"]);
    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lists_dot_to_emdash"));
    assert!(stdout.contains("remove_all_tabs"));
}
