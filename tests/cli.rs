use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn rsd() -> Command {
    let mut cmd = Command::cargo_bin("rsd").expect("Binary exists");
    cmd.env_remove("RSD_ENVIRONMENT")
        .env_remove("RSD_API_ENDPOINT")
        .env_remove("RSD_API_TOKEN")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_lists_all_commands() {
    rsd()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("build"))
                .and(predicate::str::contains("deploy")),
        );
}

#[test]
fn init_scaffolds_default_configuration() {
    let project = tempdir().unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let manifest = fs::read_to_string(project.path().join("package.json")).unwrap();
    assert!(manifest.contains("remote-scripting-development"));
    assert!(project.path().join("tsconfig.json").is_file());
    assert!(project.path().join("src/hello.ts").is_file());
}

#[test]
fn build_without_pattern_fails() {
    let project = tempdir().unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sourceRootsPattern"));
}

#[cfg(unix)]
#[test]
fn build_runs_configured_compiler() {
    let project = tempdir().unwrap();
    fs::create_dir_all(project.path().join("scripts")).unwrap();
    fs::write(project.path().join("scripts/widget.ts"), "widget();\n").unwrap();
    fs::write(
        project.path().join("package.json"),
        r#"{"remote-scripting-development":{"sourceRootsPattern":"scripts/*.ts","compiler":["cat"]}}"#,
    )
    .unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("File widget.js saved"));

    assert_eq!(
        fs::read_to_string(project.path().join("dest/widget.js")).unwrap(),
        "widget();\n"
    );
}

#[cfg(unix)]
#[test]
fn build_exits_non_zero_when_a_file_fails() {
    let project = tempdir().unwrap();
    fs::create_dir_all(project.path().join("scripts")).unwrap();
    fs::write(project.path().join("scripts/ok.ts"), "ok").unwrap();
    fs::write(
        project.path().join("package.json"),
        r#"{"remote-scripting-development":{"sourceRootsPattern":"scripts/*.ts","compiler":["false"]}}"#,
    )
    .unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to build"));
}

#[test]
fn deploy_without_endpoint_fails() {
    let project = tempdir().unwrap();
    fs::create_dir_all(project.path().join("dest")).unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("RSD_API_ENDPOINT"));
}

#[test]
fn deploy_reads_project_dotenv() {
    let project = tempdir().unwrap();
    fs::write(
        project.path().join(".env"),
        "RSD_API_ENDPOINT=ftp://example.com/upload\nRSD_API_TOKEN=t\n",
    )
    .unwrap();

    rsd()
        .arg("-C")
        .arg(project.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported endpoint scheme"));
}
