use std::process::Command;

#[test]
fn help_exits_successfully() {
    // Arrange
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_adfence"));
    cmd.arg("--help");

    // Act
    let output = cmd.output().expect("failed to execute adfence");

    // Assert
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("KakaoTalk"));
    for command in ["run", "dump", "init", "status", "autostart"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn version_exits_successfully() {
    // Arrange
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_adfence"));
    cmd.arg("--version");

    // Act
    let output = cmd.output().expect("failed to execute adfence");

    // Assert
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("adfence"));
}

#[test]
fn dump_help_lists_its_options() {
    let output = Command::new(env!("CARGO_BIN_EXE_adfence"))
        .args(["dump", "--help"])
        .output()
        .expect("failed to execute adfence");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--out"));
    assert!(stdout.contains("--depth"));
}

#[test]
fn unknown_subcommand_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_adfence"))
        .arg("tile")
        .output()
        .expect("failed to execute adfence");

    assert!(!output.status.success());
}

#[cfg(not(windows))]
#[test]
fn run_is_rejected_off_windows() {
    // Act
    let output = Command::new(env!("CARGO_BIN_EXE_adfence"))
        .arg("run")
        .output()
        .expect("failed to execute adfence");

    // Assert
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("only supported on Windows"));
}
