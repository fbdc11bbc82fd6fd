use std::error::Error;
use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn cli(workspace: &Path) -> Result<Command, Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("filepane")?;
    cmd.env_remove("FILEPANE_LOG")
        .arg("--workspace")
        .arg(workspace);
    Ok(cmd)
}

fn sample_project(root: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(root.join("src"))?;
    fs::write(root.join("src").join("main.py"), "print('hi')\n")?;
    fs::write(root.join("b.txt"), "b")?;
    fs::write(root.join("A.txt"), "a")?;
    Ok(())
}

#[test]
fn tree_requires_a_root() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    cli(workspace.path())?
        .arg("tree")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no root folder selected"));
    Ok(())
}

#[test]
fn tree_lists_folders_first_and_remembers_expansion() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    sample_project(project.path())?;

    cli(workspace.path())?
        .args(["roots", "add"])
        .arg(project.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Active root:"));

    cli(workspace.path())?
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("+ src\n  A.txt\n  b.txt\n"));

    cli(workspace.path())?
        .arg("expand")
        .arg(project.path().join("src"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Expanded src"));

    // expansion survives into the next invocation through the saved state
    cli(workspace.path())?
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("- src\n    main.py\n  A.txt\n"));

    cli(workspace.path())?
        .arg("toggle")
        .arg(project.path().join("src"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Collapsed src"));

    cli(workspace.path())?
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("main.py").not());

    assert!(workspace.path().join(".filepane").join("state.json").exists());
    Ok(())
}

#[test]
fn tree_search_matches_case_insensitively() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    sample_project(project.path())?;

    cli(workspace.path())?
        .args(["roots", "add"])
        .arg(project.path())
        .assert()
        .success();

    cli(workspace.path())?
        .args(["tree", "--search", "MAIN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("main.py"))
        .stdout(predicate::str::contains("A.txt").not());
    Ok(())
}

#[test]
fn children_marks_folders_with_subfolders() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    fs::create_dir_all(project.path().join("outer").join("inner"))?;
    fs::create_dir_all(project.path().join("leaf"))?;
    fs::write(project.path().join("file.txt"), "")?;

    cli(workspace.path())?
        .arg("children")
        .arg(project.path())
        .assert()
        .success()
        .stdout("  leaf\n+ outer\n");
    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinked_folders_expand_in_place() -> Result<(), Box<dyn Error>> {
    use std::os::unix::fs::symlink;

    let workspace = tempdir()?;
    let project = tempdir()?;
    let shared = tempdir()?;
    fs::write(shared.path().join("child.txt"), "")?;
    symlink(shared.path(), project.path().join("linked"))?;

    cli(workspace.path())?
        .args(["roots", "add"])
        .arg(project.path())
        .assert()
        .success();

    cli(workspace.path())?
        .arg("expand")
        .arg(project.path().join("linked"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Expanded linked"));

    cli(workspace.path())?
        .arg("tree")
        .assert()
        .success()
        .stdout(predicate::str::contains("- linked\n    child.txt\n"));
    Ok(())
}
