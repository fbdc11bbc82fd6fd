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

fn add_root(workspace: &Path, root: &Path) -> Result<(), Box<dyn Error>> {
    cli(workspace)?
        .args(["roots", "add"])
        .arg(root)
        .assert()
        .success();
    Ok(())
}

#[test]
fn new_file_uses_templates() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    let templates = tempdir()?;
    fs::write(templates.path().join("operator.py"), "import bpy\n")?;
    add_root(workspace.path(), project.path())?;

    cli(workspace.path())?
        .args(["prefs", "set", "browser.template_dir"])
        .arg(templates.path())
        .assert()
        .success();

    cli(workspace.path())?
        .arg("templates")
        .assert()
        .success()
        .stdout(predicate::str::contains("BLANK\tBlank"))
        .stdout(predicate::str::contains("operator.py\toperator"));

    cli(workspace.path())?
        .arg("new-file")
        .arg(project.path())
        .args(["--template", "operator.py"])
        .assert()
        .success()
        .stdout("Created operator.py\n");
    assert_eq!(
        fs::read_to_string(project.path().join("operator.py"))?,
        "import bpy\n"
    );

    cli(workspace.path())?
        .arg("new-file")
        .arg(project.path())
        .assert()
        .success()
        .stdout("Created new_file.py\n");
    assert_eq!(
        fs::read_to_string(project.path().join("new_file.py"))?,
        "# New Python file\n"
    );

    cli(workspace.path())?
        .arg("new-file")
        .arg(project.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    Ok(())
}

#[test]
fn new_folder_rejects_path_separators() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;

    cli(workspace.path())?
        .arg("new-folder")
        .arg(project.path())
        .arg("scripts")
        .assert()
        .success()
        .stdout("Created folder: scripts\n");
    assert!(project.path().join("scripts").is_dir());

    cli(workspace.path())?
        .arg("new-folder")
        .arg(project.path())
        .arg("a/b")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid name"));
    Ok(())
}

#[test]
fn duplicate_and_rename() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    fs::write(project.path().join("a.txt"), "alpha")?;
    fs::write(project.path().join("b.txt"), "beta")?;
    add_root(workspace.path(), project.path())?;

    cli(workspace.path())?
        .arg("duplicate")
        .arg(project.path().join("a.txt"))
        .assert()
        .success()
        .stdout("Duplicated to: a_copy.txt\n");
    cli(workspace.path())?
        .arg("duplicate")
        .arg(project.path().join("a.txt"))
        .assert()
        .success()
        .stdout("Duplicated to: a_copy1.txt\n");
    assert_eq!(fs::read_to_string(project.path().join("a_copy1.txt"))?, "alpha");

    cli(workspace.path())?
        .arg("rename")
        .arg(project.path().join("a_copy.txt"))
        .arg("b.txt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(project.path().join("b.txt"))?, "beta");

    cli(workspace.path())?
        .arg("rename")
        .arg(project.path().join("a_copy.txt"))
        .arg("c.txt")
        .assert()
        .success()
        .stdout("Renamed to: c.txt\n");
    assert!(project.path().join("c.txt").exists());
    assert!(!project.path().join("a_copy.txt").exists());
    Ok(())
}

#[test]
fn move_targets_and_move() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    fs::create_dir_all(project.path().join("src"))?;
    fs::create_dir_all(project.path().join("docs"))?;
    fs::create_dir_all(project.path().join(".git"))?;
    fs::write(project.path().join("src").join("notes.md"), "n")?;
    add_root(workspace.path(), project.path())?;

    cli(workspace.path())?
        .arg("move-targets")
        .arg(project.path().join("src").join("notes.md"))
        .assert()
        .success()
        .stdout(".\ndocs\n");

    cli(workspace.path())?
        .arg("move")
        .arg(project.path().join("src").join("notes.md"))
        .arg(project.path().join("docs"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Moved to "));
    assert!(project.path().join("docs").join("notes.md").exists());

    cli(workspace.path())?
        .arg("move")
        .arg(project.path().join("docs"))
        .arg(project.path().join("docs"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot move"));
    Ok(())
}

#[test]
fn permanent_delete_needs_confirmation() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    let target = project.path().join("old.txt");
    fs::write(&target, "bye")?;

    cli(workspace.path())?
        .args(["delete", "--permanent"])
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    assert!(target.exists());

    cli(workspace.path())?
        .args(["delete", "--permanent", "--yes"])
        .arg(&target)
        .assert()
        .success()
        .stdout("Permanently deleted: old.txt\n");
    assert!(!target.exists());
    Ok(())
}

#[test]
fn permanent_delete_removes_nested_folders() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let project = tempdir()?;
    let folder = project.path().join("build");
    fs::create_dir_all(folder.join("out"))?;
    fs::write(folder.join("out").join("x.bin"), [0u8; 4])?;
    fs::write(project.path().join("keep.py"), "")?;

    cli(workspace.path())?
        .args(["delete", "--permanent", "--yes"])
        .arg(&folder)
        .assert()
        .success()
        .stdout("Permanently deleted: build\n");
    assert!(!folder.exists());
    assert!(project.path().join("keep.py").exists());
    Ok(())
}

#[test]
fn deleting_the_active_root_succeeds_and_unregisters_it() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let parent = tempdir()?;
    let project = parent.path().join("proj");
    fs::create_dir_all(project.join("src"))?;
    add_root(workspace.path(), &project)?;

    cli(workspace.path())?
        .args(["delete", "--permanent", "--yes"])
        .arg(&project)
        .assert()
        .success()
        .stdout("Permanently deleted: proj\n");
    assert!(!project.exists());

    cli(workspace.path())?
        .args(["roots", "list"])
        .assert()
        .success()
        .stdout("");
    Ok(())
}

#[cfg(unix)]
#[test]
fn actions_on_a_symlink_affect_the_link_only() -> Result<(), Box<dyn Error>> {
    use std::os::unix::fs::symlink;

    let workspace = tempdir()?;
    let project = tempdir()?;
    let real = project.path().join("real.txt");
    let link = project.path().join("link.txt");
    fs::write(&real, "data")?;
    symlink(&real, &link)?;
    add_root(workspace.path(), project.path())?;

    cli(workspace.path())?
        .arg("rename")
        .arg(&link)
        .arg("alias.txt")
        .assert()
        .success()
        .stdout("Renamed to: alias.txt\n");
    let alias = project.path().join("alias.txt");
    assert!(fs::symlink_metadata(&alias)?.file_type().is_symlink());
    assert!(real.is_file());

    cli(workspace.path())?
        .args(["delete", "--permanent", "--yes"])
        .arg(&alias)
        .assert()
        .success()
        .stdout("Permanently deleted: alias.txt\n");
    assert!(fs::symlink_metadata(&alias).is_err());
    assert_eq!(fs::read_to_string(&real)?, "data");
    Ok(())
}
