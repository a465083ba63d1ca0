//! Runs injected archives under a real Python interpreter.
//!
//! Every test here is skipped when no `python3` is on `PATH`; the full boot
//! is also skipped when the launcher library was not built next to the
//! `pexcz` binary.

use assert_cmd::Command;
use pexcz_core::boot::cache::unpack;
use pexcz_core::inject::resources::{find_native_library, native_library_name, platform_id};
use pexcz_core::BootTarget;
use pexcz_testing::fixtures::{pex_info, PexBuilder, SHEBANG};
use pexcz_testing::TestDir;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

const GREET: &[u8] = b"import sys\n\ndef main():\n    print('greet ' + ' '.join(sys.argv[1:]))\n";

fn python() -> Option<PathBuf> {
    match which::which("python3") {
        Ok(python) => Some(python),
        Err(_) => {
            eprintln!("python3 not found on PATH, skipping");
            None
        }
    }
}

fn pexcz(test_dir: &TestDir) -> Command {
    let mut cmd = Command::cargo_bin("pexcz").unwrap();
    cmd.env("PEXCZ_CONFIG", test_dir.path().join("config.toml"))
        .env("PEXCZ_CACHE", test_dir.path().join("cache"))
        .env_remove("PEX_VERBOSE");
    cmd
}

/// Inject a PEX whose entry point prints its arguments
fn greet_czex(test_dir: &TestDir) -> PathBuf {
    let pex = test_dir
        .write_pex(
            "greet.pex",
            &PexBuilder::new()
                .prefix(SHEBANG)
                .file("__main__.py", b"raise SystemExit('pex bootstrap ran')\n")
                .file("PEX-INFO", &pex_info("greet:main"))
                .file("greet.py", GREET),
        )
        .unwrap();
    pexcz(test_dir).arg("inject").arg(&pex).assert().success();
    test_dir.path().join("greet.czex")
}

fn run_python(python: &Path, test_dir: &TestDir) -> Command {
    let mut cmd = Command::new(python);
    cmd.current_dir(test_dir.path())
        .env("PEXCZ_CACHE", test_dir.path().join("cache"))
        .env_remove("PEX")
        .env_remove("PEXCZ_APP_ROOT")
        .env_remove("PYTHONPATH");
    cmd
}

#[test]
fn test_booted_interpreter_runs_entry_point() {
    let Some(python) = python() else { return };
    let test_dir = TestDir::new().unwrap();
    let czex = greet_czex(&test_dir);

    let target = BootTarget::load(&czex).unwrap();
    let app_root = unpack(&czex, &target, &test_dir.path().join("cache")).unwrap();

    run_python(&python, &test_dir)
        .arg(&czex)
        .arg("hello")
        .env("PEX", &czex)
        .env("PEXCZ_APP_ROOT", &app_root)
        .assert()
        .success()
        .stdout(predicate::str::contains("greet hello"));
}

#[test]
fn test_bootstrap_prefers_platform_library() {
    let Some(python) = python() else { return };
    let test_dir = TestDir::new().unwrap();
    let platform_lib = format!("{}/{}", platform_id(), native_library_name());
    let generic_lib = format!("native/{}", native_library_name());
    let lib_dir = test_dir
        .native_lib_dir(&[platform_lib.as_str(), generic_lib.as_str()])
        .unwrap();
    std::fs::write(
        test_dir.path().join("config.toml"),
        format!("[inject]\nnative_lib_dir = {:?}\n", lib_dir.to_string_lossy()),
    )
    .unwrap();
    let czex = greet_czex(&test_dir);

    let script = "import os, sys\n\
                  sys.path.insert(0, os.path.join(sys.argv[1], '__pexcz__'))\n\
                  import pexcz\n\
                  print(pexcz.find_library(sys.argv[1]))\n";
    run_python(&python, &test_dir)
        .arg("-c")
        .arg(script)
        .arg(&czex)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "__pexcz__/pexcz/.lib/{platform_lib}"
        )));
}

#[test]
fn test_bootstrap_falls_back_to_generic_library() {
    let Some(python) = python() else { return };
    let test_dir = TestDir::new().unwrap();
    let generic_lib = format!("native/{}", native_library_name());
    let lib_dir = test_dir.native_lib_dir(&[generic_lib.as_str()]).unwrap();
    std::fs::write(
        test_dir.path().join("config.toml"),
        format!("[inject]\nnative_lib_dir = {:?}\n", lib_dir.to_string_lossy()),
    )
    .unwrap();
    let czex = greet_czex(&test_dir);

    let script = "import os, sys\n\
                  sys.path.insert(0, os.path.join(sys.argv[1], '__pexcz__'))\n\
                  import pexcz\n\
                  print(pexcz.find_library(sys.argv[1]))\n";
    run_python(&python, &test_dir)
        .arg("-c")
        .arg(script)
        .arg(&czex)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "__pexcz__/pexcz/.lib/{generic_lib}"
        )));
}

#[test]
fn test_python_boots_injected_archive() {
    let Some(python) = python() else { return };
    let bin = assert_cmd::cargo::cargo_bin("pexcz");
    if bin.parent().and_then(find_native_library).is_none() {
        eprintln!("{} not built beside {:?}, skipping", native_library_name(), bin);
        return;
    }

    let test_dir = TestDir::new().unwrap();
    let czex = greet_czex(&test_dir);

    run_python(&python, &test_dir)
        .arg("greet.czex")
        .arg("hello")
        .arg("world")
        .assert()
        .success()
        .stdout(predicate::str::contains("greet hello world"));
    assert!(czex.is_file());
    assert!(test_dir.path().join("cache/apps/0123456789abcdef/greet.py").is_file());
}
