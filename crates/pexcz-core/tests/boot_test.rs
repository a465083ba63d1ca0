use pexcz_core::boot::{
    EnvSource, ExecPlan, InterpreterResolver, PathResolver, ProcessReplacer, RawEnv,
};
use pexcz_core::{inject, BootRequest, BootSequencer, BootTarget, Config, Error, NoProgress};
use pexcz_testing::fixtures::{pex_info, sample_pex, PexBuilder};
use std::cell::RefCell;
use std::convert::Infallible;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Records the plan instead of replacing the process
#[derive(Default)]
struct RecordingReplacer {
    plans: RefCell<Vec<ExecPlan>>,
}

impl ProcessReplacer for RecordingReplacer {
    fn replace(&self, plan: &ExecPlan) -> io::Result<Infallible> {
        self.plans.borrow_mut().push(plan.clone());
        Err(io::Error::new(io::ErrorKind::Other, "replacement recorded"))
    }
}

/// Resolves every interpreter to a fixed path
struct FixedResolver(PathBuf);

impl InterpreterResolver for FixedResolver {
    fn resolve(&self, _interpreter: &Path, _env: &dyn EnvSource) -> io::Result<PathBuf> {
        Ok(self.0.clone())
    }
}

fn env_value(plan: &ExecPlan, name: &str) -> Option<OsString> {
    plan.env
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

fn czex(temp_dir: &TempDir, info: &[u8]) -> PathBuf {
    PexBuilder::new()
        .file("PEX-INFO", info)
        .file("app/__init__.py", b"")
        .write_to(temp_dir.path().join("app.czex"))
        .unwrap()
}

#[test]
fn test_nonexistent_interpreter() {
    let temp_dir = TempDir::new().unwrap();
    let archive = czex(&temp_dir, &pex_info("app:main"));
    let replacer = RecordingReplacer::default();
    let sequencer = BootSequencer::with_parts(PathResolver, &replacer);

    let request = BootRequest::new(&archive, temp_dir.path().join("no-such-python"));
    let err = match sequencer.boot(&request, &RawEnv::default()) {
        Err(err) => err,
        Ok(never) => match never {},
    };

    match &err {
        Error::InterpreterResolutionFailed {
            interpreter,
            archive: failed_archive,
            ..
        } => {
            assert_eq!(interpreter, &temp_dir.path().join("no-such-python"));
            assert_eq!(failed_archive, &archive);
        }
        other => panic!("expected InterpreterResolutionFailed, got {:?}", other),
    }
    assert!(err.is_boot_failure());
    assert!(replacer.plans.borrow().is_empty());
}

#[test]
fn test_exec_failure_names_interpreter_and_archive() {
    let temp_dir = TempDir::new().unwrap();
    let archive = czex(&temp_dir, &pex_info("app:main"));
    let replacer = RecordingReplacer::default();
    let sequencer =
        BootSequencer::with_parts(FixedResolver(PathBuf::from("/opt/python")), &replacer);

    let err = match sequencer.boot(&BootRequest::new(&archive, "python"), &RawEnv::default()) {
        Err(err) => err,
        Ok(never) => match never {},
    };

    assert!(matches!(err, Error::ExecFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("/opt/python"), "{message}");
    assert!(message.contains("app.czex"), "{message}");
    assert_eq!(replacer.plans.borrow().len(), 1);
}

#[test]
fn test_composed_argv_and_env() {
    let temp_dir = TempDir::new().unwrap();
    let archive = czex(
        &temp_dir,
        br#"{"entry_point": "app:main", "inject_python_args": ["-sE"], "inject_args": ["--flag"], "inject_env": {"MODE": "injected", "LANG": "C"}}"#,
    );
    let sequencer = BootSequencer::with_parts(
        FixedResolver(PathBuf::from("/usr/bin/python3")),
        RecordingReplacer::default(),
    );
    let env = RawEnv::from_entries(["LANG=en_US.UTF-8", "PEX=/somewhere/else.pex"]);

    let request = BootRequest::new(&archive, "python3")
        .python_args(["-u"])
        .args(["serve", "--port", "8080"]);
    let plan = sequencer.plan(&request, &env).unwrap();

    let absolute = std::path::absolute(&archive).unwrap();
    assert_eq!(plan.program, PathBuf::from("/usr/bin/python3"));
    assert_eq!(
        plan.argv,
        vec![
            OsString::from("/usr/bin/python3"),
            "-sE".into(),
            "-u".into(),
            absolute.clone().into_os_string(),
            "--flag".into(),
            "serve".into(),
            "--port".into(),
            "8080".into(),
        ]
    );
    assert_eq!(env_value(&plan, "LANG"), Some("en_US.UTF-8".into()));
    assert_eq!(env_value(&plan, "MODE"), Some("injected".into()));
    assert_eq!(env_value(&plan, "PEX"), Some(absolute.into_os_string()));
}

#[test]
fn test_explicit_argv_passes_through() {
    let temp_dir = TempDir::new().unwrap();
    let archive = czex(
        &temp_dir,
        br#"{"entry_point": "app:main", "inject_args": ["--ignored"]}"#,
    );
    let sequencer = BootSequencer::with_parts(
        FixedResolver(PathBuf::from("/usr/bin/python3")),
        RecordingReplacer::default(),
    );

    let request = BootRequest::new(&archive, "python3").argv(["app.czex", "--verbose"]);
    let plan = sequencer.plan(&request, &RawEnv::default()).unwrap();
    assert_eq!(plan.argv, vec!["app.czex", "--verbose"]);
}

#[test]
fn test_missing_manifest() {
    let temp_dir = TempDir::new().unwrap();
    let archive = PexBuilder::new()
        .file("app/__init__.py", b"")
        .write_to(temp_dir.path().join("app.czex"))
        .unwrap();
    let sequencer = BootSequencer::with_parts(
        FixedResolver(PathBuf::from("/usr/bin/python3")),
        RecordingReplacer::default(),
    );

    let result = sequencer.plan(&BootRequest::new(&archive, "python3"), &RawEnv::default());
    assert!(matches!(result, Err(Error::ManifestInvalid { .. })));
}

#[test]
fn test_missing_archive() {
    let temp_dir = TempDir::new().unwrap();
    let sequencer = BootSequencer::with_parts(
        FixedResolver(PathBuf::from("/usr/bin/python3")),
        RecordingReplacer::default(),
    );
    let request = BootRequest::new(temp_dir.path().join("missing.czex"), "python3");
    let err = sequencer.plan(&request, &RawEnv::default()).unwrap_err();
    assert!(err.is_boot_failure());
}

#[test]
fn test_boot_target_survives_inject() {
    let temp_dir = TempDir::new().unwrap();
    let pex = sample_pex()
        .write_to(temp_dir.path().join("app.pex"))
        .unwrap();
    let report = inject(&pex, &Config::default(), &mut NoProgress).unwrap();

    let source = BootTarget::from_json(&pex, &pex_info("app.main:run")).unwrap();
    assert_eq!(BootTarget::load(&report.path).unwrap(), source);
}

#[test]
fn test_plan_unpacks_into_cache() {
    let temp_dir = TempDir::new().unwrap();
    let pex = sample_pex()
        .write_to(temp_dir.path().join("app.pex"))
        .unwrap();
    let report = inject(&pex, &Config::default(), &mut NoProgress).unwrap();
    let cache = temp_dir.path().join("cache");
    let sequencer = BootSequencer::with_parts(
        FixedResolver(PathBuf::from("/usr/bin/python3")),
        RecordingReplacer::default(),
    );

    let request = BootRequest::new(&report.path, "python3").cache_dir(Some(cache.clone()));
    let plan = sequencer.plan(&request, &RawEnv::default()).unwrap();

    let app_root = PathBuf::from(env_value(&plan, "PEXCZ_APP_ROOT").unwrap());
    assert_eq!(app_root, cache.join("apps").join("0123456789abcdef"));
    assert_eq!(
        fs::read(app_root.join("app/main.py")).unwrap(),
        b"def run():\n    print('hello')\n"
    );
    assert!(!app_root.join("__main__.py").exists());
    assert!(!app_root.join("__pexcz__").exists());
}

#[test]
fn test_unusable_cache_is_a_boot_failure() {
    let temp_dir = TempDir::new().unwrap();
    let archive = czex(&temp_dir, &pex_info("app:main"));
    let blocker = temp_dir.path().join("cache");
    fs::write(&blocker, b"not a directory").unwrap();
    let replacer = RecordingReplacer::default();
    let sequencer =
        BootSequencer::with_parts(FixedResolver(PathBuf::from("/usr/bin/python3")), &replacer);

    let request = BootRequest::new(&archive, "python3").cache_dir(Some(blocker));
    let err = match sequencer.boot(&request, &RawEnv::default()) {
        Err(err) => err,
        Ok(never) => match never {},
    };

    assert!(matches!(err, Error::UnpackFailed { .. }), "{err:?}");
    assert!(err.is_boot_failure());
    assert!(replacer.plans.borrow().is_empty());
}
