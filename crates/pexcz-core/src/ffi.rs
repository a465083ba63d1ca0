//! C ABI boot entry points
//!
//! The bootstrap package injected into every `.czex` loads this library
//! with `ctypes` and calls `boot`. The application is unpacked below
//! `$PEXCZ_CACHE`, or `pexcz/` in the user cache directory. On success the call never returns. On
//! failure a diagnostic naming the interpreter and the archive goes to
//! stderr and [`BOOT_ERROR_CODE`] is returned.

use crate::boot::env::os_string_from_bytes;
use crate::boot::{cache_dir, BootRequest, BootSequencer, EnvSource, BOOT_ERROR_CODE};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;

unsafe fn path_arg(ptr: *const c_char) -> Option<PathBuf> {
    if ptr.is_null() {
        return None;
    }
    Some(PathBuf::from(os_string_from_bytes(
        CStr::from_ptr(ptr).to_bytes(),
    )))
}

fn run(request: Option<BootRequest>, env: &dyn EnvSource) -> c_int {
    let Some(request) = request else {
        eprintln!("pexcz: boot requires both a python executable and a pex file");
        return BOOT_ERROR_CODE;
    };
    let request = request.cache_dir(cache_dir(env, None));
    match BootSequencer::new().boot(&request, env) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!(
                "pexcz: failed to boot {} with {}: {}",
                request.archive.display(),
                request.interpreter.display(),
                e
            );
            BOOT_ERROR_CODE
        }
    }
}

/// Boot `pex_file` with `python_exe`, passing `argv` through unchanged and
/// handing the interpreter the environment in `envp`.
///
/// # Safety
///
/// `python_exe` and `pex_file` must be null or valid C strings. `argv`
/// and `envp` must be null or null-terminated arrays of valid C strings.
#[cfg(unix)]
#[no_mangle]
pub unsafe extern "C" fn boot(
    python_exe: *const c_char,
    pex_file: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> c_int {
    use crate::boot::env::{c_str_array, RawEnv};

    let env = RawEnv::from_ptr(envp);
    let argv: Vec<_> = c_str_array(argv)
        .iter()
        .map(|arg| os_string_from_bytes(arg))
        .collect();
    let request = match (path_arg(python_exe), path_arg(pex_file)) {
        (Some(python), Some(pex)) if !argv.is_empty() => {
            Some(BootRequest::new(pex, python).argv(argv))
        }
        (Some(python), Some(pex)) => Some(BootRequest::new(pex, python)),
        _ => None,
    };
    run(request, &env)
}

/// Boot `pex_file` with `python_exe` using the host environment.
///
/// The host command line is expected to be `python <pex_file> args...`;
/// everything after the archive is passed on.
///
/// # Safety
///
/// `python_exe` and `pex_file` must be null or valid C strings.
#[cfg(windows)]
#[no_mangle]
pub unsafe extern "C" fn boot(python_exe: *const c_char, pex_file: *const c_char) -> c_int {
    use crate::boot::HostEnv;

    let request = match (path_arg(python_exe), path_arg(pex_file)) {
        (Some(python), Some(pex)) => {
            Some(BootRequest::new(pex, python).args(std::env::args_os().skip(2)))
        }
        _ => None,
    };
    run(request, &HostEnv)
}
