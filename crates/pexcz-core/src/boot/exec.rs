//! Process replacement

use super::ExecPlan;
use std::convert::Infallible;
use std::io;
use std::process::Command;

/// Hands the current process over to the planned command.
///
/// Success never returns; the only value an implementation can produce is
/// the error explaining why the hand-over did not happen.
pub trait ProcessReplacer {
    fn replace(&self, plan: &ExecPlan) -> io::Result<Infallible>;
}

impl<T: ProcessReplacer + ?Sized> ProcessReplacer for &T {
    fn replace(&self, plan: &ExecPlan) -> io::Result<Infallible> {
        (**self).replace(plan)
    }
}

/// `execve` on Unix; spawn, wait and exit with the child's status on Windows
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformReplacer;

fn command(plan: &ExecPlan) -> Command {
    let mut command = Command::new(&plan.program);
    command.args(plan.argv.iter().skip(1));
    command.env_clear();
    command.envs(plan.env.iter().map(|(name, value)| (name, value)));
    command
}

#[cfg(unix)]
impl ProcessReplacer for PlatformReplacer {
    fn replace(&self, plan: &ExecPlan) -> io::Result<Infallible> {
        use std::os::unix::process::CommandExt;

        let mut command = command(plan);
        if let Some(arg0) = plan.argv.first() {
            command.arg0(arg0);
        }
        Err(command.exec())
    }
}

#[cfg(windows)]
impl ProcessReplacer for PlatformReplacer {
    fn replace(&self, plan: &ExecPlan) -> io::Result<Infallible> {
        let status = command(plan).status()?;
        std::process::exit(status.code().unwrap_or(1))
    }
}

#[cfg(not(any(unix, windows)))]
impl ProcessReplacer for PlatformReplacer {
    fn replace(&self, _plan: &ExecPlan) -> io::Result<Infallible> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process replacement is not supported on this platform",
        ))
    }
}
