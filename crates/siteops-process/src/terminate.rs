//! Process termination primitives.

use siteops_common::Result;

fn signal_process(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        // Already gone; termination is idempotent.
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32).into()),
    }
}

/// Ask a process to terminate gracefully (SIGTERM).
pub fn terminate_gracefully(pid: u32) -> Result<()> {
    signal_process(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Force kill a process (SIGKILL). Used only after the graceful window has
/// elapsed and the child is still alive.
pub fn force_kill(pid: u32) -> Result<()> {
    signal_process(pid, nix::sys::signal::Signal::SIGKILL)
}
