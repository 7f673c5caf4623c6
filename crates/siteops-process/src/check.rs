//! Process existence checking.

use siteops_common::Result;

/// Check if a process with the given PID exists and is running.
///
/// Performs a non-destructive probe using `kill(pid, 0)`, which delivers no
/// signal but reports whether the process exists. `EPERM` means the process
/// exists but belongs to another user, so it counts as alive.
pub fn process_exists(pid: u32) -> Result<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(std::io::Error::from_raw_os_error(e as i32).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_exists() {
        let current_pid = std::process::id();
        assert!(process_exists(current_pid).unwrap());
    }

    #[test]
    fn test_init_process_exists() {
        assert!(process_exists(1).unwrap());
    }
}
