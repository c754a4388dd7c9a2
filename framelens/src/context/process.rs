//! Child-process context
//!
//! Spawns a `framelens` binary with `--framelens-worker`, handing it fd 3
//! (commands) and fd 4 (messages). Only custom tasks registered with
//! `inventory` exist inside the child.

use super::{ContextError, ContextLauncher, ContextTransport};
use framelens_core::CustomTaskTable;
use std::path::PathBuf;

/// Hosts the worker loop in a child process
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    binary: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Launcher for `binary`, or the current executable when `None`.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self { binary }
    }
}

#[cfg(unix)]
mod unix {
    use super::*;
    use framelens_ipc::{IPC_FD_ENV, WORKER_FLAG};
    use std::os::unix::io::{FromRawFd, RawFd};
    use std::os::unix::process::CommandExt;
    use std::process::{Child, Command, Stdio};
    use std::time::Duration;
    use tracing::debug;

    /// Lowest descriptor a parent-side pipe end may occupy. The child's fixed
    /// slots 3 and 4 must never alias a descriptor closed in `pre_exec`.
    pub(super) const MIN_PIPE_FD: RawFd = 10;

    /// Create a pipe pair with close-on-exec set, returning (read_fd, write_fd).
    ///
    /// Both ends are moved to descriptors at or above [`MIN_PIPE_FD`].
    pub(super) fn create_pipe() -> Result<(RawFd, RawFd), std::io::Error> {
        let mut fds = [0 as RawFd; 2];
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error());
        }
        let read = match relocate(fds[0]) {
            Ok(fd) => fd,
            Err(e) => {
                close_fd(fds[1]);
                return Err(e);
            }
        };
        let write = match relocate(fds[1]) {
            Ok(fd) => fd,
            Err(e) => {
                close_fd(read);
                return Err(e);
            }
        };
        Ok((read, write))
    }

    /// Duplicate `fd` onto the lowest free close-on-exec slot at or above
    /// [`MIN_PIPE_FD`], closing the original.
    fn relocate(fd: RawFd) -> Result<RawFd, std::io::Error> {
        let moved = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, MIN_PIPE_FD) };
        let result = if moved == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(moved)
        };
        close_fd(fd);
        result
    }

    pub(super) fn close_fd(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
        let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if ret == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Reaps the child once the context is gone: SIGTERM, brief wait, then SIGKILL.
    pub(super) struct ChildGuard(Child);

    impl ChildGuard {
        fn is_alive(&mut self) -> bool {
            matches!(self.0.try_wait(), Ok(None))
        }
    }

    impl Drop for ChildGuard {
        fn drop(&mut self) {
            if self.is_alive() {
                let _ = send_sigterm(self.0.id());
                std::thread::sleep(Duration::from_millis(50));
                if self.is_alive() {
                    let _ = self.0.kill();
                }
            }
            let _ = self.0.wait();
        }
    }

    pub(super) fn spawn(binary: &std::path::Path) -> Result<ContextTransport, ContextError> {
        // Commands: dispatcher writes, worker reads fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // Messages: worker writes fd 4, dispatcher reads
        let (msg_read, msg_write) = match create_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(ContextError::Launch(e));
            }
        };

        let mut command = Command::new(binary);
        command
            .arg(WORKER_FLAG)
            .env(IPC_FD_ENV, "3,4")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        unsafe {
            command.pre_exec(move || {
                if cmd_read != 3 {
                    libc::dup2(cmd_read, 3);
                    libc::close(cmd_read);
                }
                let flags = libc::fcntl(3, libc::F_GETFD);
                libc::fcntl(3, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                if msg_write != 4 {
                    libc::dup2(msg_write, 4);
                    libc::close(msg_write);
                }
                let flags = libc::fcntl(4, libc::F_GETFD);
                libc::fcntl(4, libc::F_SETFD, flags & !libc::FD_CLOEXEC);

                libc::close(cmd_write);
                libc::close(msg_read);
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(ContextError::Launch(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);
        debug!("spawned context process {} from {}", child.id(), binary.display());

        let writer = unsafe { std::fs::File::from_raw_fd(cmd_write) };
        let reader = unsafe { std::fs::File::from_raw_fd(msg_read) };
        Ok(ContextTransport::new(reader, writer).with_guard(ChildGuard(child)))
    }
}

impl ContextLauncher for ProcessLauncher {
    #[cfg(unix)]
    fn launch(&self, _custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError> {
        let binary = match &self.binary {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        unix::spawn(&binary).map(Some)
    }

    #[cfg(not(unix))]
    fn launch(&self, _custom: &CustomTaskTable) -> Result<Option<ContextTransport>, ContextError> {
        Ok(None)
    }
}
