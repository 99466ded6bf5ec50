//! The gdb subprocess and its output pumps.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::config::TargetConfig;
use crate::errors::{GdbCtlError, GdbCtlResult};
use crate::session::GdbLink;

/// How long a killed debugger gets to go away before we stop waiting.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 4096;

/// Which debugger stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

/// What the reader threads forward to the controller loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutput {
    Chunk(Channel, Vec<u8>),
    /// The channel reached end of file.
    Closed(Channel),
}

/// A running debugger with piped standard streams.
#[derive(Debug)]
pub struct GdbProcess {
    child: Child,
    stdin: ChildStdin,
    readers: Vec<JoinHandle<()>>,
    exited: bool,
}

impl GdbProcess {
    /// Launch `config.gdb_cmd` through the shell in the target's working directory.
    ///
    /// Output chunks are sent to `sink` from one thread per channel.
    pub fn spawn<T>(config: &TargetConfig, sink: Sender<T>) -> GdbCtlResult<Self>
    where
        T: From<ProcessOutput> + Send + 'static,
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("exec {}", config.gdb_cmd))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !config.work_dir.as_os_str().is_empty() {
            cmd.current_dir(&config.work_dir);
        }

        let spawn_error = |source: std::io::Error| GdbCtlError::Spawn {
            command: config.gdb_cmd.clone(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_error)?;
        info!("spawned `{}` as pid {}", config.gdb_cmd, child.id());

        let missing = |what: &str| std::io::Error::new(ErrorKind::BrokenPipe, what);
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"));
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"));
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"));
        let (stdin, stdout, stderr) = match (stdin, stdout, stderr) {
            (Ok(i), Ok(o), Ok(e)) => (i, o, e),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                let _ = child.kill();
                return Err(spawn_error(e));
            }
        };

        let readers = vec![
            pump(stdout, Channel::Stdout, sink.clone()),
            pump(stderr, Channel::Stderr, sink),
        ];

        Ok(Self {
            child,
            stdin,
            readers,
            exited: false,
        })
    }

    /// Access the underlying PID for signals and logging.
    pub fn pid(&self) -> Pid {
        Pid::from_raw(self.child.id() as i32)
    }

    /// Poll for exit until `timeout` passes.
    pub fn wait_timeout(&mut self, timeout: Duration) -> GdbCtlResult<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.exited = true;
                self.join_readers();
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Hard stop: kill the debugger and wait a bounded time for it.
    pub fn terminate(&mut self, timeout: Duration) -> GdbCtlResult<Option<ExitStatus>> {
        if self.exited {
            return Ok(None);
        }
        match self.child.kill() {
            Ok(()) => {}
            // Already reaped.
            Err(e) if e.kind() == ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        let status = self.wait_timeout(timeout)?;
        if status.is_none() {
            warn!("debugger pid {} did not exit within {timeout:?}", self.pid());
        }
        Ok(status)
    }

    // A grandchild may still hold a pipe open; unfinished readers are detached.
    fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            if reader.is_finished() && reader.join().is_err() {
                warn!("output reader thread panicked");
            }
        }
    }
}

impl GdbLink for GdbProcess {
    fn send_line(&mut self, line: &str) -> GdbCtlResult<()> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }

    fn interrupt(&mut self) -> GdbCtlResult<()> {
        debug!("sending SIGINT to {}", self.pid());
        signal::kill(self.pid(), Signal::SIGINT)?;
        Ok(())
    }
}

impl Drop for GdbProcess {
    fn drop(&mut self) {
        if let Err(e) = self.terminate(KILL_TIMEOUT) {
            warn!("failed to stop debugger: {e}");
        }
    }
}

fn pump<R, T>(mut reader: R, channel: Channel, sink: Sender<T>) -> JoinHandle<()>
where
    R: Read + Send + 'static,
    T: From<ProcessOutput> + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let chunk = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => buf[..n].to_vec(),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("reading debugger {channel:?} failed: {e}");
                    break;
                }
            };
            if sink.send(ProcessOutput::Chunk(channel, chunk).into()).is_err() {
                return;
            }
        }
        let _ = sink.send(ProcessOutput::Closed(channel).into());
    })
}
