//! External command execution with timeouts and per-invocation logs
//!
//! Every git, build and benchmark invocation goes through a [`CommandRunner`].
//! The runner never fails: spawn errors, timeouts and non-zero exits all come
//! back as a [`CommandStatus`] on the [`CommandOutput`].

use chrono::Local;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Identifies the per-invocation log file: `<revision>_<stage>_<timestamp>.log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLabel {
    pub revision: String,
    pub stage: String,
}

/// A command line to run
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
    pub label: Option<LogLabel>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            timeout: Duration::from_secs(3600),
            label: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn label(mut self, revision: impl Into<String>, stage: impl Into<String>) -> Self {
        self.label = Some(LogLabel {
            revision: revision.into(),
            stage: stage.into(),
        });
        self
    }

    /// Shell-like rendering for logs and diagnostics
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How an invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Completed,
    NonZeroExit(i32),
    /// Killed by a signal before reporting an exit code
    Terminated,
    TimedOut,
    NotFound,
    SpawnFailed(String),
}

impl CommandStatus {
    /// Short reason used in stage failures and summaries
    pub fn reason(&self) -> String {
        match self {
            CommandStatus::Completed => "ok".to_string(),
            CommandStatus::NonZeroExit(code) => format!("nonzero-exit (code {code})"),
            CommandStatus::Terminated => "terminated".to_string(),
            CommandStatus::TimedOut => "timeout".to_string(),
            CommandStatus::NotFound => "not-found".to_string(),
            CommandStatus::SpawnFailed(msg) => format!("spawn-error ({msg})"),
        }
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    pub log_path: Option<PathBuf>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == CommandStatus::Completed
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            CommandStatus::Completed => Some(0),
            CommandStatus::NonZeroExit(code) => Some(code),
            _ => None,
        }
    }

    /// Standard output followed by standard error
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    /// Failure reason, pointing at the invocation log when there is one
    pub fn failure_reason(&self) -> String {
        match &self.log_path {
            Some(path) => format!("{} (see {})", self.status.reason(), path.display()),
            None => self.status.reason(),
        }
    }
}

/// Capability to run an external command
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> CommandOutput;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, invocation: &Invocation) -> CommandOutput {
        (**self).run(invocation)
    }
}

/// Runs commands as child processes
///
/// When a log directory is set, every labelled invocation leaves a log file
/// with its command line, exit status and captured output.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    log_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> CommandOutput {
        debug!(
            command = %invocation.command_line(),
            cwd = %invocation.cwd.display(),
            "Running command"
        );
        let started = Instant::now();
        let (status, stdout, stderr) = execute(invocation);
        let mut output = CommandOutput {
            status,
            stdout,
            stderr,
            elapsed: started.elapsed(),
            log_path: None,
        };

        if output.success() {
            debug!(elapsed_ms = output.elapsed.as_millis() as u64, "Command completed");
        } else {
            warn!(
                command = %invocation.command_line(),
                status = %output.status.reason(),
                "Command failed"
            );
        }

        if let (Some(dir), Some(label)) = (&self.log_dir, &invocation.label) {
            match write_invocation_log(dir, label, invocation, &output) {
                Ok(path) => output.log_path = Some(path),
                Err(e) => warn!("Failed to write log for {}: {}", invocation.command_line(), e),
            }
        }

        output
    }
}

fn execute(invocation: &Invocation) -> (CommandStatus, String, String) {
    if !invocation.cwd.is_dir() {
        let msg = format!(
            "working directory {} does not exist",
            invocation.cwd.display()
        );
        return (CommandStatus::SpawnFailed(msg), String::new(), String::new());
    }

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so a timeout can take down compiler jobs and other
    // grandchildren along with the child
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let spawned = command.spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return (CommandStatus::NotFound, String::new(), String::new());
        }
        Err(e) => return (CommandStatus::SpawnFailed(e.to_string()), String::new(), String::new()),
    };

    let stdout = child.stdout.take().map(PipeCapture::spawn);
    let stderr = child.stderr.take().map(PipeCapture::spawn);

    let status = wait_with_deadline(&mut child, invocation.timeout);

    // After a timeout the pipes close only once the whole group is gone,
    // which is guaranteed on unix alone
    let join = cfg!(unix) || status != CommandStatus::TimedOut;
    let stdout = stdout.map(|c| c.finish(join)).unwrap_or_default();
    let stderr = stderr.map(|c| c.finish(join)).unwrap_or_default();

    (status, stdout, stderr)
}

fn wait_with_deadline(child: &mut Child, timeout: Duration) -> CommandStatus {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(exit)) => return exit_status(exit),
            Ok(None) if Instant::now() >= deadline => {
                kill_tree(child);
                if let Err(e) = child.wait() {
                    warn!("Failed to reap timed out process {}: {}", child.id(), e);
                }
                return CommandStatus::TimedOut;
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill_tree(child);
                return CommandStatus::SpawnFailed(e.to_string());
            }
        }
    }
}

/// Kill the child and every process in its group
#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // the child is its group's leader, so its pid is the group id
    if let Err(e) = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        warn!("Failed to kill process group {}: {}", child.id(), e);
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill process {}: {}", child.id(), e);
    }
}

fn exit_status(exit: ExitStatus) -> CommandStatus {
    if exit.success() {
        CommandStatus::Completed
    } else {
        match exit.code() {
            Some(code) => CommandStatus::NonZeroExit(code),
            None => CommandStatus::Terminated,
        }
    }
}

/// Drains one child pipe on a background thread
struct PipeCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if let Ok(mut buf) = sink.lock() {
                            buf.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            }
        });
        Self { buffer, handle }
    }

    fn finish(self, join: bool) -> String {
        if join && self.handle.join().is_err() {
            warn!("Output reader thread panicked; captured output may be incomplete");
        }
        let bytes = self
            .buffer
            .lock()
            .map(|buf| buf.to_vec())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Replace characters that do not belong in a file name
fn file_component(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn write_invocation_log(
    dir: &Path,
    label: &LogLabel,
    invocation: &Invocation,
    output: &CommandOutput,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let now = Local::now();
    let path = dir.join(format!(
        "{}_{}_{}.log",
        file_component(&label.revision),
        file_component(&label.stage),
        now.format("%Y%m%d_%H%M%S_%3f")
    ));

    let mut file = File::create(&path)?;
    writeln!(file, "Phase: {}", label.stage)?;
    writeln!(file, "Commit: {}", label.revision)?;
    writeln!(file, "Command: {}", invocation.command_line())?;
    writeln!(file, "Directory: {}", invocation.cwd.display())?;
    writeln!(file, "Timestamp: {}", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;
    writeln!(
        file,
        "Status: {} ({:.3}s)",
        output.status.reason(),
        output.elapsed.as_secs_f64()
    )?;
    writeln!(file, "{}", "-".repeat(80))?;
    writeln!(file, "OUTPUT:")?;
    file.write_all(output.stdout.as_bytes())?;
    if !output.stderr.is_empty() {
        writeln!(file, "\nERROR:")?;
        file.write_all(output.stderr.as_bytes())?;
    }
    Ok(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn here() -> PathBuf {
        std::env::current_dir().unwrap()
    }

    #[test]
    fn test_captures_stdout_and_stderr() {
        let inv = Invocation::new("sh", here()).args(["-c", "echo out; echo err >&2"]);
        let output = ProcessRunner::new().run(&inv);

        assert!(output.success());
        assert_eq!(output.exit_code(), Some(0));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.combined(), "out\nerr\n");
        assert!(output.log_path.is_none());
    }

    #[test]
    fn test_nonzero_exit() {
        let inv = Invocation::new("sh", here()).args(["-c", "exit 3"]);
        let output = ProcessRunner::new().run(&inv);

        assert_eq!(output.status, CommandStatus::NonZeroExit(3));
        assert_eq!(output.exit_code(), Some(3));
        assert_eq!(output.status.reason(), "nonzero-exit (code 3)");
    }

    #[test]
    fn test_missing_executable() {
        let inv = Invocation::new("perfbisect-definitely-not-a-program", here());
        let output = ProcessRunner::new().run(&inv);

        assert_eq!(output.status, CommandStatus::NotFound);
        assert_eq!(output.status.reason(), "not-found");
        assert!(!output.success());
    }

    #[test]
    fn test_missing_working_directory() {
        let inv = Invocation::new("true", "/nonexistent/perfbisect/dir");
        let output = ProcessRunner::new().run(&inv);

        match output.status {
            CommandStatus::SpawnFailed(msg) => assert!(msg.contains("does not exist")),
            other => panic!("Expected SpawnFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_kills_process() {
        let inv = Invocation::new("sleep", here())
            .arg("5")
            .timeout(Duration::from_millis(200));
        let output = ProcessRunner::new().run(&inv);

        assert_eq!(output.status, CommandStatus::TimedOut);
        assert_eq!(output.status.reason(), "timeout");
        assert!(output.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_kills_grandchildren() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let script = format!("(sleep 1; touch '{}') & wait", marker.display());
        let inv = Invocation::new("sh", here())
            .args(["-c", script.as_str()])
            .timeout(Duration::from_millis(200));

        let output = ProcessRunner::new().run(&inv);
        assert_eq!(output.status, CommandStatus::TimedOut);

        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "grandchild outlived the timeout");
    }

    #[test]
    fn test_writes_labelled_log() {
        let logs = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new().with_log_dir(logs.path());
        let inv = Invocation::new("sh", here())
            .args(["-c", "echo building; echo warning >&2"])
            .label("abc123", "build_primary");

        let output = runner.run(&inv);
        let path = output.log_path.expect("log file should be written");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("abc123_build_primary_"));
        assert!(name.ends_with(".log"));

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Phase: build_primary"));
        assert!(content.contains("Commit: abc123"));
        assert!(content.contains("OUTPUT:\nbuilding"));
        assert!(content.contains("ERROR:\nwarning"));
    }

    #[test]
    fn test_unlabelled_invocation_writes_no_log() {
        let logs = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new().with_log_dir(logs.path());
        let output = runner.run(&Invocation::new("true", here()));

        assert!(output.success());
        assert!(output.log_path.is_none());
        assert_eq!(fs::read_dir(logs.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_file_component_sanitizes() {
        assert_eq!(file_component("HEAD~3"), "HEAD_3");
        assert_eq!(file_component("release/v1.2"), "release_v1.2");
    }
}
