use std::{
    ffi::{OsStr, OsString},
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, Write},
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use chrono::{Local, SecondsFormat};
use indicatif::{ProgressBar, ProgressStyle};
use nix::{
    sys::signal::{Signal, killpg},
    unistd::Pid,
};

use crate::{download::logs_dir, interrupt};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn log_filename(id: impl AsRef<str>) -> String {
    let ts = Local::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");

    format!("{}-{}.log", id.as_ref().replace([' ', '/'], "-"), ts)
}

/// One external process of a build stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub title: String,
    pub workdir: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, OsString)>,
}

impl Invocation {
    pub fn new(
        title: impl Into<String>,
        workdir: impl Into<PathBuf>,
        program: impl Into<PathBuf>,
    ) -> Self {
        Self {
            title: title.into(),
            workdir: workdir.into(),
            program: program.into(),
            args: vec![],
            env: vec![],
        }
    }

    /// `make` in `workdir`.
    pub fn make(title: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self::new(title, workdir, "make")
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn envs(mut self, env: &[(String, OsString)]) -> Self {
        self.env.extend_from_slice(env);
        self
    }
}

/// A unit of work in the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Command(Invocation),
    CreateDir(PathBuf),
    /// Create an empty file if it doesn't exist.
    Touch(PathBuf),
}

impl From<Invocation> for Step {
    fn from(value: Invocation) -> Self {
        Step::Command(value)
    }
}

/// Runs pipeline steps.
pub trait Executor {
    fn execute(&mut self, step: &Step) -> Result<()>;
}

/// Runs steps on the host.
///
/// Commands show a spinner and write their output to a log file, or inherit the terminal when
/// `verbose` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor {
    pub verbose: bool,
}

impl Executor for SystemExecutor {
    fn execute(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Command(invocation) => {
                let Invocation {
                    title,
                    workdir,
                    program,
                    args,
                    env,
                } = invocation;
                log::debug!("{} {}", program.display(), args.join(" "));
                if self.verbose {
                    run_command_inherit_in(
                        workdir,
                        title,
                        program,
                        args.as_slice(),
                        Some(env.clone()),
                    )
                } else {
                    run_command_in(workdir, title, program, args.as_slice(), Some(env.clone()))
                }
            }
            Step::CreateDir(path) => std::fs::create_dir_all(path)
                .context(format!("failed to create `{}`", path.display())),
            Step::Touch(path) => OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map(|_| ())
                .context(format!("failed to touch `{}`", path.display())),
        }
    }
}

/// Spawn `cmd` as the leader of a new process group, so the whole group can be killed.
fn spawn_group(cmd: &mut Command, title: &str) -> Result<Child> {
    cmd.process_group(0)
        .stdin(Stdio::null())
        .spawn()
        .context(format!("spawning `{title}`"))
}

/// Kill the process group led by `child`, compilers started by `make` included.
fn kill_group(child: &mut Child) {
    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        log::debug!("failed to terminate process group {group}: {e}");
    }
    let _ = child.wait();
    // anything that ignored SIGTERM
    let _ = killpg(group, Signal::SIGKILL);
}

/// Wait for `child`, killing its process group if an interrupt arrives first.
fn wait_interruptible(child: &mut Child, title: &str) -> Result<ExitStatus> {
    loop {
        if let Some(status) = child
            .try_wait()
            .context(format!("waiting for `{title}` to finish"))?
        {
            return Ok(status);
        }
        if interrupt::is_interrupted() {
            kill_group(child);
            return Err(interrupt::Interrupted.into());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Run a command in directory and show output in a spinner.
///
/// If the command doesn't finish successfuly the full output will saved to a file and the path
/// will be printed.
pub fn run_command_in(
    workdir: impl AsRef<Path>,
    title: &str,
    command: impl AsRef<OsStr>,
    args: &[impl AsRef<OsStr>],
    env: Option<Vec<(impl AsRef<OsStr>, impl AsRef<OsStr>)>>,
) -> Result<()> {
    interrupt::check()?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.dim} {msg:.dim}")?);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(title.to_string());

    let mut _cmd = Command::new(command);
    _cmd.args(args)
        .current_dir(workdir.as_ref())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(_env) = env {
        _cmd.envs(_env);
    }
    let mut child = spawn_group(&mut _cmd, title)?;

    let stdout = child.stdout.take().context("stdout was not captured")?;
    let stderr = child.stderr.take().context("stderr was not captured")?;

    let log_path = logs_dir()?.join(log_filename(title));
    log::trace!("{}", log_path.display());

    let log = Arc::new(Mutex::new(File::create(&log_path)?));

    let t_out = {
        // stream stdout
        let pb_out = pb.clone();
        let log_out = log.clone();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines().flatten() {
                pb_out.set_message(line.chars().take(80).collect::<String>());
                if let Ok(mut f) = log_out.lock() {
                    let _ = f.write_all(line.as_bytes());
                    let _ = f.write_all("\n".as_bytes());
                }
            }
        })
    };

    let t_err = {
        // stream stderr
        let pb_err = pb.clone();
        let log_out = log.clone();
        std::thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().flatten() {
                pb_err.set_message(line.chars().take(80).collect::<String>());
                if let Ok(mut f) = log_out.lock() {
                    let _ = f.write_all(line.as_bytes());
                    let _ = f.write_all("\n".as_bytes());
                }
            }
        })
    };

    // on interrupt the readers may never see EOF while grandchildren hold the pipes, so they
    // are only joined after a normal exit
    let status = match wait_interruptible(&mut child, title) {
        Ok(status) => status,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e);
        }
    };
    let _ = t_out.join();
    let _ = t_err.join();

    if status.success() {
        pb.finish_with_message(format!("{title} finished successfully"));
        Ok(())
    } else {
        pb.finish();
        bail!(
            "{title} exited with status {}\nFull output is available at {}",
            status,
            log_path.display()
        );
    }
}

/// Like [`run_command_in`] but the command writes straight to the terminal.
pub fn run_command_inherit_in(
    workdir: impl AsRef<Path>,
    title: &str,
    command: impl AsRef<OsStr>,
    args: &[impl AsRef<OsStr>],
    env: Option<Vec<(impl AsRef<OsStr>, impl AsRef<OsStr>)>>,
) -> Result<()> {
    interrupt::check()?;

    let mut _cmd = Command::new(command);
    _cmd.args(args).current_dir(workdir.as_ref());
    if let Some(_env) = env {
        _cmd.envs(_env);
    }
    let mut child = spawn_group(&mut _cmd, title)?;

    let status = wait_interruptible(&mut child, title)?;
    if !status.success() {
        bail!("{title} exited with status {}", status);
    }
    Ok(())
}
