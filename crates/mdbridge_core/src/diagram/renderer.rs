//! External diagram renderers.
//!
//! Each supported kind is rendered by a command-line tool found on `PATH`
//! (`mmdc`, `plantuml`, `dot`). Tools run as blocking child processes with a
//! deadline; stderr goes to an anonymous temp file so a chatty tool cannot
//! fill a pipe and stall.

use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::DiagramKind;
use crate::error::{MdBridgeError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Renders diagram source files to SVG.
pub trait DiagramRenderer {
    /// Kind of diagram this renderer handles.
    fn kind(&self) -> DiagramKind;

    /// Whether the tool can be invoked right now.
    fn is_available(&self) -> bool;

    /// Try to install the tool.
    fn install(&self) -> Result<()>;

    /// Render `input` (diagram source) to `output` (SVG).
    fn render(&self, input: &Path, output: &Path) -> Result<()>;
}

/// A renderer backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    kind: DiagramKind,
    program: String,
    version_arg: &'static str,
    /// `{input}` and `{output}` are substituted
    args: Vec<String>,
    /// Feed the source on stdin and take SVG from stdout
    piped: bool,
    install_command: Option<Vec<String>>,
    install_hint: &'static str,
    timeout: Duration,
}

impl CommandRenderer {
    /// The standard tool for a diagram kind.
    pub fn for_kind(kind: DiagramKind, timeout: Duration) -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match kind {
            DiagramKind::Mermaid => Self {
                kind,
                program: "mmdc".into(),
                version_arg: "--version",
                args: strings(&["-i", "{input}", "-o", "{output}", "-b", "transparent"]),
                piped: false,
                install_command: Some(strings(&["npm", "install", "-g", "@mermaid-js/mermaid-cli"])),
                install_hint: "npm install -g @mermaid-js/mermaid-cli",
                timeout,
            },
            DiagramKind::Plantuml => Self {
                kind,
                program: "plantuml".into(),
                version_arg: "-version",
                args: strings(&["-tsvg", "-pipe"]),
                piped: true,
                install_command: None,
                install_hint: "brew install plantuml, or sudo apt-get install plantuml",
                timeout,
            },
            DiagramKind::Graphviz => Self {
                kind,
                program: "dot".into(),
                version_arg: "-V",
                args: strings(&["-Tsvg", "{input}", "-o", "{output}"]),
                piped: false,
                install_command: None,
                install_hint: "brew install graphviz, or sudo apt-get install graphviz",
                timeout,
            },
        }
    }

    /// Use a different executable (for example an absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                "{input}" => input.as_os_str().to_owned(),
                "{output}" => output.as_os_str().to_owned(),
                other => OsString::from(other),
            })
            .collect()
    }

    fn err(&self, message: impl Into<String>) -> MdBridgeError {
        MdBridgeError::render(self.kind.as_str(), message)
    }

    fn wait_with_deadline(&self, child: &mut std::process::Child) -> Result<ExitStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(self.err(format!(
                        "{} timed out after {} ms",
                        self.program,
                        self.timeout.as_millis()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(self.err(format!("failed waiting for {}: {}", self.program, e))),
            }
        }
    }
}

impl DiagramRenderer for CommandRenderer {
    fn kind(&self) -> DiagramKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg(self.version_arg)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn install(&self) -> Result<()> {
        let Some((program, args)) = self
            .install_command
            .as_ref()
            .and_then(|cmd| cmd.split_first())
        else {
            return Err(self.err(format!(
                "{} is not installed; install it with: {}",
                self.program, self.install_hint
            )));
        };

        log::info!("Installing {} renderer: {}", self.kind, self.install_hint);
        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| self.err(format!("failed to run {}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(self.err(format!("'{}' exited with {}", self.install_hint, status)))
        }
    }

    fn render(&self, input: &Path, output: &Path) -> Result<()> {
        let mut stderr_file = tempfile::tempfile()?;

        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(input, output))
            .stderr(Stdio::from(stderr_file.try_clone()?));

        if self.piped {
            cmd.stdin(Stdio::from(File::open(input)?))
                .stdout(Stdio::from(File::create(output)?));
        } else {
            cmd.stdin(Stdio::null()).stdout(Stdio::null());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| self.err(format!("failed to run {}: {}", self.program, e)))?;
        let status = self.wait_with_deadline(&mut child)?;

        if !status.success() {
            let mut stderr = String::new();
            stderr_file.seek(SeekFrom::Start(0))?;
            let _ = stderr_file.read_to_string(&mut stderr);
            let detail = stderr.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
            return Err(self.err(format!("{} exited with {}: {}", self.program, status, detail.trim())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_argument_substitution() {
        let r = CommandRenderer::for_kind(DiagramKind::Graphviz, Duration::from_secs(1));
        let args = r.expand_args(Path::new("/tmp/in.dot"), Path::new("/tmp/out.svg"));
        assert_eq!(
            args,
            vec![
                OsString::from("-Tsvg"),
                OsString::from("/tmp/in.dot"),
                OsString::from("-o"),
                OsString::from("/tmp/out.svg"),
            ]
        );
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let r = CommandRenderer::for_kind(DiagramKind::Mermaid, Duration::from_secs(1))
            .with_program("mdbridge-no-such-renderer");
        assert!(!r.is_available());
        let err = r
            .render(&PathBuf::from("in.mmd"), &PathBuf::from("out.svg"))
            .unwrap_err();
        assert!(matches!(err, MdBridgeError::Render { .. }));
    }

    #[test]
    fn test_install_without_command_reports_hint() {
        let r = CommandRenderer::for_kind(DiagramKind::Plantuml, Duration::from_secs(1));
        let err = r.install().unwrap_err().to_string();
        assert!(err.contains("apt-get install plantuml"));
    }
}
