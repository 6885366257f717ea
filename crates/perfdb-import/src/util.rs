use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Run a test-runner command and return its raw stdout (the report).
pub fn run_capture(program: &str, args: &[String]) -> Result<Vec<u8>> {
    let out = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("run {} {:?}", program, args))?;
    if !out.status.success() {
        return Err(anyhow!(
            "command failed ({}): {} {:?}\nstderr:{}",
            out.status,
            program,
            args,
            String::from_utf8_lossy(&out.stderr)
        ));
    }
    if out.stdout.iter().all(u8::is_ascii_whitespace) {
        bail!("command produced no report on stdout: {} {:?}", program, args);
    }
    Ok(out.stdout)
}

/// Write raw report bytes to `path`, or to stdout when `path` is `-`.
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(bytes)?;
        stdout.flush()?;
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    std::fs::write(path, bytes).with_context(|| format!("write {}", path.display()))
}

/// `-` reads the whole of stdin.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut buf = vec![];
        std::io::Read::read_to_end(&mut std::io::stdin().lock(), &mut buf).context("read stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run_capture("sh", &["-c".into(), "printf '{\"a\":1}'".into()]).unwrap();
        assert_eq!(out, b"{\"a\":1}");
    }

    #[test]
    fn failing_command_is_an_error() {
        let err = run_capture("sh", &["-c".into(), "echo boom >&2; exit 3".into()]).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn empty_stdout_is_an_error() {
        assert!(run_capture("sh", &["-c".into(), "true".into()]).is_err());
    }

    #[test]
    fn write_output_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/report.json");
        write_output(&path, b"{}").unwrap();
        assert_eq!(read_input(&path).unwrap(), b"{}");
    }
}
