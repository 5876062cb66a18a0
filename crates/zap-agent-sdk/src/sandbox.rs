//! Program validation stage: size-checks, statically screens, compiles,
//! and executes a candidate program in a restricted child process.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

const MIN_SIZE: usize = 100;
const MAX_SIZE: usize = 50_000;
const EXEC_TIMEOUT: Duration = Duration::from_secs(5);

const FORBIDDEN_TOKENS: &[&str] = &[
    "import os",
    "import sys",
    "import subprocess",
    "import socket",
    "__import__",
    "eval(",
    "exec(",
    "open(",
];

pub struct Sandbox {
    /// Overridable for tests that don't want to shell out to a real
    /// interpreter.
    pub interpreter: String,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
        }
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size-check, static screen, then actually compile/execute the source,
    /// requiring non-empty stdout on a clean exit.
    pub fn test(&self, source: &str) -> Result<(), String> {
        if source.len() < MIN_SIZE || source.len() > MAX_SIZE {
            return Err(format!(
                "source size {} out of bounds [{MIN_SIZE}, {MAX_SIZE}]",
                source.len()
            ));
        }
        for token in FORBIDDEN_TOKENS {
            if source.contains(token) {
                return Err(format!("forbidden token: {token}"));
            }
        }

        let mut tmp = tempfile::NamedTempFile::new().map_err(|e| e.to_string())?;
        tmp.write_all(source.as_bytes()).map_err(|e| e.to_string())?;
        let path = tmp.path().to_path_buf();

        let output = run_with_timeout(&self.interpreter, &path, EXEC_TIMEOUT)?;

        if !output.status.success() {
            return Err(format!("nonzero exit: {:?}", output.status.code()));
        }
        if output.stdout.is_empty() {
            return Err("no stdout produced".to_string());
        }
        Ok(())
    }
}

fn run_with_timeout(
    interpreter: &str,
    path: &std::path::Path,
    timeout: Duration,
) -> Result<std::process::Output, String> {
    let mut child = Command::new(interpreter)
        .arg(path)
        .env_clear()
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| e.to_string())?;

    let start = std::time::Instant::now();
    loop {
        match child.try_wait().map_err(|e| e.to_string())? {
            Some(_) => return child.wait_with_output().map_err(|e| e.to_string()),
            None => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    return Err("execution timed out".to_string());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(src: &str) -> String {
        let mut s = src.to_string();
        while s.len() < MIN_SIZE {
            s.push_str("# padding to satisfy the minimum source size\n");
        }
        s
    }

    #[test]
    fn rejects_undersized_source() {
        let sandbox = Sandbox::new();
        assert!(sandbox.test("print(1)").is_err());
    }

    #[test]
    fn rejects_forbidden_import() {
        let sandbox = Sandbox::new();
        let src = padded("import os\nprint(os.getcwd())\n");
        assert!(sandbox.test(&src).is_err());
    }

    #[test]
    fn rejects_oversized_source() {
        let sandbox = Sandbox::new();
        let src = "x = 1\n".repeat(20_000);
        assert!(sandbox.test(&src).is_err());
    }
}
