//! Per-execution sandbox arena for running student Python code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;

use markwise_core::code::SandboxConfig;

/// File the student's code is written to.
pub const SOLUTION_FILE: &str = "solution.py";
/// Driver that applies limits, imports the solution and calls the entry point.
pub const HARNESS_FILE: &str = "harness.py";

/// Python driver executed inside the arena.
///
/// Before the solution is loaded it applies rlimits (CPU, memory, file size,
/// no new processes), refuses imports of networking, FFI and process modules,
/// and replaces the process-spawning functions of `os`/`posix`. The runner
/// adds a network namespace on top when the host supports it.
///
/// In function mode stdin holds the call arguments as Python literals and the
/// `repr` of the return value is printed (or the function's own output when it
/// returns `None`). In script mode the solution runs as `__main__` and reads
/// stdin itself.
const HARNESS: &str = r#"import ast
import io
import os
import sys

try:
    import resource

    cpu = int(os.environ.get("MARKWISE_CPU_SECONDS", "5"))
    resource.setrlimit(resource.RLIMIT_CPU, (cpu, cpu + 1))
    memory = int(os.environ.get("MARKWISE_MEMORY_BYTES", "0"))
    if memory > 0:
        resource.setrlimit(resource.RLIMIT_AS, (memory, memory))
    resource.setrlimit(resource.RLIMIT_FSIZE, (1 << 20, 1 << 20))
    resource.setrlimit(resource.RLIMIT_NPROC, (0, 0))
except (ImportError, ValueError, OSError, AttributeError):
    pass

import posix


def _blocked(*args, **kwargs):
    raise PermissionError("not permitted inside the sandbox")


_BLOCKED_MODULES = frozenset({
    "_socket", "socket", "ssl", "_ssl", "ctypes", "_ctypes", "subprocess",
    "_posixsubprocess", "multiprocessing", "_multiprocessing", "pty", "select",
    "selectors", "asyncio",
})


class _ImportGuard:
    def find_spec(self, name, path=None, target=None):
        if name.partition(".")[0] in _BLOCKED_MODULES:
            raise PermissionError(f"import of '{name}' is not permitted inside the sandbox")
        return None


for _name in list(sys.modules):
    if _name.partition(".")[0] in _BLOCKED_MODULES:
        del sys.modules[_name]
sys.meta_path.insert(0, _ImportGuard())

for _name in (
    "system", "popen", "fork", "forkpty", "vfork", "posix_spawn", "posix_spawnp",
    "execv", "execve", "execl", "execle", "execlp", "execlpe", "execvp", "execvpe",
    "spawnv", "spawnve", "spawnvp", "spawnvpe", "spawnl", "spawnle", "spawnlp",
    "spawnlpe", "kill", "killpg",
):
    for _module in (os, posix):
        if hasattr(_module, _name):
            setattr(_module, _name, _blocked)
del _name, _module

with open("solution.py", encoding="utf-8") as handle:
    source = handle.read()
program = compile(source, "solution.py", "exec")
entry = sys.argv[1] if len(sys.argv) > 1 else ""

if not entry:
    exec(program, {"__name__": "__main__"})
    sys.exit(0)

raw = sys.stdin.read().strip()
args = ast.literal_eval("(" + raw + ",)") if raw else ()
namespace = {"__name__": "solution"}
captured = io.StringIO()
real_stdout = sys.stdout
sys.stdout = captured
try:
    exec(program, namespace)
    result = namespace[entry](*args)
finally:
    sys.stdout = real_stdout
if result is None:
    sys.stdout.write(captured.getvalue())
else:
    print(repr(result))
"#;

/// A temporary directory holding one student's program.
///
/// On drop, the directory and everything the program wrote are removed.
pub struct Sandbox {
    work_dir: TempDir,
    config: SandboxConfig,
    timeout: Duration,
}

impl Sandbox {
    /// Create an empty arena.
    pub fn new(config: &SandboxConfig, timeout: Duration) -> Result<Self> {
        let work_dir = tempfile::Builder::new()
            .prefix("markwise-")
            .tempdir()
            .context("failed to create sandbox directory")?;
        Ok(Self {
            work_dir,
            config: config.clone(),
            timeout,
        })
    }

    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Wall-clock limit for each case.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Write the student's code and the harness. Returns the harness path.
    pub fn write_program(&self, code: &str) -> Result<PathBuf> {
        std::fs::write(self.work_dir().join(SOLUTION_FILE), code)
            .context("failed to write solution.py")?;
        let harness = self.work_dir().join(HARNESS_FILE);
        std::fs::write(&harness, HARNESS).context("failed to write harness.py")?;
        Ok(harness)
    }

    /// Environment for the child process. The parent environment is cleared
    /// first so API keys and tokens never reach student code. The interpreter
    /// runs in isolated mode, so `PYTHON*` variables would be ignored anyway.
    pub fn build_env(&self) -> Vec<(String, String)> {
        let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".into());
        let home = self.work_dir().to_string_lossy().to_string();
        let cpu_seconds = self.timeout.as_secs() + 1;
        vec![
            ("PATH".to_string(), path),
            ("HOME".to_string(), home.clone()),
            ("TMPDIR".to_string(), home),
            ("LANG".to_string(), "C.UTF-8".to_string()),
            ("MARKWISE_CPU_SECONDS".to_string(), cpu_seconds.to_string()),
            (
                "MARKWISE_MEMORY_BYTES".to_string(),
                (self.config.memory_limit_mb * 1024 * 1024).to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Sandbox {
        Sandbox::new(&SandboxConfig::default(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn write_program_creates_both_files() {
        let sandbox = sandbox();
        let harness = sandbox.write_program("def f(x):\n    return x\n").unwrap();
        assert!(harness.ends_with(HARNESS_FILE));
        let solution = std::fs::read_to_string(sandbox.work_dir().join(SOLUTION_FILE)).unwrap();
        assert!(solution.contains("def f(x)"));
    }

    #[test]
    fn arena_removed_on_drop() {
        let sandbox = sandbox();
        sandbox.write_program("print(1)\n").unwrap();
        let path = sandbox.work_dir().to_path_buf();
        assert!(path.exists());
        drop(sandbox);
        assert!(!path.exists());
    }

    #[test]
    fn env_does_not_inherit_secrets() {
        std::env::set_var("MARKWISE_GEMINI_KEY", "secret");
        let env = sandbox().build_env();
        assert!(env.iter().all(|(k, _)| k != "MARKWISE_GEMINI_KEY"));
        assert!(env.iter().all(|(_, v)| v != "secret"));
        std::env::remove_var("MARKWISE_GEMINI_KEY");
    }

    #[test]
    fn env_carries_limits() {
        let env = sandbox().build_env();
        let get = |key: &str| {
            env.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap()
        };
        assert_eq!(get("MARKWISE_CPU_SECONDS"), "3");
        assert_eq!(get("MARKWISE_MEMORY_BYTES"), (256u64 * 1024 * 1024).to_string());
    }
}
