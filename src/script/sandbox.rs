//! Isolated execution of extracted player functions
//!
//! Every call builds a fresh V8 isolate through `deno_core`, so scripts never
//! observe each other. No extensions are registered, which leaves the snippet
//! without network or filesystem access.

use crate::error::PlayerError;
use deno_core::{v8, FastString, JsRuntime, RuntimeOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Names removed from the global object before foreign code runs
const HARDENING_PRELUDE: &str = r#"
delete globalThis.Deno;
delete globalThis.__bootstrap;
if (typeof Deno !== "undefined") { globalThis.Deno = undefined; }
"#;

/// Compile and run capability needed by the extractors
pub trait ScriptSandbox: Send + Sync {
    /// Parse `code` without running any of it
    fn compile_or_fail(&self, code: &str) -> Result<(), PlayerError>;

    /// Evaluate `code`, call `entry_point` with `args` and return the result as a string
    fn run(&self, code: &str, entry_point: &str, args: &[&str]) -> Result<String, PlayerError>;
}

/// Execution budget for a single sandbox call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock budget for evaluating the snippet and calling the entry point
    pub timeout: Duration,
    /// V8 heap ceiling in bytes
    pub max_heap_bytes: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_heap_bytes: 64 * 1024 * 1024,
        }
    }
}

impl SandboxLimits {
    /// Set execution timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set heap ceiling
    pub fn with_max_heap_bytes(mut self, max_heap_bytes: usize) -> Self {
        self.max_heap_bytes = max_heap_bytes;
        self
    }
}

/// Sandbox backed by a throwaway `deno_core` runtime per call
#[derive(Debug, Clone, Default)]
pub struct V8Sandbox {
    limits: SandboxLimits,
}

impl V8Sandbox {
    /// Create a sandbox with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sandbox with the given limits
    pub fn with_limits(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Current limits
    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    fn new_runtime(&self) -> Result<(JsRuntime, Arc<AtomicBool>), PlayerError> {
        let create_params = v8::CreateParams::default().heap_limits(0, self.limits.max_heap_bytes);
        let mut runtime = JsRuntime::new(RuntimeOptions {
            create_params: Some(create_params),
            ..Default::default()
        });

        // Without this callback V8 aborts the whole process at the heap limit
        let heap_exhausted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&heap_exhausted);
        let handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current_limit, _initial_limit| {
            flag.store(true, Ordering::SeqCst);
            handle.terminate_execution();
            current_limit * 2
        });

        runtime
            .execute_script("<prelude>", FastString::from(HARDENING_PRELUDE.to_string()))
            .map_err(|e| PlayerError::RuntimeError(format!("Sandbox setup failed: {}", e)))?;

        Ok((runtime, heap_exhausted))
    }

    fn budget_error(&self, timed_out: bool, heap_exhausted: bool) -> Option<PlayerError> {
        if timed_out {
            warn!("Sandbox execution exceeded {:?}", self.limits.timeout);
            return Some(PlayerError::RuntimeError(format!(
                "execution exceeded the {:?} budget",
                self.limits.timeout
            )));
        }
        if heap_exhausted {
            warn!(
                "Sandbox execution exceeded the heap limit of {} bytes",
                self.limits.max_heap_bytes
            );
            return Some(PlayerError::RuntimeError(format!(
                "execution exceeded the heap limit of {} bytes",
                self.limits.max_heap_bytes
            )));
        }
        None
    }
}

impl ScriptSandbox for V8Sandbox {
    fn compile_or_fail(&self, code: &str) -> Result<(), PlayerError> {
        // The Function constructor parses the body but never invokes it
        let probe = format!("new Function({});", js_string_literal(code)?);
        let (mut runtime, _) = self.new_runtime()?;
        runtime
            .execute_script("<compile>", FastString::from(probe))
            .map(|_| ())
            .map_err(|e| {
                debug!("Snippet failed to compile: {}", e);
                PlayerError::CompileError(e.to_string())
            })
    }

    fn run(&self, code: &str, entry_point: &str, args: &[&str]) -> Result<String, PlayerError> {
        let invocation = build_invocation(entry_point, args)?;
        let (mut runtime, heap_exhausted) = self.new_runtime()?;

        let watchdog = Watchdog::arm(
            runtime.v8_isolate().thread_safe_handle(),
            self.limits.timeout,
        );
        let outcome = runtime
            .execute_script("<player>", FastString::from(code.to_string()))
            .and_then(|_| runtime.execute_script("<call>", FastString::from(invocation)));
        let timed_out = watchdog.finish();

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                if let Some(err) = self.budget_error(timed_out, heap_exhausted.load(Ordering::SeqCst))
                {
                    return Err(err);
                }
                debug!("Entry point `{}` failed: {}", entry_point, e);
                return Err(PlayerError::RuntimeError(e.to_string()));
            }
        };

        let scope = &mut runtime.handle_scope();
        let local_value = result.open(scope);
        Ok(local_value.to_rust_string_lossy(scope))
    }
}

/// Encode `value` as a JavaScript string literal
fn js_string_literal(value: &str) -> Result<String, PlayerError> {
    // JSON strings are valid JavaScript string literals
    serde_json::to_string(value)
        .map_err(|e| PlayerError::RuntimeError(format!("Could not encode argument: {}", e)))
}

/// Script that calls the entry point and coerces its result
fn build_invocation(entry_point: &str, args: &[&str]) -> Result<String, PlayerError> {
    let name = js_string_literal(entry_point)?;
    let args = args
        .iter()
        .map(|arg| js_string_literal(arg))
        .collect::<Result<Vec<_>, _>>()?
        .join(",");

    Ok(format!(
        r#"(function () {{
    var entry = globalThis[{name}];
    if (typeof entry !== "function") {{
        throw new TypeError("entry point " + {name} + " is not a function");
    }}
    var result = entry({args});
    if (result === undefined || result === null || typeof result === "symbol") {{
        throw new TypeError("entry point " + {name} + " returned " + String(result));
    }}
    return String(result);
}})()"#
    ))
}

/// Terminates the isolate if execution outlives the budget
struct Watchdog {
    done: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    fn arm(handle: v8::IsolateHandle, timeout: Duration) -> Self {
        let (done, rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let thread = thread::spawn(move || {
            if let Err(mpsc::RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                flag.store(true, Ordering::SeqCst);
                handle.terminate_execution();
            }
        });

        Self {
            done: Some(done),
            thread: Some(thread),
            fired,
        }
    }

    /// Stop the watchdog and report whether it fired
    fn finish(mut self) -> bool {
        self.stop();
        self.fired.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
