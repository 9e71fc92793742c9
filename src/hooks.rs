//! Shell commands configured to run before and after `apply`.
use anyhow::{Context as _, Result};

use crate::config::Hook;
use crate::context::Context;
use crate::error::{ExecError, Interrupted};

#[cfg(not(windows))]
const SHELL: (&str, &str) = ("sh", "-c");
#[cfg(windows)]
const SHELL: (&str, &str) = ("cmd", "/C");

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Before the package pass.
    PreApply,
    /// After the dotfile pass.
    PostApply,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreApply => f.write_str("pre-apply"),
            Self::PostApply => f.write_str("post-apply"),
        }
    }
}

fn hooks_for(ctx: &Context, phase: HookPhase) -> &[Hook] {
    match phase {
        HookPhase::PreApply => &ctx.config.hooks.pre_apply,
        HookPhase::PostApply => &ctx.config.hooks.post_apply,
    }
}

/// Run the hooks configured for `phase` in order. Dry runs only log them.
///
/// A failing hook marked `continue_on_error` is logged and skipped.
/// Cancellation always aborts.
///
/// # Errors
///
/// Returns the failure of the first hook that exits non-zero, cannot be
/// started or times out, unless it continues on error.
pub fn run_hooks(ctx: &Context, phase: HookPhase) -> Result<()> {
    let (shell, flag) = SHELL;
    for hook in hooks_for(ctx, phase) {
        if hook.command.trim().is_empty() {
            continue;
        }
        if ctx.dry_run {
            ctx.log.dry_run(&format!("would run {phase} hook: {}", hook.command));
            continue;
        }
        ctx.log.info(&format!("running {phase} hook: {}", hook.command));
        let token = hook
            .timeout()
            .map_or_else(|| ctx.cancel.clone(), |t| ctx.cancel.with_timeout(t));
        match ctx.executor.run(&token, shell, &[flag, &hook.command]) {
            Ok(result) => {
                for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
                    ctx.log.debug(&format!("  {line}"));
                }
            }
            Err(
                e @ ExecError::Interrupted {
                    reason: Interrupted::Cancelled,
                    ..
                },
            ) => return Err(e).with_context(|| format!("{phase} hook '{}'", hook.command)),
            Err(e) if hook.continue_on_error => {
                ctx.log.warn(&format!(
                    "{phase} hook '{}' failed, continuing: {e}",
                    hook.command
                ));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("{phase} hook '{}' failed", hook.command));
            }
        }
    }
    Ok(())
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{Config, Hooks};
    use crate::context::test_helpers::TestEnv;
    use crate::error::{ErrorKind, kind_of};
    use crate::exec::test_helpers::MockExecutor;

    fn config(pre: Vec<Hook>, post: Vec<Hook>) -> Config {
        Config {
            hooks: Hooks {
                pre_apply: pre,
                post_apply: post,
            },
            ..Config::default()
        }
    }

    #[test]
    fn hooks_run_in_order_through_the_shell() {
        let env = TestEnv::new();
        let exec = Arc::new(MockExecutor::new().ok("one\n").ok(""));
        let ctx = env
            .context_with(config(vec![Hook::new("echo one"), Hook::new("true")], vec![]), false)
            .with_executor(exec.clone());

        run_hooks(&ctx, HookPhase::PreApply).unwrap();
        run_hooks(&ctx, HookPhase::PostApply).unwrap();
        assert_eq!(exec.calls(), ["sh -c echo one", "sh -c true"]);
    }

    #[test]
    fn failing_hook_aborts_unless_it_continues() {
        let env = TestEnv::new();
        let exec = Arc::new(MockExecutor::new().respond(1, "", "boom").respond(2, "", "bad"));
        let lenient = Hook {
            continue_on_error: true,
            ..Hook::new("flaky")
        };
        let ctx = env
            .context_with(config(vec![], vec![lenient, Hook::new("strict"), Hook::new("never")]), false)
            .with_executor(exec.clone());

        let err = run_hooks(&ctx, HookPhase::PostApply).unwrap_err();
        assert!(format!("{err:#}").contains("post-apply hook 'strict' failed"));
        assert_eq!(kind_of(&err), Some(ErrorKind::CommandExecution));
        assert_eq!(exec.calls(), ["sh -c flaky", "sh -c strict"]);
    }

    #[test]
    fn cancelled_hook_aborts_even_when_lenient() {
        let env = TestEnv::new();
        let exec = Arc::new(MockExecutor::new().error(ExecError::Interrupted {
            program: "sh".to_string(),
            reason: Interrupted::Cancelled,
        }));
        let lenient = Hook {
            continue_on_error: true,
            ..Hook::new("sleep 60")
        };
        let ctx = env
            .context_with(config(vec![lenient], vec![]), false)
            .with_executor(exec);
        let err = run_hooks(&ctx, HookPhase::PreApply).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Cancelled));
    }

    #[test]
    fn dry_run_does_not_execute() {
        let env = TestEnv::new();
        let exec = Arc::new(MockExecutor::new());
        let ctx = env
            .context_with(config(vec![Hook::new("rm -rf ~/.cache")], vec![]), true)
            .with_executor(exec.clone());
        run_hooks(&ctx, HookPhase::PreApply).unwrap();
        assert!(exec.calls().is_empty());
    }
}
