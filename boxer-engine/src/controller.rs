//! VM lifecycle controller.
//!
//! [`VmController`] is the seam the facade drives; [`CommandController`] is
//! the production implementation that shells out to hypervisor command
//! templates, one throttled process per operation.

use std::process::ExitStatus;

use async_trait::async_trait;
use boxer_core::{
    BoxerConfig, ControlPolicy, Operation, VmControl, VmInfo, VmState, MACHINE_PLACEHOLDER,
    SNAPSHOT_PLACEHOLDER,
};

use crate::{EngineError, PaddedMutex, ProcessIo, Promise, VmContext};

/// Drives lifecycle operations on VM contexts.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait VmController: Send + Sync {
    /// Power the VM on. Requires `STOPPED`; ends `RUNNING`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidState`] from any other state, and
    /// [`EngineError::System`] or [`EngineError::Timeout`] if the command fails.
    async fn start(&self, ctx: &VmContext) -> Result<(), EngineError>;

    /// Power the VM off. Requires `RUNNING`; ends `STOPPED`.
    ///
    /// # Errors
    /// Same as [`VmController::start`].
    async fn stop(&self, ctx: &VmContext) -> Result<(), EngineError>;

    /// Restore the VM's snapshot. Requires `STOPPED`; passes through
    /// `RESTORING` and ends `STOPPED`.
    ///
    /// # Errors
    /// Same as [`VmController::start`].
    async fn restore(&self, ctx: &VmContext) -> Result<(), EngineError>;

    /// Dispatch `op` to the matching method.
    ///
    /// # Errors
    /// Whatever the dispatched method returns.
    async fn execute(&self, op: Operation, ctx: &VmContext) -> Result<(), EngineError> {
        match op {
            Operation::Start => self.start(ctx).await,
            Operation::Stop => self.stop(ctx).await,
            Operation::Restore => self.restore(ctx).await,
        }
    }
}

/// Runs hypervisor commands built from [`VmControl`] templates.
///
/// Commands are serialized through a [`PaddedMutex`] whose cool-down is the
/// policy interval, and each command is bounded by the policy timeout.
///
/// # Cancel Safety
/// Dropping an operation future before it acquires the lock changes nothing.
/// Dropping it after the command was launched kills the child, starts the
/// cool-down, and moves the context to `ERROR`.
#[derive(Debug)]
pub struct CommandController {
    commands: VmControl,
    policy: ControlPolicy,
    mutex: PaddedMutex,
    stdin: ProcessIo,
    stdout: ProcessIo,
}

impl CommandController {
    /// Create a controller; child processes get `stdin`/`stdout`, stderr is discarded.
    #[must_use]
    pub fn new(
        commands: VmControl,
        policy: ControlPolicy,
        stdin: ProcessIo,
        stdout: ProcessIo,
    ) -> Self {
        Self {
            mutex: PaddedMutex::new(policy.interval()),
            commands,
            policy,
            stdin,
            stdout,
        }
    }

    /// Create a controller from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &BoxerConfig, stdin: ProcessIo, stdout: ProcessIo) -> Self {
        Self::new(config.vm_control.clone(), config.vm_control_policy, stdin, stdout)
    }

    /// The throttling and timeout policy in effect.
    #[must_use]
    pub fn policy(&self) -> &ControlPolicy {
        &self.policy
    }

    async fn run_operation(&self, op: Operation, ctx: &VmContext) -> Result<(), EngineError> {
        check_state(op, ctx)?;

        let argv = build_argv(self.commands.template(op), ctx.info())?;
        let Some((program, args)) = argv.split_first() else {
            return Err(EngineError::InvalidArgument(format!(
                "{op} command for VM {} is empty",
                ctx.machine()
            )));
        };

        let _slot = self.mutex.acquire().await;
        // An operation queued ahead of this one may have moved the VM.
        check_state(op, ctx)?;
        tracing::info!(
            operation = %op,
            machine = %ctx.machine(),
            command = %argv.join(" "),
            "running command"
        );

        let mut promise = Promise::run(&self.stdin, &self.stdout, program, args);
        let _kill = promise.cancel_on_drop()?;
        let settle = Settle::arm(op, ctx);
        if let Some(transient) = op.transient_state() {
            ctx.set_state(transient);
        }

        let timeout = self.policy.timeout();
        let waited = tokio::time::timeout(timeout, promise.wait()).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(fail(op, settle, e.to_string())),
            Err(_) => {
                promise.cancel()?;
                settle.finish(VmState::Error);
                tracing::warn!(
                    operation = %op,
                    machine = %ctx.machine(),
                    timeout_sec = timeout.as_secs(),
                    "command timed out"
                );
                return Err(EngineError::Timeout {
                    operation: op,
                    machine: ctx.machine().to_owned(),
                    timeout,
                });
            }
        };

        if !status.success() {
            return Err(fail(op, settle, describe_exit(status)));
        }

        let next = op.success_state();
        settle.finish(next);
        tracing::info!(
            operation = %op,
            machine = %ctx.machine(),
            state = %next,
            "operation complete"
        );
        Ok(())
    }
}

/// Moves the context to `ERROR` if the operation is abandoned before it
/// reaches [`Settle::finish`].
struct Settle<'a> {
    op: Operation,
    ctx: &'a VmContext,
    armed: bool,
}

impl<'a> Settle<'a> {
    fn arm(op: Operation, ctx: &'a VmContext) -> Self {
        Self { op, ctx, armed: true }
    }

    fn finish(mut self, state: VmState) {
        self.armed = false;
        self.ctx.set_state(state);
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.ctx.set_state(VmState::Error);
            tracing::warn!(
                operation = %self.op,
                machine = %self.ctx.machine(),
                "operation abandoned"
            );
        }
    }
}

#[async_trait]
impl VmController for CommandController {
    async fn start(&self, ctx: &VmContext) -> Result<(), EngineError> {
        self.run_operation(Operation::Start, ctx).await
    }

    async fn stop(&self, ctx: &VmContext) -> Result<(), EngineError> {
        self.run_operation(Operation::Stop, ctx).await
    }

    async fn restore(&self, ctx: &VmContext) -> Result<(), EngineError> {
        self.run_operation(Operation::Restore, ctx).await
    }
}

fn check_state(op: Operation, ctx: &VmContext) -> Result<(), EngineError> {
    let expected = op.required_state();
    let current = ctx.state();
    if current == expected {
        return Ok(());
    }
    Err(EngineError::InvalidState {
        operation: op,
        machine: ctx.machine().to_owned(),
        current,
        expected,
    })
}

fn fail(op: Operation, settle: Settle<'_>, reason: String) -> EngineError {
    let machine = settle.ctx.machine().to_owned();
    settle.finish(VmState::Error);
    tracing::warn!(operation = %op, machine = %machine, reason = %reason, "command failed");
    EngineError::System { operation: op, machine, reason }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("command exited with code {code}"),
        None => format!("command terminated abnormally ({status})"),
    }
}

/// Build the argument vector for `template` applied to `info`.
///
/// The template is split on whitespace first, then `$machine` and `$snapshot`
/// are substituted inside each token, so substituted values never introduce
/// new arguments. Tokens that substitute to nothing are dropped.
///
/// # Errors
/// Returns [`EngineError::InvalidArgument`] if no tokens remain.
pub fn build_argv(template: &str, info: &VmInfo) -> Result<Vec<String>, EngineError> {
    let argv: Vec<String> = template
        .split_whitespace()
        .map(|token| substitute(token, info))
        .filter(|token| !token.is_empty())
        .collect();

    if argv.is_empty() {
        return Err(EngineError::InvalidArgument(format!(
            "command template '{template}' yields no arguments for VM '{}'",
            info.name
        )));
    }
    Ok(argv)
}

/// Single left-to-right pass; substituted text is never rescanned.
fn substitute(token: &str, info: &VmInfo) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(MACHINE_PLACEHOLDER) {
            out.push_str(&info.name);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(SNAPSHOT_PLACEHOLDER) {
            out.push_str(&info.snapshot);
            rest = after;
        } else {
            out.push('$');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn info(name: &str, snapshot: &str) -> VmInfo {
        VmInfo::new(name, snapshot, "10.0.0.1", "linux", "g1")
    }

    fn argv(template: &str, info: &VmInfo) -> Vec<String> {
        match build_argv(template, info) {
            Ok(v) => v,
            Err(e) => panic!("build_argv({template:?}) failed: {e}"),
        }
    }

    #[test]
    fn substitutes_machine_and_snapshot() {
        let vm = info("win10-dev", "snapshot0");
        assert_eq!(
            argv("VBoxManage snapshot $machine restore $snapshot", &vm),
            ["VBoxManage", "snapshot", "win10-dev", "restore", "snapshot0"]
        );
    }

    #[test]
    fn placeholder_inside_token() {
        let vm = info("vm1", "s1");
        assert_eq!(argv("tool --vm=$machine@$snapshot", &vm), ["tool", "--vm=vm1@s1"]);
    }

    #[test]
    fn collapses_repeated_whitespace() {
        let vm = info("vm1", "s1");
        assert_eq!(argv("  start\t $machine  \n", &vm), ["start", "vm1"]);
    }

    #[test]
    fn names_with_spaces_stay_one_argument() {
        let vm = info("Windows 10 Dev", "s1");
        assert_eq!(
            argv("VBoxManage startvm $machine", &vm),
            ["VBoxManage", "startvm", "Windows 10 Dev"]
        );
    }

    #[test]
    fn substituted_text_is_not_rescanned() {
        let vm = info("$snapshot", "s1");
        assert_eq!(argv("run $machine", &vm), ["run", "$snapshot"]);
    }

    #[test]
    fn unknown_dollar_tokens_are_kept() {
        let vm = info("vm1", "s1");
        assert_eq!(argv("echo $HOME $ $machine$", &vm), ["echo", "$HOME", "$", "vm1$"]);
    }

    #[test]
    fn empty_template_is_invalid_argument() {
        let vm = info("vm1", "s1");
        assert!(matches!(build_argv("   ", &vm), Err(EngineError::InvalidArgument(_))));
        assert!(matches!(build_argv("", &vm), Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn template_that_substitutes_to_nothing_is_invalid_argument() {
        let vm = info("", "");
        assert!(matches!(
            build_argv("$machine $snapshot", &vm),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    proptest! {
        #[test]
        fn machine_token_is_exactly_the_name(
            name in "[^$]{1,24}",
            program in "[a-zA-Z][a-zA-Z0-9_-]{0,12}",
        ) {
            let vm = info(&name, "s1");
            let out = argv(&format!("{program} $machine"), &vm);
            prop_assert_eq!(out.len(), 2);
            prop_assert_eq!(&out[0], &program);
            prop_assert_eq!(&out[1], &name);
        }

        #[test]
        fn never_yields_empty_arguments(
            template in "[ a-z$]{0,40}",
            name in ".{0,8}",
            snapshot in ".{0,8}",
        ) {
            let vm = info(&name, &snapshot);
            if let Ok(out) = build_argv(&template, &vm) {
                prop_assert!(!out.is_empty());
                prop_assert!(out.iter().all(|arg| !arg.is_empty()));
            }
        }

        #[test]
        fn template_without_placeholders_is_split_verbatim(
            words in proptest::collection::vec("[a-z0-9]{1,8}", 1..6),
        ) {
            let vm = info("vm1", "s1");
            let out = argv(&words.join(" "), &vm);
            prop_assert_eq!(out, words);
        }
    }
}
