// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Login shell dispatch.
//!
//! sshd runs the account's login shell as `<shell> -c <command>` (or with
//! no arguments for an interactive session). For SSH sessions
//! authenticated with GSSAPI we hand off to `gitlab-shell` with the key
//! identifier mapped to the principal, exactly as the `command=` entry of
//! a GitLab `authorized_keys` line would. Everything else goes to a plain
//! shell so `ForceCommand` and local services keep working.
//!
//! Deciding and executing are separate steps: [Dispatcher::decide] only
//! reads files, and [DispatchOutcome::execute] is the one place the
//! process image gets replaced.

use {
    crate::{
        auth::{self, AuthResolution, SessionEnv, GSSAPI_METHOD},
        config::Config,
        keymap::KeyMapStore,
        ExitCode,
    },
    log::{error, info, warn},
    std::{os::unix::process::CommandExt, path::PathBuf, process::Command},
};

/// Variable through which `gitlab-shell` receives the requested command.
pub const SSH_ORIGINAL_COMMAND_ENV: &str = "SSH_ORIGINAL_COMMAND";

/// A process image to replace the current one with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Variables removed from the inherited environment.
    pub env_remove: Vec<String>,
    /// Exit code reported if the exec fails.
    pub on_failure: ExitCode,
}

impl ExecRequest {
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for key in &self.env_remove {
            command.env_remove(key);
        }
        command.envs(self.env.iter().map(|(k, v)| (k, v)));

        command
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    ReplaceProcess(ExecRequest),
    Fail(ExitCode),
}

impl DispatchOutcome {
    /// Carry out the decision.
    ///
    /// Only returns if nothing was to be executed or the exec failed.
    pub fn execute(self) -> ExitCode {
        match self {
            Self::ReplaceProcess(request) => {
                let err = request.command().exec();
                error!("failed to execute {}: {}", request.program.display(), err);

                request.on_failure
            }
            Self::Fail(code) => code,
        }
    }
}

pub struct Dispatcher {
    store: KeyMapStore,
    gitlab_shell: PathBuf,
    fallback_shell: PathBuf,
}

impl Dispatcher {
    pub fn new(store: KeyMapStore, gitlab_shell: PathBuf, fallback_shell: PathBuf) -> Self {
        Self {
            store,
            gitlab_shell,
            fallback_shell,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.key_store(),
            config.gitlab_shell.clone(),
            config.fallback_shell.clone(),
        )
    }

    pub fn decide(&self, env: &SessionEnv, args: &[String]) -> DispatchOutcome {
        if !env.ssh_connection {
            info!("local invocation; executing {}", self.fallback_shell.display());
            return self.plain_shell(args);
        }

        match auth::resolve(env, &self.store) {
            AuthResolution::MethodUnknown => {
                warn!("unable to determine authentication method; refusing session");
                DispatchOutcome::Fail(ExitCode::NoAuthMethod)
            }
            AuthResolution::Resolved { key_id, .. } => {
                info!("executing {} for {}", self.gitlab_shell.display(), key_id);
                DispatchOutcome::ReplaceProcess(self.gitlab_shell_request(key_id, args))
            }
            AuthResolution::Unresolved { method } if method == GSSAPI_METHOD => {
                warn!("GSSAPI principal not mapped to a GitLab key; refusing session");
                DispatchOutcome::Fail(ExitCode::NotMapped)
            }
            AuthResolution::Unresolved { method } => {
                info!("session authenticated with {}; passing to shell", method);
                self.plain_shell(args)
            }
        }
    }

    fn plain_shell(&self, args: &[String]) -> DispatchOutcome {
        DispatchOutcome::ReplaceProcess(ExecRequest {
            program: self.fallback_shell.clone(),
            args: args.to_vec(),
            env: vec![],
            env_remove: vec![],
            on_failure: ExitCode::ShellExecFailed,
        })
    }

    fn gitlab_shell_request(&self, key_id: String, args: &[String]) -> ExecRequest {
        // An inherited value must not stand in for an interactive session.
        let (env, env_remove) = match original_command(args) {
            Some(command) => (vec![(SSH_ORIGINAL_COMMAND_ENV.to_string(), command)], vec![]),
            None => (vec![], vec![SSH_ORIGINAL_COMMAND_ENV.to_string()]),
        };

        ExecRequest {
            program: self.gitlab_shell.clone(),
            args: vec![key_id],
            env,
            env_remove,
            on_failure: ExitCode::GitlabShellExecFailed,
        }
    }
}

/// Reconstruct the client's command line from the shell arguments.
///
/// The first argument is the shell's `-c` flag and is dropped.
fn original_command(args: &[String]) -> Option<String> {
    let (_flag, rest) = args.split_first()?;

    Some(rest.join(" "))
}
