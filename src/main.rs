// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! GSSAPI login shell for GitLab.
//!
//! Usage:
//!
//!   # gssgitlab newkey user@EXAMPLE.ORG
//!   # gssgitlab syncdb
//!
//! and as the login shell of the `git` account, through a wrapper such as
//!
//!   #!/bin/sh
//!   exec gssgitlab shell "$@"

use {
    clap::{Parser, Subcommand},
    gssgitlab::{
        auth::SessionEnv, config::Config, dispatch::Dispatcher, keygen, syncdb, ExitCode,
    },
    log::error,
    std::path::PathBuf,
};

/// Kerberos (GSSAPI) login shell for the GitLab service account.
///
/// GitLab identifies SSH users by their public key. This program lets
/// users authenticate with Kerberos instead, by mapping each principal to
/// a placeholder key registered in GitLab under the title
/// `gss:<principal>`.
///
/// # Setup
///
/// Generate a key for a user and register its public half in GitLab
/// with the printed title:
///
/// $ gssgitlab newkey user@EXAMPLE.ORG
///
/// Regenerate `.k5login` (read by sshd) and `.k5keys` (read by this
/// program) from the keys registered in GitLab:
///
/// $ gssgitlab syncdb
///
/// Enable `GSSAPIAuthentication` and `ExposeAuthInfo` in sshd and make
/// `gssgitlab shell` the login shell of the service account.
///
/// # Security Considerations
///
/// Only the presence of `SSH_CONNECTION` distinguishes SSH sessions from
/// local invocations. SSH sessions whose authentication cannot be
/// determined, and GSSAPI sessions whose principal is not mapped, are
/// refused rather than given a shell.
#[derive(Parser)]
#[clap(version)]
struct Cli {
    /// Configuration file.
    #[clap(long, default_value = gssgitlab::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Home of the managed user; destination of `.k5login` and `.k5keys`.
    #[clap(long, alias = "gitlab_home")]
    gitlab_home: Option<PathBuf>,

    /// Absolute gitlab-shell path.
    #[clap(long, alias = "gitlab_shell")]
    gitlab_shell: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a new placeholder key for a principal.
    Newkey {
        /// Principal to generate the key for.
        principal: String,
    },

    /// Generate .k5login and .k5keys from keys registered in GitLab.
    Syncdb,

    /// GSSAPI to key identifier shell wrapper.
    #[clap(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        disable_help_flag = true
    )]
    Shell {
        /// Arguments the login shell was invoked with.
        #[clap(allow_hyphen_values = true, multiple_values = true)]
        args: Vec<String>,
    },
}

fn run(cli: Cli) -> ExitCode {
    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::Failure;
        }
    };

    if let Some(home) = cli.gitlab_home {
        config.gitlab_home = home;
    }
    if let Some(shell) = cli.gitlab_shell {
        config.gitlab_shell = shell;
    }

    match cli.command {
        Command::Newkey { principal } => {
            match keygen::generate(&config.keygen_command, &principal) {
                Ok(public_key) => {
                    println!("{}", public_key);
                    ExitCode::Success
                }
                Err(e) => {
                    error!("key generation failed: {}", e);
                    ExitCode::Failure
                }
            }
        }
        Command::Syncdb => match syncdb::sync(&config.psql_command, &config.key_store()) {
            Ok(report) => {
                for principal in &report.accepted {
                    println!("added {}", principal);
                }
                ExitCode::Success
            }
            Err(e) => {
                error!("database sync failed: {}", e);
                ExitCode::Failure
            }
        },
        Command::Shell { args } => Dispatcher::from_config(&config)
            .decide(&SessionEnv::from_process(), &args)
            .execute(),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let code = match Cli::try_parse() {
        Ok(cli) => run(cli),
        Err(e) => {
            let usage = e.use_stderr();
            // Nothing useful can be done if stderr is gone.
            let _ = e.print();

            if usage {
                ExitCode::Usage
            } else {
                ExitCode::Success
            }
        }
    };

    std::process::exit(code.code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("gssgitlab").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn shell_takes_raw_arguments() {
        let cli = parse(&["shell", "-c", "echo \"hi\" --now"]);

        match cli.command {
            Command::Shell { args } => assert_eq!(args, vec!["-c", "echo \"hi\" --now"]),
            _ => panic!("expected shell"),
        }
    }

    #[test]
    fn shell_passes_help_flag_through() {
        match parse(&["shell", "--help"]).command {
            Command::Shell { args } => assert_eq!(args, vec!["--help"]),
            _ => panic!("expected shell"),
        }
        match parse(&["shell", "-c", "git-upload-pack", "--", "-h"]).command {
            Command::Shell { args } => {
                assert_eq!(args, vec!["-c", "git-upload-pack", "--", "-h"])
            }
            _ => panic!("expected shell"),
        }
    }

    #[test]
    fn shell_without_arguments() {
        match parse(&["shell"]).command {
            Command::Shell { args } => assert!(args.is_empty()),
            _ => panic!("expected shell"),
        }
    }

    #[test]
    fn global_options_accept_historical_spelling() {
        let cli = parse(&[
            "--gitlab_home",
            "/srv/git",
            "--gitlab-shell",
            "/bin/echo",
            "syncdb",
        ]);

        assert_eq!(cli.gitlab_home, Some(PathBuf::from("/srv/git")));
        assert_eq!(cli.gitlab_shell, Some(PathBuf::from("/bin/echo")));
        assert!(matches!(cli.command, Command::Syncdb));
    }

    #[test]
    fn missing_subcommand_is_usage_error() {
        assert!(Cli::try_parse_from(["gssgitlab"]).is_err());
        assert!(Cli::try_parse_from(["gssgitlab", "bogus"]).is_err());
    }
}
