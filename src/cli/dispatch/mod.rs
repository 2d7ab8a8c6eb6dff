//! Maps validated CLI arguments to an [`Action`].

use crate::cli::actions::{issue_token, server, Action};
use crate::cli::commands::{policy, store, token, ARG_AUTHORITY, ARG_PORT, ARG_SUBJECT, CMD_ISSUE_TOKEN};
use anyhow::{Context, Result};

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub) = matches.subcommand_matches(CMD_ISSUE_TOKEN) {
        let subject = sub
            .get_one::<String>(ARG_SUBJECT)
            .map(|subject| subject.trim().to_string())
            .filter(|subject| !subject.is_empty())
            .context("missing required argument: --subject")?;
        let authorities = sub
            .get_many::<String>(ARG_AUTHORITY)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        return Ok(Action::IssueToken(issue_token::Args {
            subject,
            authorities,
            store: store::Options::parse(sub)?,
            tokens: token::parse(sub)?,
        }));
    }

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    Ok(Action::Server(server::Args {
        port,
        store: store::Options::parse(matches)?,
        policy: policy::parse(matches)?,
        tokens: token::parse(matches)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn server_is_the_default_action() {
        temp_env::with_vars(
            [
                ("WARDEN_JWT_SECRET", Some(SECRET)),
                ("WARDEN_PORT", Some("9000")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
                match handler(&matches) {
                    Ok(Action::Server(args)) => assert_eq!(args.port, 9000),
                    other => panic!("unexpected action: {other:?}"),
                }
            },
        );
    }

    #[test]
    fn issue_token_collects_authorities() {
        temp_env::with_vars([("WARDEN_JWT_SECRET", Some(SECRET))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "warden",
                "--store",
                "memory",
                CMD_ISSUE_TOKEN,
                "--subject",
                " ops ",
                "--authority",
                "ROLE_ADMIN",
            ]);
            match handler(&matches) {
                Ok(Action::IssueToken(args)) => {
                    assert_eq!(args.subject, "ops");
                    assert_eq!(args.authorities, vec!["ROLE_ADMIN".to_string()]);
                    assert_eq!(args.store.backend, store::Backend::Memory);
                }
                other => panic!("unexpected action: {other:?}"),
            }
        });
    }

    #[test]
    fn missing_secret_is_reported() {
        temp_env::with_vars([("WARDEN_JWT_SECRET", None::<&str>)], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err
                    .to_string()
                    .contains("missing required argument: --jwt-secret"));
            }
        });
    }
}
