pub mod logging;
pub mod policy;
pub mod store;
pub mod token;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ArgAction, ColorChoice, Command,
};

pub const ARG_PORT: &str = "port";
pub const CMD_ISSUE_TOKEN: &str = "issue-token";
pub const ARG_SUBJECT: &str = "subject";
pub const ARG_AUTHORITY: &str = "authority";

fn issue_token() -> Command {
    Command::new(CMD_ISSUE_TOKEN)
        .about("Issue an access and refresh token pair and print it as JSON")
        .arg(
            Arg::new(ARG_SUBJECT)
                .long(ARG_SUBJECT)
                .help("Principal the tokens are issued to")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTHORITY)
                .long(ARG_AUTHORITY)
                .help("Authority granted to the principal, may be repeated")
                .action(ArgAction::Append),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("warden")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("WARDEN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .subcommand(issue_token());

    let command = store::with_args(command);
    let command = policy::with_args(command);
    let command = token::with_args(command);
    logging::with_args(command)
}
