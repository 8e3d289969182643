//! Command-line surface for inspecting a session: login, logout and permission checks.

pub mod outputformatter;

use anyhow::{anyhow, Result};

use crate::permissions::Requirement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Logout,
    WhoAmI,
    Permissions,
    Check(Requirement),
    Help,
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage:\n  {program} login <username> <password>\n  {program} logout\n  {program} whoami\n  {program} permissions\n  {program} check <permission>\n  {program} check <resource> <action>\n  {program} check --all <permission>...\n  {program} check --any <permission>...\n\nEnvironment:\n  INVENTORY_API_URL            backend base URL (default http://127.0.0.1:5000)\n  INVENTORY_SESSION_DIR        where the session is kept (default .inventory-session)\n  INVENTORY_HTTP_TIMEOUT_SECS  request timeout; unset uses the client default\n  INVENTORY_OUTPUT=json        print permissions as JSON\n  RUST_LOG                     log filter (default info)\n\nExit status of `check`: 0 granted, 1 denied, 2 error."
    )
}

/// Parse arguments after the program name.
pub fn parse_args(args: &[String]) -> Result<Command> {
    let mut it = args.iter().map(String::as_str);
    let Some(cmd) = it.next() else { return Ok(Command::Help) };
    let rest: Vec<&str> = it.collect();
    match cmd {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "login" => match rest.as_slice() {
            [u, p] => Ok(Command::Login { username: u.to_string(), password: p.to_string() }),
            _ => Err(anyhow!("login expects <username> <password>")),
        },
        "logout" if rest.is_empty() => Ok(Command::Logout),
        "whoami" if rest.is_empty() => Ok(Command::WhoAmI),
        "permissions" if rest.is_empty() => Ok(Command::Permissions),
        "check" => parse_check(&rest).map(Command::Check),
        other => Err(anyhow!("unknown or malformed command '{}'", other)),
    }
}

fn parse_check(rest: &[&str]) -> Result<Requirement> {
    match rest {
        [] => Err(anyhow!("check expects a permission, a resource and action, or --all/--any with a list")),
        ["--all", ids @ ..] | ["--any", ids @ ..] if ids.is_empty() => Err(anyhow!("{} expects at least one permission", rest[0])),
        ["--all", ids @ ..] => Ok(Requirement::list(ids.iter().copied(), true)),
        ["--any", ids @ ..] => Ok(Requirement::list(ids.iter().copied(), false)),
        [id] => Ok(Requirement::permission(*id)),
        [resource, action] => Ok(Requirement::resource_action(*resource, *action)),
        _ => Err(anyhow!("too many arguments for check")),
    }
}
