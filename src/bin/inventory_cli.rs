use std::process::ExitCode;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use inventory_access::cli::outputformatter::{gate_label, print_permissions, status_label};
use inventory_access::cli::{parse_args, usage, Command};
use inventory_access::config::Config;
use inventory_access::permissions::GateState;
use inventory_access::session::AccessContext;

#[tokio::main]
async fn main() -> ExitCode {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "inventory-access".to_string());
    match run(&program, args.get(1..).unwrap_or(&[])).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(program: &str, args: &[String]) -> anyhow::Result<ExitCode> {
    let cmd = parse_args(args).with_context(|| format!("run `{program} --help` for usage"))?;
    match cmd {
        Command::Help => println!("{}", usage(program)),
        Command::Login { username, password } => {
            let ctx = open_session()?;
            let cred = ctx.login(&username, &password).await.context("login failed")?;
            println!("logged in as {} ({})", cred.username(), cred.user_id());
            println!("permissions: {}", status_label(ctx.snapshot().status()));
        }
        Command::Logout => {
            open_session()?.logout();
            println!("logged out");
        }
        Command::WhoAmI => match open_session()?.store().get() {
            Some(cred) => {
                let id = cred.identity();
                println!("{} ({}) type={}", id.username, id.user_id, id.user_type_id.as_deref().unwrap_or("-"));
            }
            None => {
                println!("not logged in");
                return Ok(ExitCode::from(1));
            }
        },
        Command::Permissions => {
            let ctx = open_session()?;
            // failures are already reflected in the snapshot status
            let _ = ctx.resume().await;
            print_permissions(&ctx.snapshot());
        }
        Command::Check(requirement) => {
            let ctx = open_session()?;
            let mut watcher = ctx.gate(requirement);
            let loaded = ctx.resume().await;
            let state = watcher.settled().await.unwrap_or(GateState::Denied);
            if let Err(e) = loaded {
                eprintln!("warning: {}", e);
            }
            println!("{}", gate_label(state));
            return Ok(if state == GateState::Granted { ExitCode::SUCCESS } else { ExitCode::from(1) });
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn open_session() -> anyhow::Result<AccessContext> {
    let config = Config::from_env().context("invalid configuration")?;
    info!("inventory-access: api_url='{}', session_dir='{}'", config.api_url, config.session_dir.display());
    let ctx = AccessContext::from_config(&config).context("failed to build session")?;
    ctx.spawn_expiry_listener();
    Ok(ctx)
}
