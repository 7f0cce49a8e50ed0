//! rolegate - admin CLI for the permission database.
//!
//! Usage: `rolegate <config.toml> <command> [args...]`

use anyhow::{Context, bail};
use rolegate::config::{self, Config};
use rolegate::{Rbac, UserRef};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
usage: rolegate <config.toml> <command> [args...]

commands:
  permission:create <name> [guard]
  role:create <name> [guard]
  role:give <role> <permission> [guard]
  user:assign <model> <id> <role>
  user:can <model> <id> <permission> [guard]
  show [guard]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "rolegate.toml".to_string());
    let Some(command) = args.next() else {
        eprintln!("{USAGE}");
        bail!("no command given");
    };
    let rest: Vec<String> = args.collect();

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    rolegate::metrics::init();
    let rbac = Rbac::connect(&config).await?;
    run(&rbac, &command, &rest).await
}

async fn run(rbac: &Rbac, command: &str, args: &[String]) -> anyhow::Result<()> {
    let arg = |i: usize| required(args, i, command);
    let opt = |i: usize| args.get(i).map(String::as_str);

    match command {
        "permission:create" => {
            let p = rbac.permissions().find_or_create(arg(0)?, opt(1)).await?;
            info!(id = %p.id, name = %p.name, guard = %p.guard_name, "Permission ready");
            println!("Permission `{}` created for guard `{}`", p.name, p.guard_name);
        }
        "role:create" => {
            let role = rbac.roles().find_or_create(arg(0)?, opt(1)).await?;
            info!(id = %role.id, name = %role.name, guard = %role.guard_name, "Role ready");
            println!("Role `{}` created for guard `{}`", role.name, role.guard_name);
        }
        "role:give" => {
            let role = rbac.roles().find_by_name(arg(0)?, opt(2)).await?;
            rbac.roles().give_permission_to(&role, arg(1)?).await?;
            println!("Role `{}` now has `{}`", role.name, arg(1)?);
        }
        "user:assign" => {
            let user = user_arg(arg(0)?, arg(1)?)?;
            rbac.authorization().assign_role(&user, arg(2)?).await?;
            println!("{user} now has role `{}`", arg(2)?);
        }
        "user:can" => {
            let user = user_arg(arg(0)?, arg(1)?)?;
            let granted = rbac
                .authorization()
                .has_permission(&user, arg(2)?, opt(3))
                .await?;
            println!("{}", if granted { "yes" } else { "no" });
            if !granted {
                bail!("{user} lacks `{}`", arg(2)?);
            }
        }
        "show" => show(rbac, opt(0)).await?,
        other => {
            eprintln!("{USAGE}");
            bail!("unknown command `{other}`");
        }
    }
    Ok(())
}

fn required<'a>(args: &'a [String], i: usize, command: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("missing argument {} for {command}\n\n{USAGE}", i + 1))
}

fn user_arg(model: &str, id: &str) -> anyhow::Result<UserRef> {
    let id = id
        .parse::<i64>()
        .with_context(|| format!("user id `{id}` is not an integer"))?;
    Ok(UserRef::new(model, id))
}

/// Print a role/permission matrix per guard.
async fn show(rbac: &Rbac, guard: Option<&str>) -> anyhow::Result<()> {
    let set = rbac.registrar().permissions().await?;
    let roles = rbac.roles().all().await?;

    let mut guards: Vec<&str> = set.iter().map(|p| p.guard_name.as_str()).collect();
    guards.extend(roles.iter().map(|r| r.guard_name.as_str()));
    guards.sort_unstable();
    guards.dedup();

    for g in guards.into_iter().filter(|g| guard.is_none_or(|want| want == *g)) {
        let guard_roles: Vec<_> = roles.iter().filter(|r| r.guard_name == g).collect();
        println!("Guard: {g}");
        let header: Vec<&str> = guard_roles.iter().map(|r| r.name.as_str()).collect();
        println!("  {:<24} {}", "", header.join("  "));
        for p in set.for_guard(g) {
            let marks: Vec<String> = guard_roles
                .iter()
                .map(|r| {
                    let mark = if set.role_has(r.id, p.id) { "x" } else { "." };
                    format!("{mark:^width$}", width = r.name.len())
                })
                .collect();
            println!("  {:<24} {}", p.name, marks.join("  "));
        }
        println!();
    }
    Ok(())
}
