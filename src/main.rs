/* $Id: runas, v0.1.0 2021/07/15 orvi Exp $ */
/*
 * NoCopyright () 2021 orvi
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

use std::convert::Infallible;
use std::env;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{CommandFactory, Parser};
use nix::unistd::{getgid, getuid, setresgid, setresuid};
use tracing_subscriber::EnvFilter;

use runas::authorize::{authorize, Request};
use runas::config::{PolicyStore, CONFIG_PATH};
use runas::identity::Kind;
use runas::system::{self, CommandResolver, SystemResolver};
use runas::{Directory, Error, Group, SystemDirectory, User};

static APP: &str = env!("CARGO_PKG_NAME");
static VERSION: &str = env!("CARGO_PKG_VERSION");
static LICENSE: &str = env!("CARGO_PKG_LICENSE");

/// Log filter, honored only when the real uid is root
static LOG_ENV: &str = "RUNAS_LOG";

#[derive(Parser, Debug)]
#[command(name = "runas", version, about = "Run a command as another user and group")]
struct Cli {
    /// Check CONFIG as the invoking user and print permit or deny
    #[arg(short = 'C', long = "config", value_name = "CONFIG")]
    check: Option<PathBuf>,

    /// Target user and optional group, by name or numeric id
    #[arg(value_name = "USER[:GROUP]")]
    spec: Option<String>,

    /// Command to run, followed by its arguments
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    command: Vec<String>,
}

fn usage() -> ! {
    println!("{}", Cli::command().render_usage());
    println!();
    println!("version: {}, license: {}", VERSION, LICENSE);
    exit(0);
}

fn init_logging() {
    let filter = if getuid().is_root() {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    } else {
        EnvFilter::new("off")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Split `user[:group]`, an absent group is empty
fn split_spec(spec: &str) -> (&str, &str) {
    spec.split_once(':').unwrap_or((spec, ""))
}

/// Lookup the invoking user from the real uid
fn caller(dir: &SystemDirectory) -> Result<User, Error> {
    let uid = getuid().as_raw();
    dir.user_by_id(uid)?.ok_or(Error::IdentityNotFound {
        kind: Kind::User,
        name: uid.to_string(),
    })
}

/// Resolve the target user and group, both must exist
fn targets(dir: &SystemDirectory, spec: &str) -> Result<(User, Group), Error> {
    let (user_spec, group_spec) = split_spec(spec);
    let user = dir.resolve_user(user_spec)?;
    let group = dir.resolve_group(group_spec, &user)?;
    Ok((user.require()?, group.require()?))
}

fn checkconfig(config: &Path, spec: &str, cmd: &str, cmd_args: &[String]) -> Result<bool, Error> {
    let (uid, gid) = (getuid(), getgid());
    setresgid(gid, gid, gid)?;
    setresuid(uid, uid, uid)?;

    let dir = SystemDirectory;
    let user = caller(&dir)?;
    let (target_user, target_group) = targets(&dir, spec)?;
    let path = SystemResolver.resolve(cmd, true)?;
    let path = path.to_string_lossy();

    let request = Request {
        caller: &user,
        target_user: &target_user,
        target_group: &target_group,
        command: &path,
        args: cmd_args,
    };
    match authorize(&request, || PolicyStore::read(config, &dir, &SystemResolver)) {
        Ok(()) => Ok(true),
        Err(Error::AuthorizationDenied { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

fn runas(spec: &str, cmd: &str, cmd_args: &[String]) -> Result<Infallible, Error> {
    // the binary itself must be trusted before anything else is looked at
    let exe = env::current_exe()?;
    system::validate_self(&exe)?;

    let dir = SystemDirectory;
    let user = caller(&dir)?;
    let (target_user, target_group) = targets(&dir, spec)?;
    let path = SystemResolver.resolve(cmd, true)?;
    let path_str = path.to_string_lossy();

    let request = Request {
        caller: &user,
        target_user: &target_user,
        target_group: &target_group,
        command: &path_str,
        args: cmd_args,
    };
    authorize(&request, || {
        PolicyStore::open(Path::new(CONFIG_PATH), &dir, &SystemResolver)
    })?;

    // add command and command arguments
    let mut argv = Vec::with_capacity(1 + cmd_args.len());
    argv.push(cmd.to_string());
    argv.extend_from_slice(cmd_args);

    system::run_as(&target_user, &target_group, &path, &argv)
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(c) => c,
        Err(e) => {
            let _ = e.print();
            exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    init_logging();

    let (spec, cmd, cmd_args) = match (cli.spec.as_deref(), cli.command.split_first()) {
        (Some(spec), Some((cmd, cmd_args))) => (spec, cmd, cmd_args),
        _ => usage(),
    };

    if let Some(config) = cli.check.as_deref() {
        match checkconfig(config, spec, cmd, cmd_args) {
            Ok(true) => {
                println!("permit");
                exit(0);
            }
            Ok(false) => {
                println!("deny");
                exit(1);
            }
            Err(e) => {
                eprintln!("{}: {}", APP, e);
                exit(1);
            }
        }
    }

    match runas(spec, cmd, cmd_args) {
        Ok(never) => match never {},
        Err(e) => {
            eprintln!("{}: {}", APP, e);
            exit(1);
        }
    }
}
