use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;
use runas::system::{CommandResolver, SystemResolver};

fn runas<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_runas"))
        .args(args)
        .env_remove("RUNAS_LOG")
        .output()
        .unwrap()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// Name of the invoking user, if the password database knows it
fn whoami() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
}

fn write_policy(dir: &Path, text: &str) -> String {
    let path = dir.join("runas.conf");
    fs::write(&path, text).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_usage_on_too_few_args() {
    let version = format!(
        "version: {}, license: {}",
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_LICENSE")
    );
    for args in [&["bob"][..], &[][..]] {
        let out = runas(args);
        assert_eq!(out.status.code(), Some(0));
        assert!(stdout(&out).contains("Usage:"));
        assert!(stdout(&out).contains(&version));
    }
}

#[test]
fn test_error_is_one_line() {
    // a freshly built binary is never setuid root
    let out = runas(["nobody", "ls"]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stderr(&out), "runas: SUID is not set on runas\n");
    assert_eq!(stdout(&out), "");
}

#[test]
fn test_check_permit() {
    let me = match whoami() {
        Some(name) => name,
        None => return,
    };
    let id = SystemResolver.resolve("id", true).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let conf = write_policy(
        tmp.path(),
        &format!("{} -> root :: {} -u\n", me, id.display()),
    );

    let out = runas(["-C", conf.as_str(), "root", "id", "-u"]);
    assert_eq!(stdout(&out), "permit\n");
    assert_eq!(out.status.code(), Some(0));
}

#[test]
fn test_check_deny() {
    // root is never refused
    if nix::unistd::getuid().is_root() {
        return;
    }
    let me = match whoami() {
        Some(name) => name,
        None => return,
    };
    let id = SystemResolver.resolve("id", true).unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let conf = write_policy(
        tmp.path(),
        &format!("{} -> root :: {} -u\n", me, id.display()),
    );

    let out = runas(["-C", conf.as_str(), "root", "id", "-g"]);
    assert_eq!(stdout(&out), "deny\n");
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn test_check_rejects_fifo() {
    // root is let through before the policy is read
    if nix::unistd::getuid().is_root() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let fifo = tmp.path().join("fifo.conf");
    nix::unistd::mkfifo(&fifo, nix::sys::stat::Mode::from_bits_truncate(0o644)).unwrap();

    let out = runas([
        OsStr::new("-C"),
        fifo.as_os_str(),
        OsStr::new("root"),
        OsStr::new("id"),
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).starts_with("runas: "));
}
