//! Operating system collaborators: binary self-validation, command lookup,
//! and the final identity switch and exec.

use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::unistd::{execve, setresgid, setresuid, Gid, Uid};
use tracing::debug;

use crate::identity::{Group, User};
use crate::Error;

/// Check the mode and owner of the running binary
///
/// The binary must carry the set-user-ID bit and be owned by root:root.
pub fn check_self(mode: u32, uid: u32, gid: u32) -> Result<(), Error> {
    if mode & libc::S_ISUID as u32 == 0 {
        return Err(Error::SelfTrust("SUID is not set on runas".into()));
    }
    if uid != 0 || gid != 0 {
        return Err(Error::SelfTrust("runas owner should be 'root:root'".into()));
    }
    Ok(())
}

/// Validate the executable at `path` before any policy data is touched
pub fn validate_self(path: &Path) -> Result<(), Error> {
    let meta = std::fs::metadata(path)
        .map_err(|e| Error::SelfTrust(format!("{} : {}", path.display(), e)))?;
    check_self(meta.mode(), meta.uid(), meta.gid())
}

/// Locates executables for rules and requests
pub trait CommandResolver {
    /// Resolve `command` to an executable path
    ///
    /// With `search` a bare command name is looked up in `$PATH`. Without it
    /// the command must already be an absolute path.
    fn resolve(&self, command: &str, search: bool) -> Result<PathBuf, Error>;
}

/// Resolves commands against the real filesystem
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemResolver;

impl CommandResolver for SystemResolver {
    fn resolve(&self, command: &str, search: bool) -> Result<PathBuf, Error> {
        if search {
            return which::which(command).map_err(|_| Error::CommandNotFound(command.to_string()));
        }
        let path = Path::new(command);
        if !path.is_absolute() {
            return Err(Error::RelativePath(command.to_string()));
        }
        if !path.is_file() {
            return Err(Error::CommandNotFound(command.to_string()));
        }
        Ok(path.to_path_buf())
    }
}

/// `PATH` handed to every command
pub static SAFE_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin:/usr/local/bin:/usr/local/sbin";

/// Shell used when the target has none in the password database
static DEFAULT_SHELL: &str = "/bin/sh";

fn env_to_str<V: AsRef<[u8]>>(name: &str, value: V) -> Result<CString, Error> {
    let mut ev = name.as_bytes().to_vec();
    ev.push(b'=');
    ev.extend_from_slice(value.as_ref());
    CString::new(ev).map_err(|e| e.into())
}

/// Build the environment for a command run as `target`
///
/// Nothing is inherited from the caller, loader variables such as
/// `LD_PRELOAD` never reach the new process.
pub fn prepare_env(target: &User) -> Result<Vec<CString>, Error> {
    let shell = if target.shell().as_os_str().is_empty() {
        Path::new(DEFAULT_SHELL)
    } else {
        target.shell()
    };
    Ok(vec![
        env_to_str("HOME", target.home().as_os_str().as_bytes())?,
        env_to_str("LOGNAME", &target.name)?,
        env_to_str("PATH", SAFE_PATH)?,
        env_to_str("SHELL", shell.as_os_str().as_bytes())?,
        env_to_str("USER", &target.name)?,
    ])
}

/// Switch the real, effective and saved ids to the target user and group
///
/// Supplementary groups become those of `user` in the group database, plus
/// the target group.
pub fn set_identity(user: &User, group: &Group) -> Result<(), Error> {
    let gid = Gid::from_raw(group.gid);
    let uid = Uid::from_raw(user.uid);

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    nix::unistd::initgroups(&CString::new(user.name.as_bytes())?, gid)?;

    // group first, setgid is not permitted once root is gone
    setresgid(gid, gid, gid)?;
    setresuid(uid, uid, uid)?;
    Ok(())
}

/// Become `user`:`group` and replace the process with `path`
///
/// The command gets a fresh environment from [`prepare_env`]. Only returns
/// on failure.
pub fn run_as(
    user: &User,
    group: &Group,
    path: &Path,
    argv: &[String],
) -> Result<Infallible, Error> {
    let envp = prepare_env(user)?;
    let path_c = CString::new(path.as_os_str().as_bytes())?;
    let argv_c = argv
        .iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<CString>, _>>()?;

    set_identity(user, group)?;

    debug!(path = %path.display(), uid = user.uid, gid = group.gid, "exec");
    execve(&path_c, &argv_c, &envp).map_err(|e| Error::Exec {
        command: path.display().to_string(),
        reason: e.desc().to_string(),
    })
}
