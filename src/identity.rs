use std::fmt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};

use crate::Error;

/// Prefix marking a rule origin as a group reference
pub const GROUP_SIGIL: char = '%';

/// Kind of account an identity refers to
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Kind {
    User,
    Group,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// Behavior shared by user and group accounts
pub trait Account: Clone + fmt::Debug {
    const KIND: Kind;

    /// Numeric uid or gid
    fn id(&self) -> u32;

    fn name(&self) -> &str;
}

/// Entry from the password database
///
/// Two users are equal iff their uids are equal.
#[derive(Clone, Debug)]
pub struct User {
    pub name: String,
    pub uid: u32,
    /// Primary group
    pub gid: u32,
    pub home: PathBuf,
    /// Login shell, may be empty
    pub shell: PathBuf,
}

impl User {
    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }

    /// Superuser account and superuser primary group
    pub fn is_root(&self) -> bool {
        self.uid == 0 && self.gid == 0
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for User {}

impl Account for User {
    const KIND: Kind = Kind::User;

    fn id(&self) -> u32 {
        self.uid
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl From<nix::unistd::User> for User {
    fn from(u: nix::unistd::User) -> Self {
        Self {
            name: u.name,
            uid: u.uid.as_raw(),
            gid: u.gid.as_raw(),
            home: u.dir,
            shell: u.shell,
        }
    }
}

/// Entry from the group database
///
/// Two groups are equal iff their gids are equal.
#[derive(Clone, Debug)]
pub struct Group {
    pub name: String,
    pub gid: u32,
    /// Names of the supplementary members
    pub members: Vec<String>,
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.gid == other.gid
    }
}

impl Eq for Group {}

impl Account for Group {
    const KIND: Kind = Kind::Group;

    fn id(&self) -> u32 {
        self.gid
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl From<nix::unistd::Group> for Group {
    fn from(g: nix::unistd::Group) -> Self {
        Self {
            name: g.name,
            gid: g.gid.as_raw(),
            members: g.mem,
        }
    }
}

/// Result of resolving a user or group spec
///
/// A spec that names no account is not an error, it resolves to `NotFound`
/// and callers check `exists()` before use.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Identity<A> {
    Found(A),
    NotFound(String),
}

impl<A: Account> Identity<A> {
    fn from_lookup(account: Option<A>, spec: &str) -> Self {
        match account {
            Some(a) => Self::Found(a),
            None => Self::NotFound(spec.to_string()),
        }
    }

    pub fn exists(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(&self) -> Option<&A> {
        match self {
            Self::Found(a) => Some(a),
            Self::NotFound(_) => None,
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.found().map(|a| a.id())
    }

    /// Account name, or the unresolved spec
    pub fn name(&self) -> &str {
        match self {
            Self::Found(a) => a.name(),
            Self::NotFound(spec) => spec,
        }
    }

    /// Unwrap the account, failing with `IdentityNotFound`
    pub fn require(self) -> Result<A, Error> {
        match self {
            Self::Found(a) => Ok(a),
            Self::NotFound(name) => Err(Error::IdentityNotFound {
                kind: A::KIND,
                name,
            }),
        }
    }
}

/// Parse an all-digit spec as a numeric id
///
/// Returns `None` for names, and `InvalidId` for digit strings that do not
/// fit an id.
pub fn parse_id(spec: &str) -> Result<Option<u32>, Error> {
    if spec.is_empty() || !spec.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(None);
    }
    spec.parse::<u32>()
        .map(Some)
        .map_err(|_| Error::InvalidId(spec.to_string()))
}

/// Account database lookups
///
/// Lookups return `Ok(None)` for accounts that do not exist; errors are
/// reserved for failures of the database itself.
pub trait Directory {
    fn user_by_name(&self, name: &str) -> Result<Option<User>, Error>;

    fn user_by_id(&self, uid: u32) -> Result<Option<User>, Error>;

    fn group_by_name(&self, name: &str) -> Result<Option<Group>, Error>;

    fn group_by_id(&self, gid: u32) -> Result<Option<Group>, Error>;

    /// Resolve a user name or numeric uid
    fn resolve_user(&self, spec: &str) -> Result<Identity<User>, Error> {
        let user = match parse_id(spec)? {
            Some(uid) => self.user_by_id(uid)?,
            None if spec.is_empty() => None,
            None => self.user_by_name(spec)?,
        };
        Ok(Identity::from_lookup(user, spec))
    }

    /// Resolve a group name or numeric gid
    ///
    /// An empty spec resolves to the primary group of `context`.
    fn resolve_group(
        &self,
        spec: &str,
        context: &Identity<User>,
    ) -> Result<Identity<Group>, Error> {
        if spec.is_empty() {
            return match context.found() {
                Some(user) => {
                    let gid = user.gid();
                    Ok(Identity::from_lookup(
                        self.group_by_id(gid)?,
                        &gid.to_string(),
                    ))
                }
                None => Ok(Identity::NotFound(String::new())),
            };
        }
        let group = match parse_id(spec)? {
            Some(gid) => self.group_by_id(gid)?,
            None => self.group_by_name(spec)?,
        };
        Ok(Identity::from_lookup(group, spec))
    }

    /// Resolve every member of the group `name`, in database order
    ///
    /// Fails if the group itself does not exist; members are returned
    /// unchecked.
    fn group_members(&self, name: &str) -> Result<Vec<Identity<User>>, Error> {
        let group = self
            .group_by_name(name)?
            .ok_or_else(|| Error::IdentityNotFound {
                kind: Kind::Group,
                name: name.to_string(),
            })?;
        group
            .members
            .iter()
            .map(|m| self.resolve_user(m))
            .collect()
    }
}

/// The system password and group databases
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemDirectory;

impl Directory for SystemDirectory {
    fn user_by_name(&self, name: &str) -> Result<Option<User>, Error> {
        Ok(nix::unistd::User::from_name(name)?.map(User::from))
    }

    fn user_by_id(&self, uid: u32) -> Result<Option<User>, Error> {
        Ok(nix::unistd::User::from_uid(Uid::from_raw(uid))?.map(User::from))
    }

    fn group_by_name(&self, name: &str) -> Result<Option<Group>, Error> {
        Ok(nix::unistd::Group::from_name(name)?.map(Group::from))
    }

    fn group_by_id(&self, gid: u32) -> Result<Option<Group>, Error> {
        Ok(nix::unistd::Group::from_gid(Gid::from_raw(gid))?.map(Group::from))
    }
}
