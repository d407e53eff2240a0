use std::fs::{File, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{fchown, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0, space0, space1};
use nom::combinator::{all_consuming, map, opt, rest, value};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;
use tracing::{debug, warn};

use crate::identity::{Directory, Identity, User, GROUP_SIGIL};
use crate::system::CommandResolver;
use crate::{CommandPattern, Error, Rule};

#[cfg(target_os = "freebsd")]
pub static CONFIG_PATH: &str = "/usr/local/etc/runas.conf";
#[cfg(not(target_os = "freebsd"))]
pub static CONFIG_PATH: &str = "/etc/runas.conf";

/// Required mode of the policy file: read-only for owner and group
pub const CONFIG_MODE: u32 = 0o440;

// Arbitrary maximum length for a config file
const MAX_CONFIG_LEN: u64 = 64 * 1024;

/// Origin field of a rule line
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    User(String),
    /// Every member of the named group
    Group(String),
}

/// Fields of a rule line before any account or path lookups
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleLine {
    pub origin: Origin,
    pub target_user: String,
    pub target_group: Option<String>,
    pub command: String,
    pub args: Option<String>,
}

/// Classification of one configuration line
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Line {
    Blank,
    Comment,
    Rule(RuleLine),
}

fn separator<'a>(token: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    delimited(space1, tag(token), space1)
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && c != ':' && c != GROUP_SIGIL
}

fn name_parser(i: &str) -> IResult<&str, &str> {
    take_while1(is_name_char)(i)
}

fn origin_parser(i: &str) -> IResult<&str, Origin> {
    alt((
        map(preceded(char(GROUP_SIGIL), name_parser), |g: &str| {
            Origin::Group(g.to_string())
        }),
        map(name_parser, |u: &str| Origin::User(u.to_string())),
    ))(i)
}

fn target_parser(i: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(name_parser, opt(preceded(char(':'), name_parser)))(i)
}

/// Command path, then everything up to the end of the line as literal arguments
fn command_parser(i: &str) -> IResult<&str, (&str, Option<&str>)> {
    let (rem, path) = take_while1(|c: char| !c.is_whitespace())(i)?;
    let args = rem.trim();
    Ok(("", (path, if args.is_empty() { None } else { Some(args) })))
}

fn comment_parser(i: &str) -> IResult<&str, ()> {
    value((), tuple((space0, char('#'), rest)))(i)
}

/// Parse `<origin> -> <user>[:<group>] :: <path> [<args>]`
pub fn rule_line_parser(i: &str) -> IResult<&str, RuleLine> {
    let (i, (_, origin, _, (user, group), _, (command, args))) = tuple((
        space0,
        origin_parser,
        separator("->"),
        target_parser,
        separator("::"),
        command_parser,
    ))(i)?;

    Ok((
        i,
        RuleLine {
            origin,
            target_user: user.to_string(),
            target_group: group.map(str::to_string),
            command: command.to_string(),
            args: args.map(str::to_string),
        },
    ))
}

/// Classify a single configuration line
pub fn line_parser(i: &str) -> IResult<&str, Line> {
    alt((
        value(Line::Comment, comment_parser),
        value(Line::Blank, all_consuming(multispace0)),
        map(rule_line_parser, Line::Rule),
    ))(i)
}

fn describe(e: nom::Err<nom::error::Error<&str>>) -> String {
    match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => format!(
            "couldn't parse line: {} at {:?}",
            e.code.description(),
            e.input
        ),
        nom::Err::Incomplete(_) => "couldn't parse line: incomplete data".into(),
    }
}

/// Parse one line of the policy file
pub fn parse_line(line: &str) -> Result<Line, Error> {
    match all_consuming(line_parser)(line) {
        Ok((_, parsed)) => Ok(parsed),
        Err(e) => Err(Error::parse(describe(e), line)),
    }
}

/// Resolve a parsed rule line into one Rule per origin user
///
/// Group origins expand to every member of the group, in group database
/// order. Every account must exist and the command must be an absolute path;
/// `$PATH` is never searched.
pub fn compile_line<D, R>(line: &RuleLine, dir: &D, resolver: &R) -> Result<Vec<Rule>, Error>
where
    D: Directory + ?Sized,
    R: CommandResolver + ?Sized,
{
    let origins = match &line.origin {
        Origin::User(name) => vec![dir.resolve_user(name)?],
        Origin::Group(name) => dir.group_members(name)?,
    };
    let origins = origins
        .into_iter()
        .map(Identity::require)
        .collect::<Result<Vec<User>, Error>>()?;

    let target_user = dir.resolve_user(&line.target_user)?;
    let target_group =
        dir.resolve_group(line.target_group.as_deref().unwrap_or(""), &target_user)?;
    let target_user = target_user.require()?;
    let target_group = target_group.require()?;

    let path = resolver.resolve(&line.command, false)?;
    let command = CommandPattern::new(&path.to_string_lossy(), line.args.as_deref())?;

    Ok(origins
        .into_iter()
        .map(|origin| Rule {
            origin,
            target_user: target_user.clone(),
            target_group: target_group.clone(),
            command: command.clone(),
        })
        .collect())
}

/// Parse policy text into rules, in file order
///
/// Any malformed or unresolvable line fails the whole parse.
pub fn parse_rules<D, R>(text: &str, dir: &D, resolver: &R) -> Result<Vec<Rule>, Error>
where
    D: Directory + ?Sized,
    R: CommandResolver + ?Sized,
{
    let mut rules = vec![];
    for raw in text.lines() {
        if let Line::Rule(line) = parse_line(raw)? {
            let compiled =
                compile_line(&line, dir, resolver).map_err(|e| Error::parse(e.to_string(), raw))?;
            rules.extend(compiled);
        }
    }
    Ok(rules)
}

/// Check the permission bits of the policy file
pub fn check_mode(mode: u32) -> Result<(), Error> {
    let bits = mode & 0o7777;
    if bits != CONFIG_MODE {
        return Err(Error::ConfigIntegrity(format!(
            "invalid permission bits: {:o}",
            bits
        )));
    }
    Ok(())
}

/// Check that the policy file is owned by root:root
pub fn check_owner<D: Directory + ?Sized>(uid: u32, gid: u32, dir: &D) -> Result<(), Error> {
    if uid == 0 && gid == 0 {
        return Ok(());
    }
    let user = dir
        .user_by_id(uid)
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| uid.to_string());
    let group = dir
        .group_by_id(gid)
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| gid.to_string());
    Err(Error::ConfigIntegrity(format!(
        "invalid file owner: {}:{}",
        user, group
    )))
}

// O_NONBLOCK keeps a fifo from stalling the open, regular files ignore it
fn open_config(path: &Path, flags: i32) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(flags | libc::O_NONBLOCK)
        .open(path)
}

fn open_nofollow(path: &Path) -> io::Result<File> {
    open_config(path, libc::O_NOFOLLOW)
}

fn check_regular(file: &File, path: &Path) -> Result<std::fs::Metadata, Error> {
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(Error::ConfigIntegrity(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    Ok(meta)
}

/// Read at most `MAX_CONFIG_LEN` bytes, whatever the file claims its size is
fn read_config(file: &File) -> Result<String, Error> {
    let mut buf = Vec::new();
    file.take(MAX_CONFIG_LEN + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > MAX_CONFIG_LEN {
        return Err(Error::MaxConfigLen(buf.len() as u64));
    }
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Create an empty policy file, read-only for root:root
///
/// An existing file is left in place, so concurrent creation is harmless.
pub fn materialize(path: &Path) -> Result<(), Error> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .mode(CONFIG_MODE)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)?;
    file.set_permissions(Permissions::from_mode(CONFIG_MODE))?;
    fchown(&file, Some(0), Some(0))?;
    debug!(path = %path.display(), "created empty policy file");
    Ok(())
}

/// The validated set of rules loaded from a policy file
#[derive(Clone, Debug, Default)]
pub struct PolicyStore {
    rules: Vec<Rule>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the policy file at `path` into a fresh store
    pub fn open<D, R>(path: &Path, dir: &D, resolver: &R) -> Result<Self, Error>
    where
        D: Directory + ?Sized,
        R: CommandResolver + ?Sized,
    {
        let mut store = Self::new();
        store.load(path, dir, resolver)?;
        Ok(store)
    }

    /// Replace the rule set with the contents of the policy file at `path`
    ///
    /// A missing file is created empty first. The file must be mode 0440 and
    /// owned by root:root. On any failure the store is left empty.
    pub fn load<D, R>(&mut self, path: &Path, dir: &D, resolver: &R) -> Result<(), Error>
    where
        D: Directory + ?Sized,
        R: CommandResolver + ?Sized,
    {
        self.rules.clear();

        let file = match open_nofollow(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                materialize(path)?;
                open_nofollow(path)?
            }
            Err(e) => return Err(e.into()),
        };

        let meta = check_regular(&file, path)?;
        let checked =
            check_mode(meta.mode()).and_then(|_| check_owner(meta.uid(), meta.gid(), dir));
        if let Err(e) = checked {
            warn!(path = %path.display(), error = %e, "refusing policy file");
            return Err(e);
        }

        let text = read_config(&file)?;
        self.rules = parse_rules(&text, dir, resolver)?;
        debug!(path = %path.display(), rules = self.rules.len(), "loaded policy");
        Ok(())
    }

    /// Parse the policy file at `path` without the mode and owner checks
    ///
    /// Used to test a configuration after privileges have been dropped.
    pub fn read<D, R>(path: &Path, dir: &D, resolver: &R) -> Result<Self, Error>
    where
        D: Directory + ?Sized,
        R: CommandResolver + ?Sized,
    {
        let file = open_config(path, 0)?;
        check_regular(&file, path)?;
        let text = read_config(&file)?;
        Ok(Self {
            rules: parse_rules(&text, dir, resolver)?,
        })
    }

    /// Rules in file order, group members expanded in place
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a PolicyStore {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
