pub mod authorize;
pub mod config;
mod error;
pub mod identity;
pub mod system;

pub use crate::error::Error;
pub use crate::identity::{Directory, Group, Identity, SystemDirectory, User};

use regex::Regex;

/// Matcher for a rule's command path and optional literal arguments
///
/// Matches against the full command line: the command path followed by its
/// arguments joined with single spaces. Path and arguments are escaped, so
/// pattern metacharacters in a configured rule match only themselves.
#[derive(Clone, Debug)]
pub struct CommandPattern {
    path: String,
    args: Option<String>,
    regex: Regex,
}

impl CommandPattern {
    /// Compile a pattern for `path`
    ///
    /// Without `args` any argument list (including none) is accepted, with
    /// `args` the command line must be the path, whitespace, then exactly
    /// that text.
    pub fn new(path: &str, args: Option<&str>) -> Result<Self, regex::Error> {
        let pattern = match args {
            None => format!(r"(?s)\A{}(?:\s.*)?\z", regex::escape(path)),
            Some(a) => format!(r"(?s)\A{}\s+{}\z", regex::escape(path), regex::escape(a)),
        };
        Ok(Self {
            path: path.to_string(),
            args: args.map(str::to_string),
            regex: Regex::new(&pattern)?,
        })
    }

    /// The absolute command path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The literal arguments, `None` when any arguments are accepted
    pub fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    pub fn matches(&self, command_line: &str) -> bool {
        self.regex.is_match(command_line)
    }
}

impl PartialEq for CommandPattern {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.args == other.args
    }
}

impl Eq for CommandPattern {}

/// Rule permitting a user to run a command as a target user and group
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rule {
    pub origin: User,
    pub target_user: User,
    pub target_group: Group,
    pub command: CommandPattern,
}

impl Rule {
    /// The user permitted to invoke the rule
    pub fn origin(&self) -> &User {
        &self.origin
    }

    /// Run the command as this user
    pub fn target_user(&self) -> &User {
        &self.target_user
    }

    /// Run the command with this group
    pub fn target_group(&self) -> &Group {
        &self.target_group
    }

    /// The command pattern for the Rule
    pub fn command(&self) -> &CommandPattern {
        &self.command
    }
}
