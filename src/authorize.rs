use tracing::debug;

use crate::config::PolicyStore;
use crate::identity::{Group, User};
use crate::{Error, Rule};

/// What the invoking user wants to do
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    /// The invoking user, looked up from the real uid
    pub caller: &'a User,
    pub target_user: &'a User,
    pub target_group: &'a Group,
    /// Resolved command path
    pub command: &'a str,
    pub args: &'a [String],
}

impl<'a> Request<'a> {
    /// The command path followed by every argument, joined with single spaces
    pub fn command_line(&self) -> String {
        let mut line = self.command.to_string();
        for arg in self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Error describing this request being refused
    pub fn denied(&self) -> Error {
        Error::AuthorizationDenied {
            caller: self.caller.name.clone(),
            command: self.command_line(),
            user: self.target_user.name.clone(),
            group: self.target_group.name.clone(),
        }
    }
}

/// Check if a request may skip the policy file entirely
///
/// True for the superuser (uid 0, primary gid 0), and for callers asking to
/// run as their own uid and primary gid.
pub fn may_bypass(caller: &User, target_user: &User, target_group: &Group) -> bool {
    if caller.is_root() {
        return true;
    }
    caller.uid == target_user.uid && caller.gid == target_group.gid
}

/// Match a single rule against the caller's uid, targets and command line
pub fn match_rule(
    rule: &Rule,
    caller_uid: u32,
    target_user: &User,
    target_group: &Group,
    command_line: &str,
) -> bool {
    rule.origin.uid == caller_uid
        && rule.target_user.uid == target_user.uid
        && rule.target_group.gid == target_group.gid
        && rule.command.matches(command_line)
}

/// Find the first rule, in load order, permitting the request
pub fn first_match<'r>(request: &Request<'_>, rules: &'r [Rule]) -> Option<&'r Rule> {
    let command_line = request.command_line();
    rules.iter().find(|rule| {
        match_rule(
            rule,
            request.caller.uid,
            request.target_user,
            request.target_group,
            &command_line,
        )
    })
}

/// Decide whether any rule permits the request
pub fn decide(request: &Request<'_>, rules: &[Rule]) -> bool {
    first_match(request, rules).is_some()
}

/// Authorize a request, consulting the policy only when no bypass applies
///
/// `load` is called at most once, and only after the bypass check fails.
pub fn authorize<F>(request: &Request<'_>, load: F) -> Result<(), Error>
where
    F: FnOnce() -> Result<PolicyStore, Error>,
{
    if may_bypass(request.caller, request.target_user, request.target_group) {
        debug!(caller = %request.caller.name, "policy bypassed");
        return Ok(());
    }

    let store = load()?;
    match first_match(request, store.rules()) {
        Some(rule) => {
            debug!(
                caller = %request.caller.name,
                command = rule.command.path(),
                "permitted by rule"
            );
            Ok(())
        }
        None => Err(request.denied()),
    }
}
