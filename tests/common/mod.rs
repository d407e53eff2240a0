#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use runas::system::CommandResolver;
use runas::{Directory, Error, Group, User};

/// Fixed account database for policy tests
pub struct Accounts {
    users: BTreeMap<String, User>,
    groups: BTreeMap<String, Group>,
}

impl Accounts {
    pub fn new() -> Self {
        let mut accounts = Self {
            users: BTreeMap::new(),
            groups: BTreeMap::new(),
        };
        for (name, id) in &[
            ("root", 0),
            ("daemon", 1),
            ("alice", 1000),
            ("bob", 1001),
            ("carol", 1002),
        ] {
            accounts.add_user(name, *id, *id);
            accounts.add_group(name, *id, &[]);
        }
        accounts.add_group("staff", 50, &["alice", "bob"]);
        accounts
    }

    pub fn add_user(&mut self, name: &str, uid: u32, gid: u32) {
        let home = if uid == 0 {
            PathBuf::from("/root")
        } else {
            PathBuf::from("/home").join(name)
        };
        self.users.insert(
            name.to_string(),
            User {
                name: name.to_string(),
                uid,
                gid,
                home,
                shell: PathBuf::from("/bin/sh"),
            },
        );
    }

    pub fn add_group(&mut self, name: &str, gid: u32, members: &[&str]) {
        self.groups.insert(
            name.to_string(),
            Group {
                name: name.to_string(),
                gid,
                members: members.iter().map(|m| m.to_string()).collect(),
            },
        );
    }

    pub fn user(&self, name: &str) -> User {
        self.users[name].clone()
    }

    pub fn group(&self, name: &str) -> Group {
        self.groups[name].clone()
    }
}

impl Directory for Accounts {
    fn user_by_name(&self, name: &str) -> Result<Option<User>, Error> {
        Ok(self.users.get(name).cloned())
    }

    fn user_by_id(&self, uid: u32) -> Result<Option<User>, Error> {
        Ok(self.users.values().find(|u| u.uid == uid).cloned())
    }

    fn group_by_name(&self, name: &str) -> Result<Option<Group>, Error> {
        Ok(self.groups.get(name).cloned())
    }

    fn group_by_id(&self, gid: u32) -> Result<Option<Group>, Error> {
        Ok(self.groups.values().find(|g| g.gid == gid).cloned())
    }
}

/// Accepts any absolute command path
pub struct AbsolutePaths;

impl CommandResolver for AbsolutePaths {
    fn resolve(&self, command: &str, _search: bool) -> Result<PathBuf, Error> {
        if command.starts_with('/') {
            Ok(PathBuf::from(command))
        } else {
            Err(Error::RelativePath(command.to_string()))
        }
    }
}

pub fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|a| a.to_string()).collect()
}
