//! User and group lookup.
//!
//! Ownership is resolved through the [`IdentityLookup`] trait so that the system user database
//! ([`SystemIdentities`], backed by `uzers`) can be swapped for a fixed table
//! ([`IdentityTable`]) when the result has to be deterministic.

use uzers::{get_group_by_gid, get_group_by_name, get_user_by_name, get_user_by_uid, gid_t, uid_t};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: u32,
    pub name: String,
    pub primary_gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub gid: u32,
    pub name: String,
}

pub trait IdentityLookup {
    fn user_by_id(&self, uid: u32) -> Option<User>;
    fn user_by_name(&self, name: &str) -> Option<User>;
    fn group_by_id(&self, gid: u32) -> Option<Group>;
    fn group_by_name(&self, name: &str) -> Option<Group>;
}

impl<T: IdentityLookup + ?Sized> IdentityLookup for &T {
    fn user_by_id(&self, uid: u32) -> Option<User> {
        (**self).user_by_id(uid)
    }

    fn user_by_name(&self, name: &str) -> Option<User> {
        (**self).user_by_name(name)
    }

    fn group_by_id(&self, gid: u32) -> Option<Group> {
        (**self).group_by_id(gid)
    }

    fn group_by_name(&self, name: &str) -> Option<Group> {
        (**self).group_by_name(name)
    }
}

/// The host's user and group databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentities;

impl From<uzers::User> for User {
    fn from(user: uzers::User) -> Self {
        User {
            uid: user.uid(),
            name: user.name().to_string_lossy().into_owned(),
            primary_gid: user.primary_group_id(),
        }
    }
}

impl From<uzers::Group> for Group {
    fn from(group: uzers::Group) -> Self {
        Group {
            gid: group.gid(),
            name: group.name().to_string_lossy().into_owned(),
        }
    }
}

impl IdentityLookup for SystemIdentities {
    fn user_by_id(&self, uid: u32) -> Option<User> {
        get_user_by_uid(uid as uid_t).map(User::from)
    }

    fn user_by_name(&self, name: &str) -> Option<User> {
        get_user_by_name(name).map(User::from)
    }

    fn group_by_id(&self, gid: u32) -> Option<Group> {
        get_group_by_gid(gid as gid_t).map(Group::from)
    }

    fn group_by_name(&self, name: &str) -> Option<Group> {
        get_group_by_name(name).map(Group::from)
    }
}

/// A fixed set of users and groups.  Anything not in the table fails to resolve.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    users: Vec<User>,
    groups: Vec<Group>,
}

impl IdentityTable {
    pub fn with_user(mut self, uid: u32, name: &str, primary_gid: u32) -> Self {
        self.users.push(User {
            uid,
            name: name.to_string(),
            primary_gid,
        });
        self
    }

    pub fn with_group(mut self, gid: u32, name: &str) -> Self {
        self.groups.push(Group {
            gid,
            name: name.to_string(),
        });
        self
    }
}

impl IdentityLookup for IdentityTable {
    fn user_by_id(&self, uid: u32) -> Option<User> {
        self.users.iter().find(|u| u.uid == uid).cloned()
    }

    fn user_by_name(&self, name: &str) -> Option<User> {
        self.users.iter().find(|u| u.name == name).cloned()
    }

    fn group_by_id(&self, gid: u32) -> Option<Group> {
        self.groups.iter().find(|g| g.gid == gid).cloned()
    }

    fn group_by_name(&self, name: &str) -> Option<Group> {
        self.groups.iter().find(|g| g.name == name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_table_lookup() {
        let table = IdentityTable::default()
            .with_user(1000, "alice", 100)
            .with_group(100, "users");

        assert_eq!(table.user_by_id(1000).unwrap().name, "alice");
        assert_eq!(table.user_by_name("alice").unwrap().primary_gid, 100);
        assert_eq!(table.group_by_name("users").unwrap().gid, 100);
        assert_eq!(table.group_by_id(100).unwrap().name, "users");
        assert_eq!(table.user_by_id(0), None);
        assert_eq!(table.group_by_name("wheel"), None);
    }

    #[test]
    fn test_system_root() {
        // uid 0 is present in every passwd database we'd run against
        if let Some(root) = SystemIdentities.user_by_id(0) {
            assert_eq!(root.uid, 0);
            assert_eq!(SystemIdentities.user_by_name(&root.name), Some(root));
        }
    }
}
