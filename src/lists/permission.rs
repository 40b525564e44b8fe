//! Permission evaluation for lists
//!
//! Every access decision in the crate goes through [`effective_access`] and
//! [`authorize`]; nothing re-derives permissions from the raw grant list.

use std::fmt;
use std::str::FromStr;

use listshare_auth::normalize_email;
use serde::{Deserialize, Serialize};

use super::types::List;
use crate::error::{Error, Result};

/// Grant level, totally ordered `Read < Write < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[serde(alias = "reader", alias = "viewer")]
    Read,
    #[serde(alias = "editor")]
    Write,
    Admin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        })
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "reader" | "viewer" => Ok(Permission::Read),
            "write" | "editor" => Ok(Permission::Write),
            "admin" => Ok(Permission::Admin),
            other => Err(Error::invalid_argument(format!("unknown permission: {other}"))),
        }
    }
}

/// What a principal may do on a list. `None` sorts below every grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Access {
    None,
    Granted(Permission),
}

impl Access {
    pub fn permission(self) -> Option<Permission> {
        match self {
            Access::None => None,
            Access::Granted(p) => Some(p),
        }
    }

    pub fn allows(self, action: Action) -> bool {
        self >= Access::Granted(action.required())
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::None => f.write_str("none"),
            Access::Granted(p) => p.fmt(f),
        }
    }
}

/// Gated actions on a list and the tasks in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// See the list and its tasks
    Read,
    /// Change list fields, create or change tasks
    Edit,
    /// Delete the list, share it, change or revoke grants
    Administer,
}

impl Action {
    pub fn required(self) -> Permission {
        match self {
            Action::Read => Permission::Read,
            Action::Edit => Permission::Write,
            Action::Administer => Permission::Admin,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Read => "read",
            Action::Edit => "edit",
            Action::Administer => "administer",
        })
    }
}

/// Effective access of `email` on `list`: owners hold admin, grantees hold
/// their grant, everyone else holds nothing.
pub fn effective_access(list: &List, email: &str) -> Access {
    let email = normalize_email(email);
    if list.owner == email {
        return Access::Granted(Permission::Admin);
    }
    list.shared_with
        .iter()
        .find(|share| share.email == email)
        .map_or(Access::None, |share| Access::Granted(share.permission))
}

/// Check that `email` may perform `action` on `list`.
pub fn authorize(list: &List, email: &str, action: Action) -> Result<Access> {
    let access = effective_access(list, email);
    if access.allows(action) {
        Ok(access)
    } else {
        Err(Error::permission_denied(format!(
            "{action} on list {} requires {} (have {access})",
            list.id,
            action.required()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lists::types::ShareEntry;
    use chrono::Utc;

    fn list_with(shares: &[(&str, Permission)]) -> List {
        List {
            id: "l1".to_string(),
            name: "Groceries".to_string(),
            color: "#3b82f6".to_string(),
            icon: None,
            owner: "alice@x.com".to_string(),
            shared_with: shares
                .iter()
                .map(|(email, permission)| ShareEntry {
                    email: email.to_string(),
                    permission: *permission,
                    added_at: Utc::now(),
                    added_by: Some("alice@x.com".to_string()),
                })
                .collect(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_permission_order() {
        assert!(Permission::Read < Permission::Write);
        assert!(Permission::Write < Permission::Admin);
        assert!(Access::None < Access::Granted(Permission::Read));
    }

    #[test]
    fn test_owner_is_admin_regardless_of_grants() {
        let list = list_with(&[("alice@x.com", Permission::Read)]);
        assert_eq!(
            effective_access(&list, "alice@x.com"),
            Access::Granted(Permission::Admin)
        );
        assert_eq!(
            effective_access(&list, " Alice@X.com "),
            Access::Granted(Permission::Admin)
        );
    }

    #[test]
    fn test_grantee_and_stranger_access() {
        let list = list_with(&[("bob@x.com", Permission::Write)]);
        assert_eq!(
            effective_access(&list, "bob@x.com"),
            Access::Granted(Permission::Write)
        );
        assert_eq!(effective_access(&list, "carol@x.com"), Access::None);
        assert_eq!(
            effective_access(&list, "bob@x.com"),
            effective_access(&list, "bob@x.com")
        );
    }

    #[test]
    fn test_action_gates() {
        let list = list_with(&[("bob@x.com", Permission::Write), ("carol@x.com", Permission::Read)]);
        assert!(authorize(&list, "bob@x.com", Action::Edit).is_ok());
        assert!(matches!(
            authorize(&list, "bob@x.com", Action::Administer),
            Err(Error::PermissionDenied(_))
        ));
        assert!(authorize(&list, "carol@x.com", Action::Read).is_ok());
        assert!(authorize(&list, "carol@x.com", Action::Edit).is_err());
        assert!(authorize(&list, "dave@x.com", Action::Read).is_err());
        assert!(authorize(&list, "alice@x.com", Action::Administer).is_ok());
    }

    #[test]
    fn test_permission_names() {
        assert_eq!("editor".parse::<Permission>().unwrap(), Permission::Write);
        assert_eq!("Admin".parse::<Permission>().unwrap(), Permission::Admin);
        assert!("owner".parse::<Permission>().is_err());
        let p: Permission = serde_json::from_str("\"reader\"").unwrap();
        assert_eq!(p, Permission::Read);
        assert_eq!(serde_json::to_string(&Permission::Write).unwrap(), "\"write\"");
    }
}
