use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Seeker,
    Provider,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Seeker => "seeker",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }

    /// Users may add or drop these roles themselves; `admin` is granted
    /// only through the admin API.
    pub const fn is_self_assignable(self) -> bool {
        matches!(self, Role::Seeker | Role::Provider)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "seeker" => Ok(Role::Seeker),
            "provider" => Ok(Role::Provider),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Parses stored role strings, silently dropping values this build does not know.
pub fn parse_roles<I, S>(values: I) -> Vec<Role>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut roles: Vec<Role> = values
        .into_iter()
        .filter_map(|value| value.as_ref().parse().ok())
        .collect();
    roles.sort_by_key(|role| role.as_str());
    roles.dedup();
    roles
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Suspended,
    Deleted,
}

impl AccountStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "deleted" => Ok(AccountStatus::Deleted),
            other => Err(format!("unknown account status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("Provider".parse::<Role>().unwrap(), Role::Provider);
        assert_eq!(" seeker ".parse::<Role>().unwrap(), Role::Seeker);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn admin_is_not_self_assignable() {
        assert!(Role::Seeker.is_self_assignable());
        assert!(Role::Provider.is_self_assignable());
        assert!(!Role::Admin.is_self_assignable());
    }

    #[test]
    fn parse_roles_sorts_dedups_and_skips_unknown() {
        let roles = parse_roles(["seeker", "provider", "seeker", "ghost"]);
        assert_eq!(roles, vec![Role::Provider, Role::Seeker]);
    }

    #[test]
    fn account_status_round_trips_through_str() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<AccountStatus>().unwrap(), status);
        }
    }
}
