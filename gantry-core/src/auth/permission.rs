//! Permission codes.
//!
//! A permission gates one (resource type, verb) pair and renders as
//! `{resourceType}:{verb}`, e.g. `tag:read`. The distinguished `admin` code
//! satisfies every check unconditionally.

use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::action::{ActionType, ResourceType};

/// CRUD verb component of a permission code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudVerb {
    Read,
    Create,
    Update,
    Delete,
}

impl CrudVerb {
    pub fn code(&self) -> &'static str {
        match self {
            CrudVerb::Read => "read",
            CrudVerb::Create => "create",
            CrudVerb::Update => "update",
            CrudVerb::Delete => "delete",
        }
    }
}

impl std::fmt::Display for CrudVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for CrudVerb {
    type Err = InvalidPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(CrudVerb::Read),
            "create" => Ok(CrudVerb::Create),
            "update" => Ok(CrudVerb::Update),
            "delete" => Ok(CrudVerb::Delete),
            other => Err(InvalidPermission(format!("unknown verb: {}", other))),
        }
    }
}

/// Error for malformed permission codes
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid permission: {0}")]
pub struct InvalidPermission(pub String);

/// An atomic capability code.
///
/// # Example
///
/// ```rust
/// use gantry_core::{CrudVerb, Permission, ResourceType};
///
/// let perm: Permission = "tag:read".parse().unwrap();
/// assert_eq!(perm, Permission::Resource(ResourceType::Tag, CrudVerb::Read));
/// assert_eq!(perm.to_string(), "tag:read");
///
/// let admin: Permission = "admin".parse().unwrap();
/// assert_eq!(admin, Permission::Admin);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Satisfies every permission check unconditionally
    Admin,
    /// Grants one verb on one resource type
    Resource(ResourceType, CrudVerb),
}

impl Permission {
    /// The permission required to perform `action` on `resource`.
    ///
    /// List maps to the read verb; there is no separate list permission.
    pub fn required_for(resource: ResourceType, action: ActionType) -> Permission {
        let verb = match action {
            ActionType::Create => CrudVerb::Create,
            ActionType::Read | ActionType::List => CrudVerb::Read,
            ActionType::Update => CrudVerb::Update,
            ActionType::Delete => CrudVerb::Delete,
        };
        Permission::Resource(resource, verb)
    }

    /// The delete permission for a resource type (the production gate for
    /// destructive actions).
    pub fn delete_for(resource: ResourceType) -> Permission {
        Permission::Resource(resource, CrudVerb::Delete)
    }

    /// Canonical string code
    pub fn code(&self) -> String {
        match self {
            Permission::Admin => "admin".to_string(),
            Permission::Resource(resource, verb) => format!("{}:{}", resource, verb),
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Permission {
    type Err = InvalidPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("admin") {
            return Ok(Permission::Admin);
        }
        let (resource, verb) = s
            .split_once(':')
            .ok_or_else(|| InvalidPermission(format!("expected resource:verb, got {}", s)))?;
        let resource = ResourceType::from_str(resource)
            .map_err(|e| InvalidPermission(e.to_string()))?;
        let verb = CrudVerb::from_str(verb)?;
        Ok(Permission::Resource(resource, verb))
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for resource in ResourceType::ALL {
            for verb in [
                CrudVerb::Read,
                CrudVerb::Create,
                CrudVerb::Update,
                CrudVerb::Delete,
            ] {
                let perm = Permission::Resource(resource, verb);
                let parsed: Permission = perm.code().parse().unwrap();
                assert_eq!(parsed, perm);
            }
        }
        let parsed: Permission = "admin".parse().unwrap();
        assert_eq!(parsed, Permission::Admin);
    }

    #[test]
    fn test_alias_normalizes_in_code() {
        let parsed: Permission = "view:update".parse().unwrap();
        assert_eq!(
            parsed,
            Permission::Resource(ResourceType::PerspectiveView, CrudVerb::Update)
        );
        // Canonical form on the way back out
        assert_eq!(parsed.to_string(), "perspective-view:update");
    }

    #[test]
    fn test_required_for_maps_list_to_read() {
        assert_eq!(
            Permission::required_for(ResourceType::Tag, ActionType::List),
            Permission::Resource(ResourceType::Tag, CrudVerb::Read)
        );
    }

    #[test]
    fn test_invalid_codes_rejected() {
        assert!("tag".parse::<Permission>().is_err());
        assert!("tag:fly".parse::<Permission>().is_err());
        assert!("widget:read".parse::<Permission>().is_err());
        assert!("".parse::<Permission>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let perm = Permission::Resource(ResourceType::NamedQuery, CrudVerb::Delete);
        let json = serde_json::to_string(&perm).unwrap();
        assert_eq!(json, "\"named-query:delete\"");
        let back: Permission = serde_json::from_str(&json).unwrap();
        assert_eq!(back, perm);
    }
}
