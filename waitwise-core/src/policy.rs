use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EntityId, UnknownVariant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    /// Staff of a single department
    DeptAdmin,
    SuperAdmin,
}

/// Who is performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: EntityId,
    pub role: Role,
    /// The department a `DeptAdmin` is assigned to
    pub department_id: Option<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    JoinQueue,
    ControlQueue,
    CancelToken,
    ViewTokens,
    ViewAnalytics,
    ViewActivity,
    UpdateAverageTime,
    EditDepartment,
    DeleteDepartment,
    CreateDepartment,
    CreateOffice,
    UpdateRole,
    ListUsers,
}

/// What an action is performed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Department(EntityId),
    Token {
        department_id: EntityId,
        owner: Option<EntityId>,
    },
    Office(EntityId),
    Global,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Permission denied")]
pub struct PolicyError {
    pub action: Action,
}

/// The single place where capabilities are decided.
pub fn authorize(actor: &Actor, action: Action, resource: Resource) -> Result<(), PolicyError> {
    if actor.role == Role::SuperAdmin {
        return Ok(());
    }

    let allowed = match (action, resource) {
        (Action::JoinQueue, Resource::Department(_)) => true,
        (Action::CancelToken, Resource::Token { department_id, owner }) => {
            owner == Some(actor.user_id) || actor.manages(department_id)
        }
        (
            Action::ControlQueue
            | Action::ViewTokens
            | Action::ViewAnalytics
            | Action::ViewActivity
            | Action::UpdateAverageTime,
            Resource::Department(department_id),
        ) => actor.manages(department_id),
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(PolicyError { action })
    }
}

impl Actor {
    fn manages(&self, department_id: EntityId) -> bool {
        self.role == Role::DeptAdmin && self.department_id == Some(department_id)
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::DeptAdmin => "dept_admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "dept_admin" => Ok(Self::DeptAdmin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}
