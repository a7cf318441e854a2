//! Ownership and membership-level authorization.
//!
//! Every check is a pure function over already-fetched resource state;
//! callers fetch the record and hand it over (or `None` when the lookup
//! came back empty).

use crate::db::models::{Service, Workspace};
use crate::error::AppError;

/// Membership levels, monotonic
pub mod level {
    /// See the resource
    pub const VIEW: u8 = 0;
    /// Edit content and variables
    pub const EDIT: u8 = 1;
    /// Manage membership, delete children
    pub const MANAGE: u8 = 2;
    /// Owner-equivalent
    pub const OWNER: u8 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden,
    NotFound,
}

/// A resource with an owner, a privacy flag and a member list
pub trait Guarded {
    /// Name used in `NotFound` errors
    const KIND: &'static str;

    fn owner_id(&self) -> i64;

    fn is_private(&self) -> bool;

    fn member_level(&self, actor_id: i64) -> Option<u8>;
}

impl Guarded for Workspace {
    const KIND: &'static str = "Workspace";

    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn member_level(&self, actor_id: i64) -> Option<u8> {
        self.users_id
            .iter()
            .find(|m| m.id == actor_id)
            .map(|m| m.permission)
    }
}

/// Service members share management rights with the owner
impl Guarded for Service {
    const KIND: &'static str = "Service";

    fn owner_id(&self) -> i64 {
        self.owner_id
    }

    fn is_private(&self) -> bool {
        self.is_private
    }

    fn member_level(&self, actor_id: i64) -> Option<u8> {
        self.users_id
            .contains(&actor_id)
            .then_some(level::MANAGE)
    }
}

/// Decide whether `actor_id` may act on `resource` at `required` level.
///
/// - missing resource ⇒ `NotFound`
/// - public resource and `required == VIEW` ⇒ `Allow`
/// - owner ⇒ `Allow`
/// - member with level ≥ `required` ⇒ `Allow`
/// - anything else ⇒ `Forbidden`; a member below the threshold and a
///   stranger get the same answer.
pub fn authorize<R: Guarded>(actor_id: i64, resource: Option<&R>, required: u8) -> Decision {
    let Some(resource) = resource else {
        return Decision::NotFound;
    };

    if !resource.is_private() && required == level::VIEW {
        return Decision::Allow;
    }

    match membership(actor_id, resource) {
        Some(granted) if granted >= required => Decision::Allow,
        _ => Decision::Forbidden,
    }
}

/// Effective level of `actor_id` on `resource`; the owner holds `OWNER`
pub fn membership<R: Guarded>(actor_id: i64, resource: &R) -> Option<u8> {
    if resource.owner_id() == actor_id {
        Some(level::OWNER)
    } else {
        resource.member_level(actor_id)
    }
}

/// `authorize` for handlers: hands the resource back on `Allow`
pub fn ensure<R: Guarded>(actor_id: i64, resource: Option<R>, required: u8) -> Result<R, AppError> {
    match authorize(actor_id, resource.as_ref(), required) {
        Decision::Allow => resource.ok_or(AppError::NotFound(R::KIND)),
        Decision::NotFound => Err(AppError::NotFound(R::KIND)),
        Decision::Forbidden => {
            tracing::debug!(actor_id, required, kind = R::KIND, "Authorization denied");
            Err(AppError::Forbidden)
        }
    }
}

/// Members only: the public-read shortcut does not apply
pub fn ensure_member<R: Guarded>(actor_id: i64, resource: Option<R>) -> Result<R, AppError> {
    let resource = ensure(actor_id, resource, level::VIEW)?;
    match membership(actor_id, &resource) {
        Some(_) => Ok(resource),
        None => Err(AppError::Forbidden),
    }
}
