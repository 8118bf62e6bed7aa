//! Permission checks and the casting agency permission catalog.
//!
//! Auth0 RBAC puts the permissions granted to a user's roles into the
//! `permissions` claim of the access token. Routes declare the single
//! permission they require and [`check_permissions`] decides access.

use crate::{claims::TokenClaims, error::AuthError};

/// List actors.
pub const GET_ACTORS: &str = "get:actors";
/// Create an actor.
pub const POST_ACTORS: &str = "post:actors";
/// Update an actor.
pub const PATCH_ACTORS: &str = "patch:actors";
/// Delete an actor.
pub const DELETE_ACTORS: &str = "delete:actors";
/// List movies.
pub const GET_MOVIES: &str = "get:movies";
/// Create a movie.
pub const POST_MOVIES: &str = "post:movies";
/// Update a movie.
pub const PATCH_MOVIES: &str = "patch:movies";
/// Delete a movie.
pub const DELETE_MOVIES: &str = "delete:movies";

/// Checks that the claims grant `permission`.
///
/// An empty `permission` means the route only requires an authenticated
/// caller; it passes as long as the `permissions` claim exists.
///
/// # Errors
///
/// - [`AuthError::PermissionsClaimMissing`] if the claims have no `permissions` field
/// - [`AuthError::PermissionDenied`] if `permission` is not granted (exact, case-sensitive match)
pub fn check_permissions(claims: &TokenClaims, permission: &str) -> Result<(), AuthError> {
    let Some(granted) = claims.permissions.as_ref() else {
        return Err(AuthError::PermissionsClaimMissing);
    };

    if permission.is_empty() || granted.iter().any(|p| p == permission) {
        return Ok(());
    }

    Err(AuthError::permission_denied(permission))
}

/// Casting agency roles, as configured in Auth0 RBAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Can view actors and movies.
    CastingAssistant,
    /// Assistant permissions, plus add/delete actors and modify actors or movies.
    CastingDirector,
    /// Director permissions, plus add/delete movies.
    ExecutiveProducer,
}

impl Role {
    /// All roles, least privileged first.
    pub const ALL: [Role; 3] = [Role::CastingAssistant, Role::CastingDirector, Role::ExecutiveProducer];

    /// Permissions granted to this role.
    #[must_use]
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Role::CastingAssistant => &[GET_ACTORS, GET_MOVIES],
            Role::CastingDirector => &[
                GET_ACTORS,
                GET_MOVIES,
                POST_ACTORS,
                DELETE_ACTORS,
                PATCH_ACTORS,
                PATCH_MOVIES,
            ],
            Role::ExecutiveProducer => &[
                GET_ACTORS,
                GET_MOVIES,
                POST_ACTORS,
                DELETE_ACTORS,
                PATCH_ACTORS,
                PATCH_MOVIES,
                POST_MOVIES,
                DELETE_MOVIES,
            ],
        }
    }

    /// Whether the role grants `permission`.
    #[must_use]
    pub fn grants(self, permission: &str) -> bool {
        self.permissions().contains(&permission)
    }
}
