//! Current-user lookup and role/privilege checks.

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::types::User;
use crate::config::RoleGroups;

use super::read_body;

/// Coarse role derived from the backend's group names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Downloader,
    User,
}

/// Log in and store the returned credential pair on the client.
pub async fn login(
    api: &ApiClient,
    username_or_email: &str,
    password: &str,
) -> Result<User, ApiError> {
    api.login(username_or_email, password).await
}

pub fn logout(api: &ApiClient) {
    api.logout();
}

/// Fetch the logged-in user. GET /api/whoami
pub async fn whoami(api: &ApiClient) -> Result<User, ApiError> {
    let resp = api.get("/api/whoami").await?;
    read_body(resp).await
}

/// Map the first recognised backend group to a role; `User` otherwise.
pub fn primary_role(user: &User) -> UserRole {
    user.groups
        .iter()
        .find_map(|group| match group.as_str() {
            "AdminGroup" => Some(UserRole::Admin),
            "UsersDownload" => Some(UserRole::Downloader),
            "Users" => Some(UserRole::User),
            _ => None,
        })
        .unwrap_or(UserRole::User)
}

/// Whether the user belongs to the given group. `None` has no roles.
pub fn has_role(user: Option<&User>, group: &str) -> bool {
    user.is_some_and(|u| u.groups.iter().any(|g| g == group))
}

/// Superadmins, admins and downloaders may download original documents.
pub fn has_download_privilege(user: Option<&User>, roles: &RoleGroups) -> bool {
    [&roles.superadmin, &roles.admin, &roles.downloader]
        .iter()
        .any(|group| has_role(user, group))
}

pub fn has_admin_privilege(user: Option<&User>, roles: &RoleGroups) -> bool {
    has_role(user, &roles.superadmin) || has_role(user, &roles.admin)
}
