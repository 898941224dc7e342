use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::users::{Role, User};

#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: &'static str,
    pub data: UserBody,
}

impl UserResponse {
    pub fn new(user: User) -> Self {
        Self {
            status: "success",
            data: UserBody { user },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub status: &'static str,
    pub results: usize,
    pub data: UserList,
}

/// Admin-only account creation; unlike signup the role is chosen by the
/// caller.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "passwordConfirm")]
    pub confirm_password: String,
    #[serde(default)]
    pub role: Role,
    pub photo: Option<String>,
}
