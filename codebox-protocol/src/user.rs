//! The `User` identity record (§3). The password-hashing function itself
//! is an out-of-scope pure-function collaborator (§1); `codebox-backend`
//! owns the concrete `sha2`-based implementation and only ever stores the
//! resulting digest here.

use serde_derive::{Deserialize, Serialize};

/// A registered user. `password_digest` and `salt` are opaque from this
/// crate's point of view — they are produced and checked by the backend's
/// password-hashing collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: u64,
    pub email: String,
    pub password_digest: String,
    pub salt: Vec<u8>,
}

impl User {
    /// The id zero-padded to three digits gives the user's filesystem
    /// directory name (§3, §9 open question re: `USER_ID_LEN`). Ids beyond
    /// 999 simply widen the field rather than colliding or truncating.
    pub fn storage_dir_name(&self) -> String {
        storage_dir_name_for_id(self.user_id)
    }
}

/// Same rule as [`User::storage_dir_name`], usable by callers (the
/// gateway's session handler) that only have a bare user id on hand.
pub fn storage_dir_name_for_id(user_id: u64) -> String {
    format!("user_{user_id:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_three_digits() {
        let u = User { user_id: 7, email: "a@x.com".into(), password_digest: String::new(), salt: vec![] };
        assert_eq!(u.storage_dir_name(), "user_007");
    }

    #[test]
    fn widens_past_three_digits() {
        let u = User { user_id: 1234, email: "a@x.com".into(), password_digest: String::new(), salt: vec![] };
        assert_eq!(u.storage_dir_name(), "user_1234");
    }
}
