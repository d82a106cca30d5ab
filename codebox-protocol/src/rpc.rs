//! The backend RPC envelope (§4.D, §4.F).
//!
//! The source dispatches by reflecting over method names; per DESIGN NOTES
//! that becomes a closed enum with one variant per allow-listed command.
//! `Command` itself doubles as the wire envelope — `rmp_serde`'s struct-map
//! mode serializes an enum variant as a self-describing tagged record, so
//! there is no separate `{command, args, kwargs}` wrapper struct to keep in
//! sync with this list.

use serde_derive::{Deserialize, Serialize};

use crate::tree::FileTree;

/// The full command allow-list from §4.F. There is no catch-all variant —
/// `Command` is externally tagged (one record per variant on the wire), and
/// `#[serde(other)]` only applies to internally/adjacently tagged enums. A
/// tag this backend doesn't recognize simply fails to decode; the server
/// maps that decode failure to `UnknownCommandError` rather than the enum
/// absorbing it as a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    IsUserExist { email: String },
    GetUserId { email: String },
    IsPasswordOk { email: String, password: String },
    AddUser { email: String, password: String },
    SetUserFilesStruct { email: String, tree: FileTree },
    GetUserFilesStruct { email: String },
    GetAllUsersString,
}

/// The RPC response envelope. `status` is implicit in the `Ok`/`Err`
/// variants rather than a separate field, since `rmp_serde` already tags
/// the enum — this is the Rust-native equivalent of
/// `{status, data?, error_type?, message?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Bool(bool),
    UserId(Option<u64>),
    Tree(FileTree),
    AllUsersString(String),
    Ack,
    Error { error_type: String, message: String },
}

impl Response {
    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Response {
        Response::Error { error_type: error_type.into(), message: message.into() }
    }

    pub fn unknown_command() -> Response {
        Response::error("UnknownCommandError", "the requested command is not supported")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_get_all_users_string() {
        let encoded = rmp_serde::to_vec(&Command::GetAllUsersString).unwrap();
        let decoded: Command = rmp_serde::from_slice(&encoded).unwrap();
        assert!(matches!(decoded, Command::GetAllUsersString));
    }

    #[test]
    fn unrecognized_wire_tag_fails_to_decode() {
        let encoded = rmp_serde::to_vec(&"NotARealCommand").unwrap();
        assert!(rmp_serde::from_slice::<Command>(&encoded).is_err());
    }

    #[test]
    fn round_trips_add_user() {
        let cmd = Command::AddUser { email: "a@x.com".into(), password: "pw".into() };
        let encoded = rmp_serde::to_vec(&cmd).unwrap();
        let decoded: Command = rmp_serde::from_slice(&encoded).unwrap();
        match decoded {
            Command::AddUser { email, password } => {
                assert_eq!(email, "a@x.com");
                assert_eq!(password, "pw");
            }
            _ => panic!("wrong variant"),
        }
    }
}
