//! SQL schema and queries for the backend's user/file-structure store.
//!
//! Schema is carried over verbatim from the source project: a `users`
//! table plus a `user_data` table holding the opaque tree blob, joined on
//! `user_id`.

pub const USERS_TABLE: &str = "users";
pub const USER_DATA_TABLE: &str = "user_data";

pub const CREATE_USERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL,
    salt BLOB NOT NULL
);
";

pub const CREATE_USER_DATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS user_data (
    user_id INTEGER PRIMARY KEY,
    files_structure BLOB,
    FOREIGN KEY (user_id) REFERENCES users(user_id)
);
";

pub const INSERT_USER: &str = "INSERT INTO users (email, password, salt) VALUES (?1, ?2, ?3);";

pub const SELECT_USER_PW_SALT: &str = "SELECT password, salt FROM users WHERE email = ?1;";

pub const SELECT_USER_ID: &str = "SELECT user_id FROM users WHERE email = ?1;";

pub const SELECT_USER_EXISTS: &str = "SELECT 1 FROM users WHERE email = ?1;";

pub const SELECT_ALL_EMAILS: &str = "SELECT email FROM users ORDER BY user_id;";

pub const SET_FILE_STRUCT: &str = "
INSERT INTO user_data (user_id, files_structure)
VALUES (?1, ?2)
ON CONFLICT(user_id) DO UPDATE SET files_structure = excluded.files_structure;
";

pub const SELECT_FILE_STRUCT: &str = "
SELECT ud.files_structure
FROM users u
JOIN user_data ud ON u.user_id = ud.user_id
WHERE u.email = ?1;
";
