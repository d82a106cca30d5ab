//! The `Database` wrapper around the backend's SQLite store (§3, §4.F).
//! Grounded on the source's `Database` class: `is_user_exist`,
//! `is_password_ok`, `add_user`, plus the file-structure get/set pair that
//! backs the per-user `FileTree` (§4.G persistence contract).

use codebox_protocol::tree::FileTree;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::errors::StoreError;
use crate::password::{generate_salt, hash_password};
use crate::queries;

pub struct Database {
    conn: Connection,
    pepper: Vec<u8>,
}

impl Database {
    pub fn open(path: &str, pepper: Vec<u8>) -> Result<Database, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute(queries::CREATE_USERS_TABLE, [])?;
        conn.execute(queries::CREATE_USER_DATA_TABLE, [])?;
        Ok(Database { conn, pepper })
    }

    #[cfg(test)]
    pub fn open_in_memory(pepper: Vec<u8>) -> Result<Database, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(queries::CREATE_USERS_TABLE, [])?;
        conn.execute(queries::CREATE_USER_DATA_TABLE, [])?;
        Ok(Database { conn, pepper })
    }

    pub fn is_user_exist(&self, email: &str) -> Result<bool, StoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(queries::SELECT_USER_EXISTS, params![email], |row| row.get(0))
            .optional()?;
        Ok(exists.is_some())
    }

    pub fn get_user_id(&self, email: &str) -> Result<Option<u64>, StoreError> {
        let id: Option<i64> = self
            .conn
            .query_row(queries::SELECT_USER_ID, params![email], |row| row.get(0))
            .optional()?;
        Ok(id.map(|id| id as u64))
    }

    /// Returns `Err(StoreError::UserNotFound)` for a missing email,
    /// mirroring the source's `is_password_ok` raising
    /// `UserNotFoundError`. Per DESIGN NOTES open question 3, the caller
    /// (the gateway's login handler) must not let this leak as a distinct
    /// surface from a wrong password.
    #[instrument(skip(self, password))]
    pub fn is_password_ok(&self, email: &str, password: &str) -> Result<bool, StoreError> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .query_row(queries::SELECT_USER_PW_SALT, params![email], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let (stored_digest, salt) = row.ok_or_else(|| StoreError::UserNotFound(email.to_string()))?;
        Ok(stored_digest == hash_password(password, &salt, &self.pepper))
    }

    /// Returns `true` if the user was created, `false` if the email is
    /// already registered (source: "Returns true if successful, False is
    /// user already exists.").
    #[instrument(skip(self, password))]
    pub fn add_user(&self, email: &str, password: &str) -> Result<bool, StoreError> {
        if self.is_user_exist(email)? {
            return Ok(false);
        }
        let salt = generate_salt();
        let digest = hash_password(password, &salt, &self.pepper);
        self.conn.execute(queries::INSERT_USER, params![email, digest, salt])?;
        Ok(true)
    }

    pub fn set_user_files_struct(&self, email: &str, tree: &FileTree) -> Result<(), StoreError> {
        let user_id = self.get_user_id(email)?.ok_or_else(|| StoreError::UserNotFound(email.to_string()))?;
        let blob = rmp_serde::to_vec(tree)?;
        self.conn.execute(queries::SET_FILE_STRUCT, params![user_id, blob])?;
        Ok(())
    }

    pub fn get_user_files_struct(&self, email: &str) -> Result<FileTree, StoreError> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(queries::SELECT_FILE_STRUCT, params![email], |row| row.get(0))
            .optional()?;
        match blob {
            Some(bytes) => Ok(rmp_serde::from_slice(&bytes)?),
            None => Ok(FileTree::new()),
        }
    }

    /// The source's `get_all_users_string` calls `str(db_handler)`, which
    /// renders the whole in-memory dict; here it is a concrete,
    /// comma-joined list of emails rather than a debug dump of internal
    /// state.
    pub fn get_all_users_string(&self) -> Result<String, StoreError> {
        let mut stmt = self.conn.prepare(queries::SELECT_ALL_EMAILS)?;
        let emails = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(emails.join(", "))
    }
}
