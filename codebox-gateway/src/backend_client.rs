//! The gateway's typed view of the backend pool (§4.E client side).
//! Grounded on the source's `DatabaseSocketClient`: one method per
//! allow-listed command, each acquiring a lease for exactly the duration
//! of the call.

use std::time::Duration;

use anyhow::{bail, Context};
use codebox_protocol::rpc::{Command, Response};
use codebox_protocol::tree::FileTree;
use codebox_transport::BackendPool;

pub struct BackendClient {
    pool: BackendPool,
}

impl BackendClient {
    pub fn new(pool: BackendPool) -> BackendClient {
        BackendClient { pool }
    }

    fn call(&self, command: Command) -> anyhow::Result<Response> {
        let mut lease = self.pool.acquire(Some(Duration::from_secs(10))).context("acquiring backend pool slot")?;
        let result = (|| -> anyhow::Result<Response> {
            lease.channel().send(&command).context("sending rpc request")?;
            lease.channel().recv().context("receiving rpc response")
        })();
        if result.is_err() {
            lease.poison();
        }
        result
    }

    pub fn is_user_exist(&self, email: &str) -> anyhow::Result<bool> {
        match self.call(Command::IsUserExist { email: email.to_string() })? {
            Response::Bool(b) => Ok(b),
            other => unexpected(other),
        }
    }

    pub fn get_user_id(&self, email: &str) -> anyhow::Result<Option<u64>> {
        match self.call(Command::GetUserId { email: email.to_string() })? {
            Response::UserId(id) => Ok(id),
            other => unexpected(other),
        }
    }

    /// Per §9 open question 3, a missing user and a wrong password must
    /// look identical to the end client; this returns `Ok(false)` for
    /// both rather than surfacing the `UserNotFoundError` distinctly.
    pub fn is_password_ok(&self, email: &str, password: &str) -> anyhow::Result<bool> {
        match self.call(Command::IsPasswordOk { email: email.to_string(), password: password.to_string() })? {
            Response::Bool(b) => Ok(b),
            Response::Error { error_type, .. } if error_type == "UserNotFoundError" => Ok(false),
            other => unexpected(other),
        }
    }

    pub fn add_user(&self, email: &str, password: &str) -> anyhow::Result<bool> {
        match self.call(Command::AddUser { email: email.to_string(), password: password.to_string() })? {
            Response::Bool(b) => Ok(b),
            other => unexpected(other),
        }
    }

    pub fn set_user_files_struct(&self, email: &str, tree: &FileTree) -> anyhow::Result<()> {
        match self.call(Command::SetUserFilesStruct { email: email.to_string(), tree: tree.clone() })? {
            Response::Ack => Ok(()),
            other => unexpected(other),
        }
    }

    pub fn get_user_files_struct(&self, email: &str) -> anyhow::Result<FileTree> {
        match self.call(Command::GetUserFilesStruct { email: email.to_string() })? {
            Response::Tree(t) => Ok(t),
            other => unexpected(other),
        }
    }

    pub fn get_all_users_string(&self) -> anyhow::Result<String> {
        match self.call(Command::GetAllUsersString)? {
            Response::AllUsersString(s) => Ok(s),
            other => unexpected(other),
        }
    }
}

fn unexpected<T>(response: Response) -> anyhow::Result<T> {
    bail!("unexpected backend response: {:?}", response)
}
