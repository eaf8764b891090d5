//! Operator permissions.
//!
//! The permission buffer is a comma or whitespace separated list of
//! grants. Only the grants that concern these tools are interpreted;
//! anything else (other AFD dialogs' permissions) is skipped.
//!
//! | grant          | effect                                  |
//! | -------------- | --------------------------------------- |
//! | `all`          | every action, no limits                 |
//! | `resend`       | resend without limit                    |
//! | `resend:<n>`   | resend at most `n` files per invocation |
//! | `send`         | send without limit                      |
//! | `send:<n>`     | send at most `n` files per invocation   |
//! | `view_data`    | open archived files in a viewer         |
//! | `view_passwd`  | show recipient passwords                |

use serde::Serialize;

use crate::{DispatchError, Result};

/// Per-invocation file allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Limit {
    NoLimit,
    Limited(u32),
    NoPermission,
}

impl Limit {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, Limit::NoPermission)
    }

    /// `Some(n)` when `done` files already exhaust the allowance.
    pub fn reached(&self, done: u32) -> Option<u32> {
        match *self {
            Limit::Limited(n) if done >= n => Some(n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub resend: Limit,
    pub send: Limit,
    pub view_data: bool,
    pub view_passwd: bool,
}

impl Default for Permissions {
    /// Nothing granted.
    fn default() -> Self {
        Self {
            resend: Limit::NoPermission,
            send: Limit::NoPermission,
            view_data: false,
            view_passwd: false,
        }
    }
}

impl Permissions {
    pub fn all() -> Self {
        Self {
            resend: Limit::NoLimit,
            send: Limit::NoLimit,
            view_data: true,
            view_passwd: true,
        }
    }

    pub fn from_buffer(buffer: &str) -> Result<Self> {
        let mut perms = Self::default();
        let grants = buffer
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|g| !g.is_empty());
        for grant in grants {
            let (name, arg) = match grant.split_once(':') {
                Some((name, arg)) => (name, Some(arg)),
                None => (grant, None),
            };
            match name {
                "all" => return Ok(Self::all()),
                "resend" => perms.resend = parse_limit(grant, arg)?,
                "send" => perms.send = parse_limit(grant, arg)?,
                "view_data" => perms.view_data = true,
                "view_passwd" => perms.view_passwd = true,
                _ => {}
            }
        }
        Ok(perms)
    }
}

fn parse_limit(grant: &str, arg: Option<&str>) -> Result<Limit> {
    match arg {
        None => Ok(Limit::NoLimit),
        Some(n) => n
            .trim()
            .parse::<u32>()
            .map(Limit::Limited)
            .map_err(|_| DispatchError::InvalidPermission(grant.to_string())),
    }
}
