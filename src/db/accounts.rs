use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Account, Credentials};
use crate::error::{is_unique_violation, AppError, AppResult};

/// Insert a new account with the default role and no social handles.
/// A taken username surfaces as `AppError::Conflict`.
pub fn insert_account(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
) -> AppResult<i64> {
    let inserted = conn.execute(
        "INSERT INTO Account (User_name, Email, Password_hash, User_Role) VALUES (?1, ?2, ?3, 0)",
        params![username, email, password_hash],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::Conflict("Username already exists".into()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Every account registered under `email`, oldest first.
pub fn credentials_by_email(conn: &Connection, email: &str) -> AppResult<Vec<Credentials>> {
    let mut stmt =
        conn.prepare("SELECT Id, Password_hash FROM Account WHERE Email = ?1 ORDER BY Id")?;
    let rows = stmt
        .query_map(params![email], |row| {
            Ok(Credentials {
                id: row.get(0)?,
                password_hash: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_account(conn: &Connection, id: i64) -> AppResult<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT Id, User_name, Email, User_Role, Instagram, GitHub, Twitter
             FROM Account WHERE Id = ?1",
            params![id],
            |row| {
                Ok(Account {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    email: row.get(2)?,
                    role: row.get(3)?,
                    instagram: row.get(4)?,
                    github: row.get(5)?,
                    twitter: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(account)
}

pub fn list_usernames(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT User_name FROM Account ORDER BY Id")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}
