use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::db::models::{Attachment, NewAttachment, NewPost, PostSummary};
use crate::error::AppResult;

/// Predicate shared by the listing and its count query.
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub owner_id: Option<i64>,
    /// Case-insensitive substring over title, description and author name.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Latest,
    Oldest,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Latest => "p.Post_time DESC, p.P_Id DESC",
            SortOrder::Oldest => "p.Post_time ASC, p.P_Id ASC",
        }
    }
}

pub fn insert_post(conn: &Connection, post: &NewPost, created_at: &str) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO Post (Title, Description, U_Id, Post_time) VALUES (?1, ?2, ?3, ?4)",
        params![post.title, post.description, post.owner_id, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_attachment(
    conn: &Connection,
    post_id: i64,
    attachment: &NewAttachment,
    created_at: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO Attachments (A_type, File_size, A_name, A_time, P_Id, Stored_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            attachment.mime_type,
            attachment.size,
            attachment.name,
            created_at,
            post_id,
            attachment.stored_name,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Builds the WHERE clause for `filter`; placeholders are numbered from ?1.
fn where_clause(filter: &PostFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(owner_id) = filter.owner_id {
        values.push(Value::Integer(owner_id));
        clauses.push(format!("p.U_Id = ?{}", values.len()));
    }

    if let Some(search) = filter.search.as_deref() {
        values.push(Value::Text(format!("%{}%", escape_like(search))));
        let n = values.len();
        clauses.push(format!(
            "(p.Title LIKE ?{n} ESCAPE '\\' \
              OR COALESCE(p.Description, '') LIKE ?{n} ESCAPE '\\' \
              OR a.User_name LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn count_posts(conn: &Connection, filter: &PostFilter) -> AppResult<i64> {
    let (where_sql, values) = where_clause(filter);
    let sql = format!(
        "SELECT COUNT(*) FROM Post p JOIN Account a ON a.Id = p.U_Id {}",
        where_sql
    );
    let total = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
    Ok(total)
}

pub fn list_posts(
    conn: &Connection,
    filter: &PostFilter,
    sort: SortOrder,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<PostSummary>> {
    let (where_sql, mut values) = where_clause(filter);
    values.push(Value::Integer(limit));
    let limit_idx = values.len();
    values.push(Value::Integer(offset));
    let offset_idx = values.len();

    let sql = format!(
        "SELECT p.P_Id, p.Title, p.Description, p.Post_time, a.Id, a.User_name,
                (SELECT COUNT(*) FROM Attachments t WHERE t.P_Id = p.P_Id),
                (SELECT COUNT(*) FROM Likes l WHERE l.P_Id = p.P_Id),
                (SELECT COUNT(*) FROM Comments c WHERE c.P_Id = p.P_Id)
         FROM Post p
         JOIN Account a ON a.Id = p.U_Id
         {}
         ORDER BY {}
         LIMIT ?{} OFFSET ?{}",
        where_sql,
        sort.sql(),
        limit_idx,
        offset_idx
    );

    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params_from_iter(values), |row| {
            Ok(PostSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
                author_id: row.get(4)?,
                author_name: row.get(5)?,
                attachments_count: row.get(6)?,
                likes_count: row.get(7)?,
                comments_count: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(posts)
}

fn attachment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        name: row.get(2)?,
        mime_type: row.get(3)?,
        size: row.get(4)?,
        created_at: row.get(5)?,
        stored_name: row.get(6)?,
    })
}

/// Batch-fetch attachments for a page of posts, grouped by post id.
pub fn attachments_for_posts(
    conn: &Connection,
    post_ids: &[i64],
) -> AppResult<HashMap<i64, Vec<Attachment>>> {
    let mut grouped: HashMap<i64, Vec<Attachment>> = HashMap::new();
    if post_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders: Vec<String> = (1..=post_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT A_Id, P_Id, A_name, A_type, File_size, A_time, Stored_name
         FROM Attachments WHERE P_Id IN ({}) ORDER BY A_Id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(post_ids.iter()), attachment_from_row)?;
    for row in rows {
        let attachment = row?;
        grouped.entry(attachment.post_id).or_default().push(attachment);
    }

    Ok(grouped)
}

pub fn find_attachment(conn: &Connection, id: i64) -> AppResult<Option<Attachment>> {
    let attachment = conn
        .query_row(
            "SELECT A_Id, P_Id, A_name, A_type, File_size, A_time, Stored_name
             FROM Attachments WHERE A_Id = ?1",
            params![id],
            attachment_from_row,
        )
        .optional()?;
    Ok(attachment)
}
