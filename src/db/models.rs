/// Account as exposed by queries. The password hash never leaves `db::accounts`.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: i64,
    pub instagram: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
}

/// Login candidate: an account id with its stored bcrypt hash.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub id: i64,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub description: Option<String>,
    pub owner_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub stored_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub id: i64,
    pub post_id: i64,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: String,
    pub stored_name: Option<String>,
}

/// One row of the post listing, joined with its author and counts.
#[derive(Debug, Clone)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
    pub author_id: i64,
    pub author_name: String,
    pub attachments_count: i64,
    pub likes_count: i64,
    pub comments_count: i64,
}
