use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::{Attachment, NewAttachment, NewPost, PostSummary};
use crate::db::posts::{self, PostFilter, SortOrder};
use crate::db::{self, accounts};
use crate::error::{AppError, AppResult};
use crate::extractors::{PostUpload, UploadedAttachment};
use crate::state::{AppState, DbPool};
use crate::storage::{derive_mime_type, sanitize_filename, FileStore};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/uploadUserPost", post(upload_post))
        .route("/posts", get(list_posts))
}

// --- Upload ---

/// An attachment that passed validation and is ready to persist.
enum PendingAttachment {
    File {
        name: String,
        mime_type: String,
        bytes: axum::body::Bytes,
    },
    Metadata(NewAttachment),
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prepare(attachment: UploadedAttachment) -> AppResult<PendingAttachment> {
    match attachment {
        UploadedAttachment::File {
            file_name,
            content_type,
            bytes,
        } => {
            let name = sanitize_filename(&file_name);
            let mime_type = derive_mime_type(&name, content_type.as_deref());
            Ok(PendingAttachment::File {
                name,
                mime_type,
                bytes,
            })
        }
        UploadedAttachment::Metadata {
            name,
            mime_type,
            size,
        } => {
            let name = trimmed(name)
                .ok_or_else(|| AppError::BadRequest("Every attachment needs an A_name".into()))?;
            let size = size.unwrap_or(0);
            if size < 0 {
                return Err(AppError::BadRequest("File_size must not be negative".into()));
            }
            let mime_type = derive_mime_type(&sanitize_filename(&name), mime_type.as_deref());
            Ok(PendingAttachment::Metadata(NewAttachment {
                name,
                mime_type,
                size,
                stored_name: None,
            }))
        }
    }
}

/// POST /uploadUserPost — create a post and its attachments
async fn upload_post(
    State(state): State<AppState>,
    upload: PostUpload,
) -> AppResult<impl IntoResponse> {
    let (Some(title), Some(owner)) = (trimmed(upload.title), trimmed(upload.owner_id)) else {
        return Err(AppError::BadRequest("title and U_id are required".into()));
    };
    let owner_id: i64 = owner
        .parse()
        .map_err(|_| AppError::BadRequest("U_id must be an integer".into()))?;

    let pending = upload
        .attachments
        .into_iter()
        .map(prepare)
        .collect::<AppResult<Vec<_>>>()?;

    let new_post = NewPost {
        title,
        description: trimmed(upload.description),
        owner_id,
    };

    let pool = state.db.clone();
    let files = state.files.clone();
    let (post_id, saved) =
        tokio::task::spawn_blocking(move || save_post(&pool, &files, &new_post, pending))
            .await
            .map_err(|e| AppError::Internal(format!("upload task failed: {}", e)))??;

    tracing::info!("Post {} uploaded with {} attachment(s)", post_id, saved);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "Message": "Post uploaded successfully",
            "post_id": post_id,
            "attachments_saved": saved,
        })),
    ))
}

/// Persist a post and its attachments as one unit. On any error the
/// transaction rolls back and the staged files are removed as both drop.
fn save_post(
    pool: &DbPool,
    files: &FileStore,
    post: &NewPost,
    pending: Vec<PendingAttachment>,
) -> AppResult<(i64, usize)> {
    let mut conn = pool.get()?;
    // Take the write lock up front so concurrent uploads queue on the busy
    // timeout instead of failing when a read snapshot cannot be upgraded.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if accounts::find_account(&tx, post.owner_id)?.is_none() {
        return Err(AppError::BadRequest(format!(
            "No account with U_id {}",
            post.owner_id
        )));
    }

    let created_at = db::now_timestamp();
    let post_id = posts::insert_post(&tx, post, &created_at)?;

    let mut staged = files.stage(post_id);
    let mut saved = 0;
    for item in pending {
        let attachment = match item {
            PendingAttachment::File {
                name,
                mime_type,
                bytes,
            } => {
                let stored = staged.write(&name, &bytes)?;
                let size = i64::try_from(stored.size)
                    .map_err(|_| AppError::Internal("file size overflow".into()))?;
                NewAttachment {
                    name,
                    mime_type,
                    size,
                    stored_name: Some(stored.stored_name),
                }
            }
            PendingAttachment::Metadata(attachment) => attachment,
        };
        posts::insert_attachment(&tx, post_id, &attachment, &created_at)?;
        saved += 1;
    }

    tx.commit()?;
    staged.commit();
    Ok((post_id, saved))
}

// --- Listing ---

/// Raw listing query. Every value is parsed leniently so a bad parameter
/// falls back to its default instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub user_id: Option<String>,
    pub include_attachments: Option<String>,
    pub sort: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Listing {
    page: i64,
    page_size: i64,
    filter_owner: Option<i64>,
    search: Option<String>,
    sort: SortOrder,
    include_attachments: bool,
}

impl Listing {
    fn from_query(query: ListQuery) -> Self {
        let page = query
            .page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1);
        let page_size = query
            .page_size
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let sort = match query.sort.as_deref().map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("oldest") || s.eq_ignore_ascii_case("asc") => {
                SortOrder::Oldest
            }
            _ => SortOrder::Latest,
        };

        Listing {
            page,
            page_size,
            filter_owner: query.user_id.and_then(|u| u.trim().parse().ok()),
            search: trimmed(query.q),
            sort,
            include_attachments: query.include_attachments.as_deref().is_some_and(is_truthy),
        }
    }

    fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[derive(Serialize)]
struct PostPage {
    data: Vec<PostItem>,
    page: i64,
    page_size: i64,
    total: i64,
}

#[derive(Serialize)]
struct Author {
    id: i64,
    name: String,
}

#[derive(Serialize)]
struct PostItem {
    id: i64,
    title: String,
    description: Option<String>,
    post_time: String,
    author: Author,
    attachments_count: i64,
    likes_count: i64,
    comments_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachments: Option<Vec<AttachmentItem>>,
}

#[derive(Serialize)]
struct AttachmentItem {
    id: i64,
    #[serde(rename = "A_type")]
    mime_type: String,
    #[serde(rename = "A_name")]
    name: String,
    #[serde(rename = "File_size")]
    size: i64,
    #[serde(rename = "A_time")]
    created_at: String,
}

impl From<Attachment> for AttachmentItem {
    fn from(a: Attachment) -> Self {
        AttachmentItem {
            id: a.id,
            mime_type: a.mime_type,
            name: a.name,
            size: a.size,
            created_at: a.created_at,
        }
    }
}

impl PostItem {
    fn new(summary: PostSummary, attachments: Option<Vec<AttachmentItem>>) -> Self {
        PostItem {
            id: summary.id,
            title: summary.title,
            description: summary.description,
            post_time: summary.created_at,
            author: Author {
                id: summary.author_id,
                name: summary.author_name,
            },
            attachments_count: summary.attachments_count,
            likes_count: summary.likes_count,
            comments_count: summary.comments_count,
            attachments,
        }
    }
}

/// GET /posts — paginated, filtered post listing
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<PostPage>> {
    let listing = Listing::from_query(query);
    let filter = PostFilter {
        owner_id: listing.filter_owner,
        search: listing.search.clone(),
    };

    let conn = state.db.get()?;
    let total = posts::count_posts(&conn, &filter)?;
    let summaries = posts::list_posts(
        &conn,
        &filter,
        listing.sort,
        listing.page_size,
        listing.offset(),
    )?;

    let mut grouped = if listing.include_attachments {
        let ids: Vec<i64> = summaries.iter().map(|p| p.id).collect();
        posts::attachments_for_posts(&conn, &ids)?
    } else {
        Default::default()
    };

    let data = summaries
        .into_iter()
        .map(|summary| {
            let attachments = listing.include_attachments.then(|| {
                grouped
                    .remove(&summary.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(AttachmentItem::from)
                    .collect()
            });
            PostItem::new(summary, attachments)
        })
        .collect();

    Ok(Json(PostPage {
        data,
        page: listing.page,
        page_size: listing.page_size,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        let mut q = ListQuery::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "page" => q.page = value,
                "page_size" => q.page_size = value,
                "user_id" => q.user_id = value,
                "include_attachments" => q.include_attachments = value,
                "sort" => q.sort = value,
                "q" => q.q = value,
                other => panic!("unknown key {}", other),
            }
        }
        q
    }

    #[test]
    fn defaults_when_nothing_given() {
        let listing = Listing::from_query(ListQuery::default());
        assert_eq!(listing.page, 1);
        assert_eq!(listing.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(listing.sort, SortOrder::Latest);
        assert!(!listing.include_attachments);
        assert!(listing.filter_owner.is_none());
        assert!(listing.search.is_none());
        assert_eq!(listing.offset(), 0);
    }

    #[test]
    fn page_size_is_clamped_and_junk_falls_back() {
        let big = Listing::from_query(query(&[("page_size", "5000")]));
        assert_eq!(big.page_size, MAX_PAGE_SIZE);
        let zero = Listing::from_query(query(&[("page_size", "0"), ("page", "-3")]));
        assert_eq!(zero.page_size, 1);
        assert_eq!(zero.page, 1);
        let junk = Listing::from_query(query(&[("page_size", "lots"), ("page", "two")]));
        assert_eq!(junk.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(junk.page, 1);
    }

    #[test]
    fn offset_follows_page() {
        let listing = Listing::from_query(query(&[("page", "2"), ("page_size", "10")]));
        assert_eq!(listing.offset(), 10);
        let max = i64::MAX.to_string();
        let huge = Listing::from_query(query(&[("page", max.as_str())]));
        assert_eq!(huge.offset(), i64::MAX);
    }

    #[test]
    fn sort_and_flags() {
        assert_eq!(
            Listing::from_query(query(&[("sort", "Oldest")])).sort,
            SortOrder::Oldest
        );
        assert_eq!(
            Listing::from_query(query(&[("sort", "asc")])).sort,
            SortOrder::Oldest
        );
        assert_eq!(
            Listing::from_query(query(&[("sort", "newest")])).sort,
            SortOrder::Latest
        );
        for yes in ["1", "true", "YES", "on"] {
            assert!(Listing::from_query(query(&[("include_attachments", yes)])).include_attachments);
        }
        assert!(!Listing::from_query(query(&[("include_attachments", "0")])).include_attachments);
    }

    #[test]
    fn blank_search_is_ignored() {
        assert!(Listing::from_query(query(&[("q", "   ")])).search.is_none());
        assert_eq!(
            Listing::from_query(query(&[("q", " sky ")])).search.as_deref(),
            Some("sky")
        );
    }

    #[test]
    fn metadata_without_name_is_rejected() {
        let result = prepare(UploadedAttachment::Metadata {
            name: None,
            mime_type: None,
            size: Some(3),
        });
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn file_names_are_sanitized_before_storage() {
        let pending = prepare(UploadedAttachment::File {
            file_name: "../my sketch.png".into(),
            content_type: Some("application/octet-stream".into()),
            bytes: axum::body::Bytes::from_static(b"png"),
        });
        match pending {
            Ok(PendingAttachment::File {
                name, mime_type, ..
            }) => {
                assert_eq!(name, "my_sketch.png");
                assert_eq!(mime_type, "image/png");
            }
            _ => panic!("expected a file attachment"),
        }
    }
}
