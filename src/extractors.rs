use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::{header, StatusCode};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::AppError;

/// `Json<T>` whose rejections use the application error envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(AppError::PayloadTooLarge)
            }
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// One attachment carried by an upload request.
#[derive(Debug)]
pub enum UploadedAttachment {
    /// A multipart file part.
    File {
        file_name: String,
        content_type: Option<String>,
        bytes: Bytes,
    },
    /// Metadata-only entry from the JSON body; no bytes are stored.
    Metadata {
        name: Option<String>,
        mime_type: Option<String>,
        size: Option<i64>,
    },
}

/// Body of `POST /uploadUserPost`, from either a multipart form or JSON.
/// Field presence is checked by the handler, not here.
#[derive(Debug, Default)]
pub struct PostUpload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub owner_id: Option<String>,
    pub attachments: Vec<UploadedAttachment>,
}

#[derive(Deserialize)]
struct JsonUpload {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "U_id", alias = "U_Id", alias = "user_id", default)]
    owner_id: Option<serde_json::Value>,
    #[serde(rename = "Attachments", alias = "attachments", default)]
    attachments: Vec<JsonAttachment>,
}

#[derive(Deserialize)]
struct JsonAttachment {
    #[serde(rename = "A_name", alias = "name")]
    name: Option<String>,
    #[serde(rename = "A_type", alias = "type")]
    mime_type: Option<String>,
    #[serde(rename = "File_size", alias = "size")]
    size: Option<i64>,
}

impl<S> FromRequest<S> for PostUpload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            read_multipart(multipart).await
        } else {
            let JsonBody(body) = JsonBody::<JsonUpload>::from_request(req, state).await?;
            Ok(PostUpload::from(body))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<PostUpload, AppError> {
    let mut upload = PostUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            // An empty <input type="file"> still submits a nameless, empty part.
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            upload.attachments.push(UploadedAttachment::File {
                file_name,
                content_type,
                bytes,
            });
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        match name.as_str() {
            "title" => upload.title = Some(value),
            "description" => upload.description = Some(value),
            "U_id" | "U_Id" | "user_id" => upload.owner_id = Some(value),
            _ => tracing::debug!("Ignoring form field {}", name),
        }
    }

    Ok(upload)
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}

impl From<JsonUpload> for PostUpload {
    fn from(body: JsonUpload) -> Self {
        let owner_id = body.owner_id.and_then(|v| match v {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s),
            _ => None,
        });

        PostUpload {
            title: body.title,
            description: body.description,
            owner_id,
            attachments: body
                .attachments
                .into_iter()
                .map(|a| UploadedAttachment::Metadata {
                    name: a.name,
                    mime_type: a.mime_type,
                    size: a.size,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn multipart_request(body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=XBOUNDARY",
            )
            .body(Body::from(body.replace('\n', "\r\n")))
            .unwrap()
    }

    #[tokio::test]
    async fn reads_fields_and_files_from_multipart() {
        let body = "--XBOUNDARY
Content-Disposition: form-data; name=\"title\"

Sunset
--XBOUNDARY
Content-Disposition: form-data; name=\"U_id\"

3
--XBOUNDARY
Content-Disposition: form-data; name=\"attachments\"; filename=\"sun.png\"
Content-Type: image/png

PNGDATA
--XBOUNDARY
Content-Disposition: form-data; name=\"attachments\"; filename=\"\"
Content-Type: application/octet-stream


--XBOUNDARY--
";
        let upload = PostUpload::from_request(multipart_request(body), &())
            .await
            .unwrap();
        assert_eq!(upload.title.as_deref(), Some("Sunset"));
        assert_eq!(upload.owner_id.as_deref(), Some("3"));
        assert!(upload.description.is_none());
        assert_eq!(upload.attachments.len(), 1);
        match &upload.attachments[0] {
            UploadedAttachment::File {
                file_name,
                content_type,
                bytes,
            } => {
                assert_eq!(file_name, "sun.png");
                assert_eq!(content_type.as_deref(), Some("image/png"));
                assert_eq!(&bytes[..], b"PNGDATA");
            }
            other => panic!("unexpected attachment {:?}", other),
        }
    }

    #[tokio::test]
    async fn reads_json_body_with_numeric_owner() {
        let json = serde_json::json!({
            "title": "Legacy",
            "U_id": 12,
            "Attachments": [{ "A_name": "a.png", "A_type": "image/png", "File_size": 4 }]
        });
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap();

        let upload = PostUpload::from_request(req, &()).await.unwrap();
        assert_eq!(upload.owner_id.as_deref(), Some("12"));
        assert!(matches!(
            &upload.attachments[0],
            UploadedAttachment::Metadata { name: Some(n), size: Some(4), .. } if n == "a.png"
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let err = PostUpload::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
