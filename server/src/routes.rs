use crate::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hr_rag_core::{Answer, CoreError, Document, IngestError, IngestReport, NewDocument};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::InputError(_) => ApiError(StatusCode::BAD_REQUEST, err.to_string()),
            CoreError::Store(hr_rag_core::StoreError::DocumentNotFound(_)) => {
                ApiError(StatusCode::NOT_FOUND, err.to_string())
            }
            _ => {
                error!(error = %err, "internal error");
                ApiError(StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        error!(error = %err, "ingestion could not be started");
        ApiError(StatusCode::CONFLICT, err.to_string())
    }
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<Answer>, ApiError> {
    let answer = state
        .coordinator
        .ask(&request.question, request.user_id.as_deref())
        .await?;
    Ok(Json(answer))
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let docs = state.store.list_documents().await.map_err(CoreError::from)?;
    Ok(Json(docs))
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_document(id).await.map_err(CoreError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<IngestReport>, ApiError> {
    let report = state.ingestion.ingest(id).await?;
    Ok(Json(report))
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Document>, ApiError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
        match field.name().unwrap_or_default() {
            "title" => title = Some(field.text().await.map_err(multipart_err)?),
            "description" => description = Some(field.text().await.map_err(multipart_err)?),
            "file" => {
                original_filename = field.file_name().map(str::to_string);
                file_bytes = Some(field.bytes().await.map_err(multipart_err)?.to_vec());
            }
            _ => {}
        }
    }

    let original_filename = original_filename
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "missing file field".to_string()))?;
    let bytes = file_bytes
        .ok_or_else(|| ApiError(StatusCode::BAD_REQUEST, "missing file contents".to_string()))?;

    if bytes.len() as u64 > state.config.uploads.max_bytes {
        return Err(ApiError(StatusCode::PAYLOAD_TOO_LARGE, "file exceeds upload size limit".to_string()));
    }

    let extension = std::path::Path::new(&original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    if hr_rag_core::FileKind::from_extension(&extension).is_none() {
        return Err(ApiError(StatusCode::BAD_REQUEST, format!("unsupported file type: {extension}")));
    }

    let title = title.unwrap_or_else(|| original_filename.clone());

    let document = state
        .store
        .create_document(
            NewDocument {
                original_filename,
                file_type: extension,
                title,
                description,
            },
            &state.config.uploads.dir,
        )
        .await
        .map_err(CoreError::from)?;

    tokio::fs::create_dir_all(&state.config.uploads.dir)
        .await
        .map_err(CoreError::Io)?;
    tokio::fs::write(&document.file_path, &bytes)
        .await
        .map_err(CoreError::Io)?;

    Ok(Json(document))
}

fn multipart_err(err: MultipartError) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, format!("malformed upload: {err}"))
}
