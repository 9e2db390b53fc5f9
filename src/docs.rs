use crate::common::media::MediaKind;
use crate::modules::compress::dto::*;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "mediashrink",
        description = "Upload video or audio files and download smaller transcoded copies"
    ),
    paths(
        crate::modules::compress::handler::upload_files,
        crate::modules::compress::handler::get_progress,
        crate::modules::compress::handler::download_file,
        crate::modules::compress::handler::cancel_job,
        crate::modules::compress::handler::health,
        crate::modules::compress::handler::status,
    ),
    components(
        schemas(
            MediaKind,
            CompressedFile, FileResult, BatchSummary,
            ProgressResponse, CancelResponse,
            HealthResponse, StatusResponse, ActiveJob,
        )
    ),
    tags(
        (name = "Compress", description = "Upload, progress, download and cancellation"),
        (name = "System", description = "Health and service status")
    )
)]
pub struct ApiDoc;
