use std::sync::Arc;

use crate::application::api_keys::ApiKeyService;
use crate::application::endpoints::AdminApi;
use crate::cache::CacheTrigger;
use crate::infra::uploads::UploadStaging;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub admin: AdminApi,
    pub api_keys: Arc<ApiKeyService>,
    pub rate_limiter: Arc<ApiRateLimiter>,
    pub uploads: UploadStaging,
    pub cache: CacheTrigger,
    /// Lowercased name of the header a trusted frontend uses to pass the
    /// staff user id. Staff access is disabled when unset.
    pub trusted_user_header: Option<String>,
    pub max_request_bytes: usize,
}
