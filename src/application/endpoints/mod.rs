//! Admin API controllers. Each endpoint validates its frame against a static
//! [`EndpointSpec`](crate::application::pipeline::EndpointSpec), authorizes the
//! caller, runs its query and reports the cache decision.

pub mod posts;
pub mod settings;

use std::sync::Arc;

use url::Url;

use crate::application::members::{MembersService, StripeGateway, StripeService};
use crate::application::permissions::PermissionsService;
use crate::application::posts::PostsService;
use crate::application::repos::{MembersRepo, PostsRepo, SettingsRepo, UsersRepo};
use crate::application::route_settings::RouteSettings;
use crate::application::settings::SettingsBreadService;
use crate::application::settings::key_updates::{KeyUpdateTokens, KeyVerificationMailer};

pub use posts::PostsEndpoints;
pub use settings::SettingsEndpoints;

/// Collaborators the admin API is assembled from.
pub struct AdminDeps {
    pub posts: Arc<dyn PostsRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub settings: Arc<dyn SettingsRepo>,
    pub members: Arc<dyn MembersRepo>,
    pub stripe: Arc<dyn StripeGateway>,
    pub mailer: Arc<dyn KeyVerificationMailer>,
    pub key_tokens: Arc<KeyUpdateTokens>,
    pub routes: RouteSettings,
    pub site_url: Url,
}

#[derive(Clone)]
pub struct AdminApi {
    pub posts: PostsEndpoints,
    pub settings: SettingsEndpoints,
}

impl AdminApi {
    pub fn new(deps: AdminDeps) -> Self {
        let permissions = PermissionsService::new(deps.users.clone());
        let posts = PostsEndpoints::new(
            PostsService::new(deps.posts, deps.users),
            permissions.clone(),
            deps.site_url,
        );
        let settings = SettingsEndpoints::new(
            SettingsBreadService::new(deps.settings.clone(), deps.key_tokens, deps.mailer),
            deps.settings.clone(),
            MembersService::new(deps.members),
            StripeService::new(deps.settings, deps.stripe),
            deps.routes,
            permissions,
        );
        Self { posts, settings }
    }
}
