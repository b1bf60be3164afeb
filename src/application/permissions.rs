//! Role-based permission checks for admin endpoints.
//!
//! [`decide`] is pure; [`PermissionsService`] resolves the caller's roles
//! and feeds them into it.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::application::error::EndpointError;
use crate::application::frame::RequestContext;
use crate::application::pipeline::EndpointSpec;
use crate::application::repos::{UserLookup, UsersRepo};
use crate::domain::entities::PostRecord;
use crate::domain::settings::{LABS, is_secret};
use crate::domain::types::{PostStatus, RoleName};

const DENIED: &str = "You do not have permission to perform this action";

/// Caller identity with resolved roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub roles: Vec<RoleName>,
    pub internal: bool,
}

impl Actor {
    pub fn internal() -> Self {
        Self {
            user_id: None,
            roles: Vec::new(),
            internal: true,
        }
    }

    pub fn has_any(&self, roles: &[RoleName]) -> bool {
        self.roles.iter().any(|role| roles.contains(role))
    }

    /// Internal callers and Owner/Administrator/Editor may send email.
    pub fn can_send_email(&self) -> bool {
        self.internal || self.roles.iter().any(|role| role.can_send_email())
    }

    fn is_staff_manager(&self) -> bool {
        self.has_any(&[
            RoleName::Owner,
            RoleName::Administrator,
            RoleName::Editor,
            RoleName::AdminIntegration,
        ])
    }
}

/// What a request is acting on.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    None,
    Post {
        existing: Option<&'a PostRecord>,
        attrs: &'a Map<String, Value>,
    },
    Setting {
        key: &'a str,
    },
    SettingsEdit {
        labs: Option<&'a Value>,
    },
}

/// Decide whether `actor` may run `<doc>.<method>` on `subject`.
pub fn decide(
    actor: &Actor,
    doc: &str,
    method: &str,
    subject: Subject<'_>,
) -> Result<(), EndpointError> {
    if actor.internal {
        return Ok(());
    }
    if actor.roles.is_empty() {
        return Err(EndpointError::no_permission(DENIED));
    }

    let allowed = match (doc, method) {
        ("posts", "browse" | "read") => true,
        ("posts", "add" | "edit" | "destroy") => decide_post_write(actor, method, subject),
        ("settings", "browse") => true,
        ("settings", "read") => match subject {
            Subject::Setting { key } if is_secret(key) => actor.has_any(&[
                RoleName::Owner,
                RoleName::Administrator,
                RoleName::AdminIntegration,
            ]),
            _ => true,
        },
        ("settings", "edit") => {
            let base = actor.has_any(&[
                RoleName::Owner,
                RoleName::Administrator,
                RoleName::AdminIntegration,
            ]);
            match subject {
                Subject::SettingsEdit { labs: Some(_) } => {
                    base && actor.roles.iter().any(|role| role.is_elevated())
                }
                _ => base,
            }
        }
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(EndpointError::no_permission(DENIED))
    }
}

fn decide_post_write(actor: &Actor, method: &str, subject: Subject<'_>) -> bool {
    if actor.is_staff_manager() {
        return true;
    }
    let Some(user_id) = actor.user_id else {
        return false;
    };
    let (existing, attrs) = match subject {
        Subject::Post { existing, attrs } => (existing, Some(attrs)),
        _ => (None, None),
    };

    if let Some(post) = existing
        && !post.is_authored_by(user_id)
    {
        return false;
    }

    let author_ids = attrs.and_then(|attrs| attrs.get("authors")).map(author_ids);

    if actor.roles.contains(&RoleName::Author) {
        return author_ids.is_none_or(|ids| ids.contains(&user_id));
    }

    if actor.roles.contains(&RoleName::Contributor) {
        if let Some(post) = existing
            && post.status != PostStatus::Draft
        {
            return false;
        }
        if method == "destroy" {
            return true;
        }
        let status_ok = attrs
            .and_then(|attrs| attrs.get("status"))
            .and_then(Value::as_str)
            .is_none_or(|status| status == PostStatus::Draft.as_str());
        let visibility_untouched = attrs.is_none_or(|attrs| !attrs.contains_key("visibility"));
        let sole_author = author_ids.is_none_or(|ids| ids == [user_id]);
        return status_ok && visibility_untouched && sole_author;
    }

    false
}

fn author_ids(value: &Value) -> Vec<Uuid> {
    value
        .as_array()
        .map(|authors| {
            authors
                .iter()
                .filter_map(|author| author.get("id").and_then(Value::as_str))
                .filter_map(|id| Uuid::parse_str(id).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct PermissionsService {
    users: Arc<dyn UsersRepo>,
}

impl PermissionsService {
    pub fn new(users: Arc<dyn UsersRepo>) -> Self {
        Self { users }
    }

    /// Resolve roles for the caller. A user that no longer exists has no
    /// roles.
    pub async fn actor(&self, context: &RequestContext) -> Result<Actor, EndpointError> {
        if context.internal {
            return Ok(Actor::internal());
        }
        if let Some(user_id) = context.user {
            let roles = self
                .users
                .find_user(&UserLookup::Id(user_id))
                .await?
                .map(|user| user.roles)
                .unwrap_or_default();
            return Ok(Actor {
                user_id: Some(user_id),
                roles,
                internal: false,
            });
        }
        if context.integration.is_some() {
            return Ok(Actor {
                user_id: None,
                roles: vec![RoleName::AdminIntegration],
                internal: false,
            });
        }
        Ok(Actor {
            user_id: None,
            roles: Vec::new(),
            internal: false,
        })
    }

    pub async fn ensure(
        &self,
        context: &RequestContext,
        spec: &EndpointSpec,
        subject: Subject<'_>,
    ) -> Result<Actor, EndpointError> {
        let actor = self.actor(context).await?;
        let method = spec.permission_method();
        if let Err(err) = decide(&actor, spec.doc, method, subject) {
            debug!(
                target = "quire::application::permissions",
                doc = spec.doc,
                method,
                user = ?actor.user_id,
                "permission denied"
            );
            return Err(err);
        }
        Ok(actor)
    }
}

/// Pick the unsafe attributes present in a write payload.
pub fn unsafe_attrs(entry: Option<&Value>, names: &[&str]) -> Map<String, Value> {
    let mut picked = Map::new();
    if let Some(object) = entry.and_then(Value::as_object) {
        for name in names {
            if let Some(value) = object.get(*name) {
                picked.insert((*name).to_string(), value.clone());
            }
        }
    }
    picked
}

/// Locate the `labs` entry of a settings edit payload.
pub fn labs_entry(settings: &Value) -> Option<&Value> {
    settings
        .as_array()?
        .iter()
        .find(|entry| entry.get("key").and_then(Value::as_str) == Some(LABS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::OffsetDateTime;

    use crate::domain::entities::AuthorRef;
    use crate::domain::types::PostVisibility;

    fn actor(role: RoleName, user_id: Uuid) -> Actor {
        Actor {
            user_id: Some(user_id),
            roles: vec![role],
            internal: false,
        }
    }

    fn post_by(author: Uuid, status: PostStatus) -> PostRecord {
        let now = OffsetDateTime::now_utc();
        PostRecord {
            id: Uuid::new_v4(),
            uuid: Uuid::new_v4(),
            slug: "post".into(),
            title: "Post".into(),
            html: None,
            plaintext: None,
            lexical: None,
            mobiledoc: None,
            status,
            visibility: PostVisibility::Public,
            featured: false,
            custom_excerpt: None,
            feature_image: None,
            newsletter: None,
            email_segment: None,
            published_at: None,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            authors: vec![AuthorRef {
                id: author,
                slug: "a".into(),
                name: "A".into(),
                email: "a@example.com".into(),
                roles: Vec::new(),
            }],
        }
    }

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn internal_context_bypasses_checks() {
        assert!(decide(&Actor::internal(), "settings", "edit", Subject::None).is_ok());
    }

    #[test]
    fn roleless_actor_is_denied() {
        let nobody = Actor {
            user_id: Some(Uuid::new_v4()),
            roles: Vec::new(),
            internal: false,
        };
        assert!(decide(&nobody, "posts", "browse", Subject::None).is_err());
    }

    #[test]
    fn authors_edit_only_their_posts() {
        let me = Uuid::new_v4();
        let mine = post_by(me, PostStatus::Published);
        let theirs = post_by(Uuid::new_v4(), PostStatus::Draft);
        let empty = Map::new();

        let author = actor(RoleName::Author, me);
        let own = Subject::Post {
            existing: Some(&mine),
            attrs: &empty,
        };
        let foreign = Subject::Post {
            existing: Some(&theirs),
            attrs: &empty,
        };
        assert!(decide(&author, "posts", "edit", own).is_ok());
        assert!(decide(&author, "posts", "edit", foreign).is_err());
    }

    #[test]
    fn authors_cannot_drop_themselves() {
        let me = Uuid::new_v4();
        let mine = post_by(me, PostStatus::Draft);
        let other = Uuid::new_v4();
        let payload = attrs(json!({"authors": [{"id": other.to_string()}]}));
        let subject = Subject::Post {
            existing: Some(&mine),
            attrs: &payload,
        };
        assert!(decide(&actor(RoleName::Author, me), "posts", "edit", subject).is_err());
    }

    #[test]
    fn contributors_stay_in_draft() {
        let me = Uuid::new_v4();
        let contributor = actor(RoleName::Contributor, me);
        let publish = attrs(json!({"status": "published"}));
        let draft = attrs(json!({"status": "draft"}));
        let visibility = attrs(json!({"visibility": "paid"}));

        for (payload, expected) in [(&publish, false), (&draft, true), (&visibility, false)] {
            let subject = Subject::Post {
                existing: None,
                attrs: payload,
            };
            assert_eq!(
                decide(&contributor, "posts", "add", subject).is_ok(),
                expected
            );
        }

        let published = post_by(me, PostStatus::Published);
        let subject = Subject::Post {
            existing: Some(&published),
            attrs: &draft,
        };
        assert!(decide(&contributor, "posts", "edit", subject).is_err());
    }

    #[test]
    fn settings_edit_requires_admin_and_labs_requires_elevation() {
        let user = Uuid::new_v4();
        let labs = json!({"key": "labs", "value": "{}"});
        let labs_subject = Subject::SettingsEdit { labs: Some(&labs) };
        let plain_subject = Subject::SettingsEdit { labs: None };

        let editor = actor(RoleName::Editor, user);
        assert!(decide(&editor, "settings", "edit", plain_subject).is_err());

        let admin = actor(RoleName::Administrator, user);
        assert!(decide(&admin, "settings", "edit", labs_subject).is_ok());

        let integration = Actor {
            user_id: None,
            roles: vec![RoleName::AdminIntegration],
            internal: false,
        };
        assert!(decide(&integration, "settings", "edit", plain_subject).is_ok());
        assert!(decide(&integration, "settings", "edit", labs_subject).is_err());
    }

    #[test]
    fn secret_settings_read_needs_admin() {
        let user = Uuid::new_v4();
        let subject = Subject::Setting {
            key: "stripe_connect_secret_key",
        };
        assert!(decide(&actor(RoleName::Editor, user), "settings", "read", subject).is_err());
        assert!(
            decide(
                &actor(RoleName::Owner, user),
                "settings",
                "read",
                subject
            )
            .is_ok()
        );
    }

    #[test]
    fn labs_entry_is_found_by_key() {
        let payload = json!([{"key": "title", "value": "x"}, {"key": "labs", "value": "{}"}]);
        assert!(labs_entry(&payload).is_some());
        assert!(labs_entry(&json!([{"key": "title"}])).is_none());
    }
}
