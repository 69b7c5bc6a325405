use std::sync::Arc;

use aio_core::{BridgeError, DirectoryListing, DirectoryMember, DirectoryUnit};
use serde_json::Value;

use crate::api::FeishuApi;
use crate::backend::ApiRequest;

pub(crate) const USERS_BY_DEPARTMENT_PATH: &str = "/contact/v3/users/find_by_department";

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Convert a Contact API department object. Returns `None` without an id.
pub fn parse_department(item: &Value) -> Option<DirectoryUnit> {
    let remote_id =
        non_empty(&item["department_id"]).or_else(|| non_empty(&item["open_department_id"]))?;
    let parent_remote_id = non_empty(&item["parent_department_id"]).filter(|p| p != "0");
    Some(DirectoryUnit {
        remote_id,
        display_name: item["name"].as_str().unwrap_or("").to_string(),
        parent_remote_id,
        leader_remote_id: non_empty(&item["leader_user_id"]),
        active: !item["status"]["is_deleted"].as_bool().unwrap_or(false),
    })
}

/// Convert a Contact API user object. Returns `None` without a `user_id`.
pub fn parse_user(item: &Value) -> Option<DirectoryMember> {
    let remote_id = non_empty(&item["user_id"])?;
    let status = &item["status"];
    let activated = status["is_active"]
        .as_bool()
        .or_else(|| status["is_activated"].as_bool())
        .unwrap_or(false);
    let resigned = status["is_resigned"].as_bool().unwrap_or(false);
    let unit_ids = item["department_ids"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    Some(DirectoryMember {
        remote_id,
        display_name: item["name"].as_str().unwrap_or("").to_string(),
        email: non_empty(&item["email"]),
        phone: non_empty(&item["mobile"]),
        unit_ids,
        active: activated && !resigned,
    })
}

/// Paginated reads of the Contact API.
///
/// Each listing follows `page_token` while `has_more` is set and returns all
/// pages concatenated in order. A failing page ends the loop: the listing
/// carries what was read so far plus the error, see
/// [`DirectoryListing::is_complete`].
pub struct DirectoryFetcher {
    api: Arc<FeishuApi>,
    page_size: u32,
    root_department_id: String,
}

impl DirectoryFetcher {
    pub(crate) fn new(api: Arc<FeishuApi>, page_size: u32, root_department_id: String) -> Self {
        Self {
            api,
            page_size,
            root_department_id,
        }
    }

    /// All departments below the configured root, recursively.
    pub async fn list_units(&self) -> DirectoryListing<DirectoryUnit> {
        let path = format!(
            "/contact/v3/departments/{}/children",
            urlencoding::encode(&self.root_department_id)
        );
        let request = ApiRequest::get(path)
            .with_query("fetch_child", "true")
            .with_query("department_id_type", "department_id")
            .with_query("user_id_type", "user_id");
        self.paginate("list_units", request, parse_department).await
    }

    /// Direct members of `unit_id`.
    pub async fn list_members(&self, unit_id: &str) -> DirectoryListing<DirectoryMember> {
        let request = ApiRequest::get(USERS_BY_DEPARTMENT_PATH)
            .with_query("department_id", unit_id)
            .with_query("department_id_type", "department_id")
            .with_query("user_id_type", "user_id");
        self.paginate("list_members", request, parse_user).await
    }

    async fn paginate<T>(
        &self,
        ctx: &str,
        base: ApiRequest,
        parse: fn(&Value) -> Option<T>,
    ) -> DirectoryListing<T> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let mut request = base
                .clone()
                .with_query("page_size", self.page_size.to_string());
            if let Some(token) = &page_token {
                request = request.with_query("page_token", token.as_str());
            }
            let data = match self.api.call(request, ctx).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(
                        ctx,
                        pages,
                        items = items.len(),
                        error = %e,
                        "directory listing interrupted, returning partial result"
                    );
                    return DirectoryListing::partial(items, e);
                }
            };
            pages += 1;
            if let Some(page) = data["items"].as_array() {
                items.extend(page.iter().filter_map(parse));
            }
            if !data["has_more"].as_bool().unwrap_or(false) {
                break;
            }
            match non_empty(&data["page_token"]) {
                Some(next) => page_token = Some(next),
                None => {
                    let e = BridgeError::Parsing(format!("{ctx}: has_more without page_token"));
                    tracing::warn!(ctx, pages, error = %e, "directory listing interrupted");
                    return DirectoryListing::partial(items, e);
                }
            }
        }
        tracing::debug!(ctx, pages, items = items.len(), "directory listing complete");
        DirectoryListing::complete(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn department_root_parent_is_none() {
        let unit = parse_department(&json!({
            "department_id": "od-1",
            "name": "Engineering",
            "parent_department_id": "0",
            "leader_user_id": "",
            "status": { "is_deleted": false }
        }))
        .unwrap();
        assert_eq!(unit.parent_remote_id, None);
        assert_eq!(unit.leader_remote_id, None);
        assert!(unit.active);
    }

    #[test]
    fn deleted_department_is_inactive() {
        let unit = parse_department(&json!({
            "department_id": "od-2",
            "name": "Legacy",
            "parent_department_id": "od-1",
            "leader_user_id": "u-9",
            "status": { "is_deleted": true }
        }))
        .unwrap();
        assert_eq!(unit.parent_remote_id.as_deref(), Some("od-1"));
        assert_eq!(unit.leader_remote_id.as_deref(), Some("u-9"));
        assert!(!unit.active);
    }

    #[test]
    fn department_without_id_is_skipped() {
        assert!(parse_department(&json!({ "name": "ghost" })).is_none());
    }

    #[test]
    fn user_fields_and_status() {
        let member = parse_user(&json!({
            "user_id": "u-1",
            "name": "Ada",
            "email": "ada@example.com",
            "mobile": "+8613800000000",
            "department_ids": ["od-1", "od-2"],
            "status": { "is_activated": true, "is_resigned": false }
        }))
        .unwrap();
        assert_eq!(member.display_name, "Ada");
        assert_eq!(member.phone.as_deref(), Some("+8613800000000"));
        assert_eq!(member.unit_ids.len(), 2);
        assert!(member.active);

        let resigned = parse_user(&json!({
            "user_id": "u-2",
            "status": { "is_active": true, "is_resigned": true }
        }))
        .unwrap();
        assert!(!resigned.active);
        assert_eq!(resigned.email, None);
    }

    #[test]
    fn user_without_user_id_is_skipped() {
        assert!(parse_user(&json!({ "open_id": "ou_1", "name": "x" })).is_none());
    }
}
