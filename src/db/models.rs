use serde::Serialize;

/// The first account created. It owns the public group and cannot be
/// demoted, disabled or deleted.
pub const ROOT_USER_ID: i64 = 1;

/// The shared group every user sees read-only.
pub const PUBLIC_GROUP_ID: i64 = 1;

pub const DEFAULT_BACKGROUND: &str = "/static/default_bg.jpg";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub custom_bg: Option<String>,
    pub hidden_groups: String,
}

impl User {
    pub fn is_root(&self) -> bool {
        self.id == ROOT_USER_ID
    }

    pub fn hidden_group_ids(&self) -> Vec<i64> {
        parse_hidden_groups(&self.hidden_groups)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    #[serde(rename = "order")]
    pub position: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupWithLinks {
    #[serde(flatten)]
    pub group: Group,
    pub is_readonly: bool,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub icon: Option<String>,
    pub http_title: Option<String>,
    #[serde(rename = "order")]
    pub position: i64,
    pub group_id: i64,
}

/// A link joined with its owner, as shown on the moderation page.
#[derive(Debug, Clone)]
pub struct OwnedLink {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub http_title: Option<String>,
    pub owner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub size: i64,
}

/// Parses the comma separated `hidden_groups` column, ignoring junk entries.
pub fn parse_hidden_groups(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect()
}

/// Adds `group_id` to the hidden list, or removes it if already present.
pub fn toggle_hidden_group(raw: &str, group_id: i64) -> String {
    let target = group_id.to_string();
    let mut entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if let Some(pos) = entries.iter().position(|e| *e == target) {
        entries.remove(pos);
    } else {
        entries.push(&target);
    }
    entries.join(",")
}
