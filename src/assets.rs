//! The upload tree served under `/static`.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;

use crate::db::models::DEFAULT_BACKGROUND;

pub const STATIC_PREFIX: &str = "/static";
const ICONS_DIR: &str = "icons";
const UPLOADS_DIR: &str = "user_uploads";
const KEEP_FILE: &str = ".gitkeep";

/// Site-wide images an administrator can replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteAsset {
    Background,
    DefaultError,
    DefaultLink,
}

impl SiteAsset {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "background" => Some(SiteAsset::Background),
            "default_error" => Some(SiteAsset::DefaultError),
            "default_link" => Some(SiteAsset::DefaultLink),
            _ => None,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            SiteAsset::Background => "default_bg.jpg",
            SiteAsset::DefaultError => "default_error.jpg",
            SiteAsset::DefaultLink => "default_link.jpg",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnusedIcon {
    pub filename: String,
    pub url: String,
    pub size: String,
    /// Seconds since the epoch
    pub mtime: f64,
}

pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.root.join(ICONS_DIR))?;
        std::fs::create_dir_all(self.root.join(UPLOADS_DIR))?;
        Ok(())
    }

    /// Stores an icon under a fresh name and returns its public path.
    pub async fn save_icon(&self, bytes: &[u8], ext: &str) -> std::io::Result<String> {
        self.save_unique(ICONS_DIR, bytes, ext).await
    }

    pub async fn save_background(&self, bytes: &[u8], ext: &str) -> std::io::Result<String> {
        self.save_unique(UPLOADS_DIR, bytes, ext).await
    }

    async fn save_unique(&self, dir: &str, bytes: &[u8], ext: &str) -> std::io::Result<String> {
        let name = format!("{}{}", uuid::Uuid::now_v7(), ext);
        let dir_path = self.root.join(dir);
        fs::create_dir_all(&dir_path).await?;
        fs::write(dir_path.join(&name), bytes).await?;
        Ok(format!("{STATIC_PREFIX}/{dir}/{name}"))
    }

    /// Overwrites one of the fixed site images and returns its public path.
    pub async fn replace_site_asset(&self, asset: SiteAsset, bytes: &[u8]) -> std::io::Result<String> {
        fs::create_dir_all(&self.root).await?;
        fs::write(self.root.join(asset.file_name()), bytes).await?;
        Ok(format!("{STATIC_PREFIX}/{}", asset.file_name()))
    }

    /// Removes an icon file referenced by `public_path`. Paths outside
    /// `/static/icons/` are left alone.
    pub async fn remove_icon(&self, public_path: &str) {
        self.remove_under(ICONS_DIR, public_path).await;
    }

    /// Removes a previous custom background. The shared default is never touched.
    pub async fn remove_background(&self, public_path: &str) {
        if public_path == DEFAULT_BACKGROUND {
            return;
        }
        self.remove_under(UPLOADS_DIR, public_path).await;
    }

    async fn remove_under(&self, dir: &str, public_path: &str) {
        let Some(path) = self.resolve(dir, public_path) else {
            return;
        };
        match fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }

    /// Maps `/static/<dir>/<name>` to a file on disk. Anything else,
    /// including names that try to leave the directory, yields `None`.
    fn resolve(&self, dir: &str, public_path: &str) -> Option<PathBuf> {
        let prefix = format!("{STATIC_PREFIX}/{dir}/");
        let name = public_path.strip_prefix(&prefix)?;
        let name = safe_file_name(name)?;
        Some(self.root.join(dir).join(name))
    }

    /// Icon files that no link references, newest first.
    pub async fn list_unused_icons(
        &self,
        referenced: &std::collections::HashSet<String>,
    ) -> std::io::Result<Vec<UnusedIcon>> {
        let dir = self.root.join(ICONS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut unused = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename == KEEP_FILE || referenced.contains(&filename) {
                continue;
            }
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();

            unused.push(UnusedIcon {
                url: format!("{STATIC_PREFIX}/{ICONS_DIR}/{filename}"),
                size: format_kb(meta.len()),
                filename,
                mtime,
            });
        }

        unused.sort_by(|a, b| b.mtime.total_cmp(&a.mtime));
        Ok(unused)
    }

    /// Deletes icons by file name. Directory parts of each name are ignored.
    /// Returns how many files were removed.
    pub async fn delete_icons(&self, names: &[String]) -> usize {
        let dir = self.root.join(ICONS_DIR);
        let mut removed = 0;
        for name in names {
            let Some(safe) = base_name(name) else {
                continue;
            };
            let path = dir.join(safe);
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to delete {}: {}", path.display(), e),
            }
        }
        removed
    }
}

/// Whether `public_path` names a file in the per-user background tree.
pub fn is_uploaded_background(public_path: &str) -> bool {
    public_path.starts_with(&format!("{STATIC_PREFIX}/{UPLOADS_DIR}/"))
}

fn format_kb(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn safe_file_name(name: &str) -> Option<&str> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        None
    } else {
        Some(name)
    }
}

fn base_name(name: &str) -> Option<&str> {
    let last = name.rsplit(['/', '\\']).next()?;
    safe_file_name(last)
}

/// Extension (with the leading dot) for an uploaded file. The client's file
/// name wins; otherwise the content type is consulted. Only short
/// alphanumeric extensions are kept.
pub fn upload_extension(filename: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = filename
        .and_then(|f| Path::new(f).extension())
        .and_then(|e| e.to_str())
        .map(str::to_string);
    let from_mime = || {
        content_type
            .and_then(mime_guess::get_mime_extensions_str)
            .and_then(|exts| exts.first())
            .map(|e| e.to_string())
    };

    match from_name.or_else(from_mime) {
        Some(ext) if !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn store() -> (tempfile::TempDir, AssetStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = AssetStore::new(tmp.path().join("static"));
        store.ensure_dirs().unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn saved_icon_is_reachable_under_static() {
        let (_tmp, store) = store();
        let url = store.save_icon(b"png", ".png").await.unwrap();
        assert!(url.starts_with("/static/icons/"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        let on_disk = store.root().join("icons").join(name);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"png");
    }

    #[tokio::test]
    async fn remove_icon_ignores_foreign_paths() {
        let (_tmp, store) = store();
        std::fs::write(store.root().join("default_link.jpg"), b"x").unwrap();

        store.remove_icon("/static/default_link.jpg").await;
        store.remove_icon("/static/icons/../default_link.jpg").await;
        store.remove_icon("https://example.test/icon.png").await;
        assert!(store.root().join("default_link.jpg").exists());

        let url = store.save_icon(b"x", ".ico").await.unwrap();
        store.remove_icon(&url).await;
        let name = url.rsplit('/').next().unwrap();
        assert!(!store.root().join("icons").join(name).exists());
    }

    #[tokio::test]
    async fn default_background_is_never_removed() {
        let (_tmp, store) = store();
        std::fs::write(store.root().join("default_bg.jpg"), b"bg").unwrap();
        store.remove_background(DEFAULT_BACKGROUND).await;
        assert!(store.root().join("default_bg.jpg").exists());

        let custom = store.save_background(b"mine", ".jpg").await.unwrap();
        assert!(custom.starts_with("/static/user_uploads/"));
        store.remove_background(&custom).await;
        let name = custom.rsplit('/').next().unwrap();
        assert!(!store.root().join("user_uploads").join(name).exists());
    }

    #[tokio::test]
    async fn site_assets_overwrite_fixed_names() {
        let (_tmp, store) = store();
        let url = store
            .replace_site_asset(SiteAsset::DefaultError, b"one")
            .await
            .unwrap();
        assert_eq!(url, "/static/default_error.jpg");
        store
            .replace_site_asset(SiteAsset::DefaultError, b"two")
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(store.root().join("default_error.jpg")).unwrap(),
            b"two"
        );
        assert_eq!(SiteAsset::parse("nope"), None);
    }

    #[tokio::test]
    async fn unused_icons_skip_referenced_and_keep_file() {
        let (_tmp, store) = store();
        let icons = store.root().join("icons");
        std::fs::write(icons.join(".gitkeep"), b"").unwrap();
        std::fs::write(icons.join("used.png"), b"x").unwrap();
        std::fs::write(icons.join("stale.png"), vec![0u8; 2048]).unwrap();

        let referenced: HashSet<String> = ["used.png".to_string()].into_iter().collect();
        let unused = store.list_unused_icons(&referenced).await.unwrap();

        assert_eq!(unused.len(), 1);
        assert_eq!(unused[0].filename, "stale.png");
        assert_eq!(unused[0].url, "/static/icons/stale.png");
        assert_eq!(unused[0].size, "2.0 KB");
    }

    #[tokio::test]
    async fn delete_icons_uses_base_names_only() {
        let (_tmp, store) = store();
        std::fs::write(store.root().join("icons").join("a.png"), b"x").unwrap();
        std::fs::write(store.root().join("keep.jpg"), b"x").unwrap();

        let removed = store
            .delete_icons(&[
                "../../a.png".to_string(),
                "../keep.jpg".to_string(),
                "missing.png".to_string(),
            ])
            .await;

        assert_eq!(removed, 1);
        assert!(store.root().join("keep.jpg").exists());
    }

    #[test]
    fn upload_extension_prefers_file_name() {
        assert_eq!(upload_extension(Some("photo.JPG"), Some("image/png")), ".jpg");
        assert_eq!(upload_extension(Some("noext"), Some("image/png")), ".png");
        assert_eq!(upload_extension(Some("evil.p/hp"), None), "");
        assert_eq!(upload_extension(None, None), "");
    }

    #[test]
    fn uploaded_backgrounds_are_recognized() {
        assert!(is_uploaded_background("/static/user_uploads/a.jpg"));
        assert!(!is_uploaded_background(DEFAULT_BACKGROUND));
        assert!(!is_uploaded_background("https://img.test/static/user_uploads/a.jpg"));
    }
}
