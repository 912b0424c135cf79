use crate::types::UserConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

#[derive(serde::Serialize, serde::Deserialize, Default)]
struct ConfigFile {
	#[serde(default)]
	users: HashMap<String, UserConfig>,
}

#[async_trait]
pub trait UserConfigStore: Send + Sync {
	async fn get_active_users(&self) -> Result<Vec<UserConfig>>;
	async fn get(&self, user_id: u64) -> Result<Option<UserConfig>>;
	async fn upsert(&self, config: UserConfig) -> Result<()>;
}

/// TOML file backed store, one row per user keyed by id. Writes go through
/// a temp-file-then-rename so a crash mid-write can't leave the file
/// truncated; reads are served from an in-memory cache that's invalidated
/// on every `upsert` and otherwise trusted for the process lifetime.
pub struct FileUserConfigStore {
	path: PathBuf,
	cache: Arc<RwLock<HashMap<u64, UserConfig>>>,
}

impl FileUserConfigStore {
	pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let file = match fs::read_to_string(&path).await {
			Ok(contents) if contents.trim().is_empty() => ConfigFile::default(),
			Ok(contents) => toml::from_str(&contents).context("failed to parse user config store")?,
			Err(err) if err.kind() == ErrorKind::NotFound => ConfigFile::default(),
			Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
		};

		let cache = file.users.into_values().map(|u| (u.user_id, u)).collect();
		Ok(Self { path, cache: Arc::new(RwLock::new(cache)) })
	}

	async fn persist(&self, users: &HashMap<u64, UserConfig>) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await.with_context(|| format!("failed to create {}", parent.display()))?;
		}

		let file = ConfigFile { users: users.iter().map(|(id, cfg)| (id.to_string(), cfg.clone())).collect() };
		let serialized = toml::to_string_pretty(&file).context("failed to serialize user config store")?;

		let tmp_path = self.path.with_extension("toml.tmp");
		fs::write(&tmp_path, serialized).await.with_context(|| format!("failed to write {}", tmp_path.display()))?;
		fs::rename(&tmp_path, &self.path).await.with_context(|| format!("failed to install {}", self.path.display()))?;

		Ok(())
	}
}

#[async_trait]
impl UserConfigStore for FileUserConfigStore {
	async fn get_active_users(&self) -> Result<Vec<UserConfig>> {
		let cache = self.cache.read().await;
		Ok(cache.values().filter(|u| u.is_active).cloned().collect())
	}

	async fn get(&self, user_id: u64) -> Result<Option<UserConfig>> {
		let cache = self.cache.read().await;
		Ok(cache.get(&user_id).cloned())
	}

	async fn upsert(&self, config: UserConfig) -> Result<()> {
		let mut cache = self.cache.write().await;
		cache.insert(config.user_id, config);
		self.persist(&cache).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn upsert_then_get_round_trips() {
		let dir = std::env::temp_dir().join(format!("user_config_store_test_{}", std::process::id()));
		let store = FileUserConfigStore::load(dir.join("users.toml")).await.unwrap();

		let cfg = UserConfig { user_id: 42, username: "alice".into(), ..Default::default() };
		store.upsert(cfg.clone()).await.unwrap();

		let fetched = store.get(42).await.unwrap().unwrap();
		assert_eq!(fetched.username, "alice");

		let _ = fs::remove_dir_all(&dir).await;
	}

	#[tokio::test]
	async fn get_active_users_excludes_inactive() {
		let dir = std::env::temp_dir().join(format!("user_config_store_test_active_{}", std::process::id()));
		let store = FileUserConfigStore::load(dir.join("users.toml")).await.unwrap();

		store.upsert(UserConfig { user_id: 1, is_active: true, ..Default::default() }).await.unwrap();
		store.upsert(UserConfig { user_id: 2, is_active: false, ..Default::default() }).await.unwrap();

		let active = store.get_active_users().await.unwrap();
		assert_eq!(active.len(), 1);
		assert_eq!(active[0].user_id, 1);

		let _ = fs::remove_dir_all(&dir).await;
	}
}
