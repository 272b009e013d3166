//! Per-channel cursor persistence.
//!
//! File layout:
//!
//! ```json
//! {"channels": {"1181234567890123456": 1187654321098765432}}
//! ```
//!
//! The single-channel layout `{"last_message_id": <id>}` is still read. Its
//! value is held under [`LEGACY_CHANNEL_KEY`] until a configured channel
//! claims it, and every write uses the multi-channel layout.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    ferry_channels::{ChannelId, MessageId},
    serde::{Deserialize, Serialize},
    tokio::{fs, io::AsyncWriteExt},
    tracing::{debug, info, warn},
};

use crate::error::{Context, Result};

/// Channel key reserved for the legacy single cursor. No real channel has
/// id 0.
pub const LEGACY_CHANNEL_KEY: ChannelId = ChannelId(0);

#[derive(Debug, Default, Deserialize)]
struct CursorFile {
    #[serde(default)]
    channels: BTreeMap<String, RawId>,
}

#[derive(Debug, Serialize)]
struct CursorFileOut {
    channels: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
struct LegacyCursorFile {
    last_message_id: RawId,
}

/// Ids were written as integers historically; accept strings too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Str(String),
}

impl RawId {
    fn get(&self) -> Option<MessageId> {
        match self {
            Self::Int(v) => Some(MessageId(*v)),
            Self::Str(s) => s.parse().ok(),
        }
    }
}

/// Durable `channel → last processed message id` map.
///
/// Only the poll task writes, so there is no internal locking. Every
/// mutation is flushed to disk before it returns.
#[derive(Debug)]
pub struct CursorStore {
    path: PathBuf,
    cursors: BTreeMap<ChannelId, MessageId>,
}

impl CursorStore {
    /// Load cursors from `path`. A missing, unreadable, or malformed file
    /// yields an empty store.
    ///
    /// Reads synchronously; call it before the poll loop starts.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursors = match std::fs::read_to_string(&path) {
            Ok(raw) => parse(&raw).unwrap_or_else(|e| {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cursor file is malformed, starting empty"
                );
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cursor file yet");
                BTreeMap::new()
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cursor file is unreadable, starting empty"
                );
                BTreeMap::new()
            },
        };
        Self { path, cursors }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn get(&self, channel: ChannelId) -> Option<MessageId> {
        self.cursors.get(&channel).copied()
    }

    /// Cursor imported from the legacy single-channel file, if unclaimed.
    #[must_use]
    pub fn legacy(&self) -> Option<MessageId> {
        self.get(LEGACY_CHANNEL_KEY)
    }

    /// All cursors in channel order, the legacy entry included.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, MessageId)> + '_ {
        self.cursors.iter().map(|(c, m)| (*c, *m))
    }

    /// Advance the cursor for `channel` and persist it.
    ///
    /// Values at or below the stored cursor are ignored; returns whether the
    /// cursor moved.
    pub async fn set(&mut self, channel: ChannelId, message: MessageId) -> Result<bool> {
        if self.get(channel).is_some_and(|current| message <= current) {
            return Ok(false);
        }
        self.cursors.insert(channel, message);
        self.persist().await?;
        Ok(true)
    }

    /// Operator override: store `message` even if it moves the cursor back.
    pub async fn overwrite(
        &mut self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<Option<MessageId>> {
        let previous = self.cursors.insert(channel, message);
        self.persist().await?;
        Ok(previous)
    }

    /// Operator rollback: forget the cursor for `channel`. The channel is
    /// primed again on the next run.
    pub async fn reset(&mut self, channel: ChannelId) -> Result<Option<MessageId>> {
        let previous = self.cursors.remove(&channel);
        if previous.is_some() {
            self.persist().await?;
        }
        Ok(previous)
    }

    /// Hand the legacy cursor to `channel` if that channel has none yet.
    ///
    /// The sentinel entry is dropped in the same write.
    pub async fn claim_legacy(&mut self, channel: ChannelId) -> Result<bool> {
        let Some(legacy) = self.legacy() else {
            return Ok(false);
        };
        if self.get(channel).is_some() {
            return Ok(false);
        }
        self.cursors.remove(&LEGACY_CHANNEL_KEY);
        self.cursors.insert(channel, legacy);
        self.persist().await?;
        info!(%channel, message_id = %legacy, "migrated legacy cursor");
        Ok(true)
    }

    /// Atomic write: temp file, fsync, rename over the target.
    async fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = CursorFileOut {
            channels: self
                .cursors
                .iter()
                .map(|(c, m)| (c.to_string(), m.get()))
                .collect(),
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let tmp = tmp_path(&self.path);
        {
            let mut f = fs::File::create(&tmp).await?;
            f.write_all(&data).await?;
            f.sync_all().await?;
        }
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "cursors".into());
    name.push(".tmp");
    path.with_file_name(name)
}

fn parse(raw: &str) -> serde_json::Result<BTreeMap<ChannelId, MessageId>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.get("channels").is_none()
        && let Ok(legacy) = serde_json::from_value::<LegacyCursorFile>(value.clone())
        && let Some(id) = legacy.last_message_id.get()
    {
        return Ok(BTreeMap::from([(LEGACY_CHANNEL_KEY, id)]));
    }

    let file: CursorFile = serde_json::from_value(value)?;
    let mut out = BTreeMap::new();
    for (key, raw) in file.channels {
        match (key.parse::<ChannelId>(), raw.get()) {
            (Ok(channel), Some(id)) => {
                out.insert(channel, id);
            },
            _ => warn!(key = %key, "ignoring unparseable cursor entry"),
        }
    }
    Ok(out)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> CursorStore {
        CursorStore::load(dir.path().join("state.json"))
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(&tmp);
        assert!(store.get(ChannelId(1)).is_none());
        assert_eq!(store.iter().count(), 0);
    }

    #[tokio::test]
    async fn set_persists_and_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(&tmp);
        assert!(store.set(ChannelId(1), MessageId(10)).await.unwrap());
        assert!(store.set(ChannelId(2), MessageId(20)).await.unwrap());

        let reloaded = store_in(&tmp);
        assert_eq!(reloaded.get(ChannelId(1)), Some(MessageId(10)));
        assert_eq!(reloaded.get(ChannelId(2)), Some(MessageId(20)));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(tmp.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(raw["channels"]["1"], 10);
        assert!(!tmp.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(&tmp);
        let mut highest = 0;
        for id in [5, 9, 3, 9, 7, 12, 1] {
            let moved = store.set(ChannelId(1), MessageId(id)).await.unwrap();
            assert_eq!(moved, id > highest);
            highest = highest.max(id);
            assert_eq!(store.get(ChannelId(1)), Some(MessageId(highest)));
        }
        assert_eq!(store.get(ChannelId(1)), Some(MessageId(12)));
        assert_eq!(store_in(&tmp).get(ChannelId(1)), Some(MessageId(12)));
    }

    #[tokio::test]
    async fn reset_and_overwrite_are_operator_overrides() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(&tmp);
        store.set(ChannelId(1), MessageId(50)).await.unwrap();

        assert_eq!(
            store.overwrite(ChannelId(1), MessageId(40)).await.unwrap(),
            Some(MessageId(50))
        );
        assert_eq!(store.get(ChannelId(1)), Some(MessageId(40)));

        assert_eq!(store.reset(ChannelId(1)).await.unwrap(), Some(MessageId(40)));
        assert!(store_in(&tmp).get(ChannelId(1)).is_none());
        assert_eq!(store.reset(ChannelId(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_file_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("state.json"), b"{\"channels\": {\"1\": ").unwrap();
        let mut store = store_in(&tmp);
        assert!(store.get(ChannelId(1)).is_none());

        store.set(ChannelId(1), MessageId(3)).await.unwrap();
        assert_eq!(store_in(&tmp).get(ChannelId(1)), Some(MessageId(3)));
    }

    #[tokio::test]
    async fn legacy_file_is_imported_and_migrated() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("state.json"),
            b"{\"last_message_id\": 1187654321098765432}",
        )
        .unwrap();

        let mut store = store_in(&tmp);
        assert_eq!(store.legacy(), Some(MessageId(1_187_654_321_098_765_432)));

        assert!(store.claim_legacy(ChannelId(77)).await.unwrap());
        assert_eq!(
            store.get(ChannelId(77)),
            Some(MessageId(1_187_654_321_098_765_432))
        );
        assert!(store.legacy().is_none());

        let raw = std::fs::read_to_string(tmp.path().join("state.json")).unwrap();
        assert!(raw.contains("\"channels\""));
        assert!(!raw.contains("last_message_id"));
    }

    #[tokio::test]
    async fn legacy_not_claimed_over_existing_cursor() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = store_in(&tmp);
        store.overwrite(LEGACY_CHANNEL_KEY, MessageId(5)).await.unwrap();
        store.set(ChannelId(1), MessageId(9)).await.unwrap();

        assert!(!store.claim_legacy(ChannelId(1)).await.unwrap());
        assert_eq!(store.get(ChannelId(1)), Some(MessageId(9)));
        assert_eq!(store.legacy(), Some(MessageId(5)));
    }

    #[test]
    fn string_ids_are_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("state.json"),
            b"{\"channels\": {\"1\": \"42\", \"oops\": 3}}",
        )
        .unwrap();
        let store = store_in(&tmp);
        assert_eq!(store.get(ChannelId(1)), Some(MessageId(42)));
        assert_eq!(store.iter().count(), 1);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = CursorStore::load(tmp.path().join("nested/dir/state.json"));
        store.set(ChannelId(1), MessageId(1)).await.unwrap();
        assert!(tmp.path().join("nested/dir/state.json").exists());
    }
}
