//! `ferry state`: operator access to the cursor file.
//!
//! Stop the relay before editing; a running relay keeps its own copy of the
//! cursors and overwrites the file on its next write.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, Result},
    clap::Subcommand,
    ferry_channels::{ChannelId, MessageId},
    ferry_relay::{CursorStore, LEGACY_CHANNEL_KEY},
};

#[derive(Subcommand)]
pub enum StateAction {
    /// Print every stored cursor.
    Show {
        /// State file (overrides `relay.state_path`).
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Forget a channel's cursor so it is primed again on the next run.
    Reset {
        #[arg(long)]
        channel: u64,
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Point a channel's cursor at a specific message id. Moving it back
    /// replays everything after that id.
    Set {
        #[arg(long)]
        channel: u64,
        #[arg(long)]
        message: u64,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

pub async fn handle_state(config: Option<&Path>, action: StateAction) -> Result<()> {
    match action {
        StateAction::Show { file } => {
            let store = CursorStore::load(state_path(config, file)?);
            for line in describe(&store) {
                println!("{line}");
            }
        },
        StateAction::Reset { channel, file } => {
            let mut store = CursorStore::load(state_path(config, file)?);
            match store.reset(ChannelId(channel)).await? {
                Some(previous) => println!("Reset channel {channel} (was {previous})."),
                None => println!("Channel {channel} had no cursor."),
            }
        },
        StateAction::Set {
            channel,
            message,
            file,
        } => {
            let mut store = CursorStore::load(state_path(config, file)?);
            let previous = store
                .overwrite(ChannelId(channel), MessageId(message))
                .await?;
            match previous {
                Some(previous) => println!("Channel {channel}: {previous} → {message}."),
                None => println!("Channel {channel}: set to {message}."),
            }
        },
    }
    Ok(())
}

/// `--file`, else `relay.state_path` from the config, else the default.
fn state_path(config: Option<&Path>, file: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(file) = file {
        return Ok(file);
    }
    let loaded = match config
        .map(Path::to_path_buf)
        .or_else(ferry_config::find_config_file)
    {
        Some(path) => ferry_config::load_config(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => ferry_config::FerryConfig::default(),
    };
    Ok(loaded.relay.state_path)
}

fn describe(store: &CursorStore) -> Vec<String> {
    let mut lines = vec![format!("State file: {}", store.path().display())];
    let mut any = false;
    for (channel, message) in store.iter() {
        any = true;
        if channel == LEGACY_CHANNEL_KEY {
            lines.push(format!("  (legacy)  {message}  unclaimed single-channel cursor"));
        } else {
            lines.push(format!("  {channel}  {message}"));
        }
    }
    if !any {
        lines.push("  no cursors stored".into());
    }
    lines
}
