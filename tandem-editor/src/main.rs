//! Runs a handful of editors against an in-process relay and prints the
//! document they converge on.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use error_stack::{Report, ResultExt};
use tandem_core::{Operation, OperationBatch, RoomId, SyncConfig, User};
use tandem_editor::{
    ConnectionState, EditorError, EditorHandle, LoopbackHub, MonospaceSurface, TracingEmitter,
    spawn_editor,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tandem-demo")]
#[command(about = "Simulate collaborators editing one room")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 3)]
    peers: usize,

    #[arg(short, long, default_value = "demo")]
    room: String,

    /// Initial content every peer brings; only the first one is seeded.
    #[arg(short, long, default_value = "Hello")]
    initial: String,
}

const COLORS: [&str; 4] = ["#e6194b", "#3cb44b", "#4363d8", "#f58231"];

#[tokio::main]
async fn main() -> Result<(), Report<EditorError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SyncConfig::load(path).change_context(EditorError)?,
        None => SyncConfig::default(),
    };
    let room = RoomId::new(args.room);
    let hub = LoopbackHub::new();

    let mut editors = Vec::with_capacity(args.peers);
    for index in 0..args.peers {
        let editor = spawn_editor(hub.clone(), config.clone(), TracingEmitter);
        let user = User::new(format!("peer-{index}"), COLORS[index % COLORS.len()]);
        let local = editor
            .open_room(&room, user, args.initial.as_str(), MonospaceSurface::default())
            .await?;
        info!(index, document = %local.tree, "joined");
        editors.push(editor);
    }

    for (index, editor) in editors.iter().enumerate() {
        wait_ready(editor, &room).await?;
        append(editor, &room, &format!(" {index}")).await?;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    for (index, editor) in editors.iter().enumerate() {
        let local = editor.document(&room).await?;
        let peers = editor.peers(&room).await?;
        println!("peer-{index} ({} peers): {}", peers.len(), local.tree);
    }
    for editor in &editors {
        editor.shutdown().await;
    }
    Ok(())
}

async fn wait_ready(editor: &EditorHandle, room: &RoomId) -> Result<(), Report<EditorError>> {
    while editor.status(room).await?.state != ConnectionState::Ready {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// Types `text` at the end of the last block.
async fn append(editor: &EditorHandle, room: &RoomId, text: &str) -> Result<(), Report<EditorError>> {
    let local = editor.document(room).await?;
    let Some((block_index, block)) = local.tree.children.iter().enumerate().last() else {
        return Ok(());
    };
    let Some(leaf_index) = block.children.len().checked_sub(1) else {
        return Ok(());
    };
    let path = vec![block_index, leaf_index];
    let offset = local.tree.leaf(&path).map_or(0, |leaf| leaf.text.len());
    let batch = OperationBatch::new(vec![Operation::InsertText {
        path,
        offset,
        text: text.to_owned(),
    }]);
    editor.apply(room, batch).await?;
    Ok(())
}
