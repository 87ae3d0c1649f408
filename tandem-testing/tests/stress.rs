//! Stress test: N editors apply seeded random edits to one room, with the
//! hub alternately holding and releasing relayed frames, then assert every
//! document converges and stays well formed. The edits cover splits,
//! merges, moves and property changes as well as text, so blocks nest.

use std::time::Duration;

use tandem_core::{OperationBatch, RoomId};
use tandem_editor::LoopbackHub;
use tandem_testing::{
    RandomEditor, TestPeer, converged, converged_documents, init_tracing, well_formed,
};

const NUM_EDITORS: usize = 4;
const HELD_EVERY: usize = 3;

fn rounds() -> usize {
    std::env::var("STRESS_ROUNDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_edits_converge() {
    init_tracing();
    let hub = LoopbackHub::new();
    let room = RoomId::from("stress");

    let mut editors = vec![TestPeer::join(&hub, &room, "editor-0", "Seed text\nSecond line").await];
    hub.wait_for_updates(&room, 1).await;
    for index in 1..NUM_EDITORS {
        editors.push(TestPeer::join(&hub, &room, &format!("editor-{index}"), "").await);
    }

    let mut generators: Vec<RandomEditor> = (0..NUM_EDITORS)
        .map(|index| RandomEditor::new(0x5eed + index as u64))
        .collect();
    let mut applied = 0usize;
    let mut rejected = 0usize;

    for round in 0..rounds() {
        let held = round % HELD_EVERY == 0;
        if held {
            hub.hold(&room);
        }
        for (editor, generator) in editors.iter().zip(generators.iter_mut()) {
            let document = editor.document().await.tree;
            let operation = generator.next_operation(&document);
            // a remote update can land between reading the document and applying
            match editor
                .handle
                .apply(&room, OperationBatch::new(vec![operation]))
                .await
            {
                Ok(_) => applied += 1,
                Err(err) => {
                    tracing::debug!(?err, editor = %editor.name, "edit rejected");
                    rejected += 1;
                }
            }
        }
        if held {
            tokio::time::sleep(Duration::from_millis(5)).await;
            hub.release(&room).await;
        }
    }
    hub.release(&room).await;

    tracing::info!(applied, rejected, "edits done");
    assert!(applied > rejected);

    let text = converged(&editors).await;
    tracing::info!(%text, "converged");

    let tree = converged_documents(&editors).await;
    assert!(well_formed(&tree), "converged on a malformed tree: {tree:?}");
    for editor in &editors {
        let tree = editor.document().await.tree;
        assert!(well_formed(&tree), "{} holds a malformed tree", editor.name);
    }
}
