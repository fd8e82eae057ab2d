//! Statistics overview and maintenance cleanup.
//!
//! Provides a quick summary of what's stored and indexed: per-status
//! document counts, chunk counts, and vector collection totals. The
//! cleanup command removes chunk rows whose document is gone and vector
//! points whose document row no longer exists.

use std::collections::HashSet;

use anyhow::Result;
use tracing::info;

use crate::store::DocumentRepository;
use crate::vector::VectorIndex;

/// Run the stats command: query the store and index, print a summary.
pub async fn run_stats(
    repo: &dyn DocumentRepository,
    index: &dyn VectorIndex,
    db_path: &std::path::Path,
) -> Result<()> {
    let counts = repo.status_counts().await?;
    let total_chunks = repo.count_chunks().await?;
    let index_stats = index.stats().await;

    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("docquery — Stats");
    println!("================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", counts.total);
    println!("    uploaded:    {}", counts.uploaded);
    println!("    processing:  {}", counts.processing);
    println!("    completed:   {}", counts.completed);
    println!("    failed:      {}", counts.failed);
    println!();
    println!("  Chunks:      {}", total_chunks);
    println!();
    println!("  Vector index:");
    println!("    points:      {}", index_stats.total_points);
    println!("    dimensions:  {}", index_stats.vector_size);
    println!(
        "    distance:    {}",
        if index_stats.distance.is_empty() {
            "unknown"
        } else {
            index_stats.distance.as_str()
        }
    );
    println!();

    Ok(())
}

/// Run the cleanup command: delete orphaned chunk rows, then vector points
/// whose owning document row is gone.
pub async fn run_cleanup(repo: &dyn DocumentRepository, index: &dyn VectorIndex) -> Result<()> {
    let orphan_chunks = repo.count_orphan_chunks().await?;
    if orphan_chunks > 0 {
        let removed = repo.delete_orphan_chunks().await?;
        info!(removed, "deleted orphaned chunk rows");
        println!("Removed {} orphaned chunk row(s)", removed);
    } else {
        println!("No orphaned chunk rows");
    }

    let known: HashSet<i64> = repo.all_document_ids().await?.into_iter().collect();
    let indexed = index.document_ids().await?;

    let mut orphan_docs = 0;
    for doc_id in indexed {
        if !known.contains(&doc_id) {
            index.delete_by_document(doc_id).await?;
            info!(document_id = doc_id, "deleted orphaned vector points");
            orphan_docs += 1;
        }
    }
    if orphan_docs > 0 {
        println!("Removed vector points for {} missing document(s)", orphan_docs);
    } else {
        println!("No orphaned vector points");
    }

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
