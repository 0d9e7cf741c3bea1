//! Assembler: concatenates a finished download's part-files, in offset
//! order, into the final artifact.
//!
//! New module — the teacher streams directly into one preallocated file
//! and never needs a separate assembly step. This crate instead gives
//! every segment its own part-file (so independent workers never contend
//! on writes into a shared fd at different offsets under the same lock),
//! so something has to stitch them back together once every segment
//! finishes. Reuses [`crate::storage::StorageWriter`]'s preallocate +
//! `write_at` + atomic-rename idiom for the final write, rather than a
//! plain `std::fs::copy` chain, so the in-progress final file is never
//! visible at a path a caller might read early.

use std::path::Path;

use anyhow::{Context, Result};

use crate::error::QdmError;
use crate::model::Download;
use crate::storage::{temp_path, StorageWriterBuilder};

/// Concatenates `download`'s part-files (read from its scratch dir, in
/// segment order) into `download.final_path()`. On success, deletes the
/// scratch directory. On failure, the scratch directory and its part-files
/// are left untouched so a retry doesn't have to re-download anything.
///
/// Precondition: every segment in `download.segments` is `Finished`
/// (callers should check [`Download::all_segments_finished`] first).
pub async fn assemble(download: &Download) -> Result<(), QdmError> {
    let final_path = download.final_path();
    let scratch_dir = download.scratch_dir();

    let total_size = download
        .total_size
        .unwrap_or_else(|| download.segments.iter().map(|s| s.downloaded).sum());

    let assembled = assemble_blocking(download, &scratch_dir, &final_path, total_size)
        .await
        .map_err(|e| QdmError::AssembleError { reason: e.to_string() })?;

    if assembled {
        if let Err(e) = tokio::fs::remove_dir_all(&scratch_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    download_id = %download.id,
                    error = %e,
                    "assembled successfully but failed to clean up scratch dir"
                );
            }
        }
    }

    Ok(())
}

async fn assemble_blocking(
    download: &Download,
    scratch_dir: &Path,
    final_path: &Path,
    total_size: u64,
) -> Result<bool> {
    let download = download.clone();
    let scratch_dir = scratch_dir.to_path_buf();
    let final_path = final_path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<bool> {
        let tmp = temp_path(&final_path);
        let mut builder = StorageWriterBuilder::create(&tmp)
            .with_context(|| format!("create assembly temp file: {}", tmp.display()))?;
        builder
            .preallocate(total_size)
            .context("preallocate final artifact")?;
        let writer = builder.build();

        for segment in &download.segments {
            let part_path = scratch_dir.join(segment.part_file_name());
            let bytes = std::fs::read(&part_path)
                .with_context(|| format!("read part-file: {}", part_path.display()))?;
            writer
                .write_at(segment.offset, &bytes)
                .with_context(|| format!("write segment {} into final artifact", segment.id))?;
        }

        writer.sync().context("sync final artifact")?;
        writer
            .finalize(&final_path)
            .with_context(|| format!("finalize final artifact: {}", final_path.display()))?;
        Ok(true)
    })
    .await
    .context("assembly task join")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Segment, SegmentState};
    use std::collections::HashMap;

    fn download_with_segments(save_dir: &Path, segments: Vec<Segment>, total_size: u64) -> Download {
        Download {
            id: "d1".into(),
            source_url: "https://example.com/file.bin".into(),
            request_headers: HashMap::new(),
            file_name: "file.bin".into(),
            save_dir: save_dir.to_path_buf(),
            total_size: Some(total_size),
            resumable: true,
            status: crate::model::DownloadStatus::Assembling,
            segments,
            max_segments: 2,
            downloaded: total_size,
            progress_pct: 100.0,
            speed_bps: 0.0,
            eta_s: None,
            date_added: "2026-01-01T00:00:00Z".into(),
            date_completed: None,
            last_error: None,
            category: None,
            etag: None,
            last_modified: None,
            queue_id: None,
        }
    }

    #[tokio::test]
    async fn assembles_parts_in_offset_order() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![
            Segment { id: 0, offset: 0, length: Some(5), downloaded: 5, state: SegmentState::Finished },
            Segment { id: 1, offset: 5, length: Some(5), downloaded: 5, state: SegmentState::Finished },
        ];
        let download = download_with_segments(dir.path(), segments, 10);
        let scratch = download.scratch_dir();
        std::fs::create_dir_all(&scratch).unwrap();
        std::fs::write(scratch.join("0.part"), b"hello").unwrap();
        std::fs::write(scratch.join("1.part"), b"world").unwrap();

        assemble(&download).await.unwrap();

        let final_bytes = std::fs::read(download.final_path()).unwrap();
        assert_eq!(final_bytes, b"helloworld");
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn leaves_scratch_dir_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![Segment {
            id: 0,
            offset: 0,
            length: Some(5),
            downloaded: 5,
            state: SegmentState::Finished,
        }];
        let download = download_with_segments(dir.path(), segments, 5);
        // Scratch dir intentionally not created: part-file read will fail.
        let result = assemble(&download).await;
        assert!(result.is_err());
        assert!(!download.scratch_dir().exists());
    }
}
