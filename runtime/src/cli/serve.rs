// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! `lexicon-harvest serve`: answer JSON-lines pattern requests on stdin.
//!
//! The page file is re-read for every request so an external capture can
//! keep replacing it while the server runs.

use crate::config::{resolve_store_path, HarvestConfig};
use crate::patterns::{MemoryPatternStore, PatternService, PatternStore, SqlitePatternStore};
use crate::protocol::{self, Context};
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Longest accepted request line (10 MB).
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

pub async fn run(
    config: &HarvestConfig,
    page: &Path,
    store_path: Option<PathBuf>,
    memory: bool,
) -> Result<()> {
    let store: Box<dyn PatternStore> = if memory {
        Box::new(MemoryPatternStore::new())
    } else {
        let path = resolve_store_path(store_path.as_deref());
        info!(path = %path.display(), "using pattern store");
        Box::new(
            SqlitePatternStore::open(&path)
                .with_context(|| format!("cannot open pattern store {}", path.display()))?,
        )
    };
    let service = PatternService::new(store, &config.organ_id, config.harvest_roots.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    let served = serve_lines(stdin, stdout, &service, page, &config.harvest_roots).await?;
    info!(requests = served, "stdin closed");
    Ok(())
}

/// Answer every request line from `reader` on `writer`. Returns the number
/// of requests answered.
pub async fn serve_lines<R, W>(
    mut reader: R,
    mut writer: W,
    service: &PatternService,
    page: &Path,
    harvest_roots: &[String],
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut served = 0;
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            break;
        }
        let request = line.trim();
        if request.is_empty() {
            continue;
        }

        let response = if request.len() > MAX_REQUEST_SIZE {
            protocol::format_error("unknown", "E_INVALID_PARAMS", "request too large")
        } else {
            match tokio::fs::read_to_string(page).await {
                Ok(markup) => {
                    let ctx = Context {
                        service,
                        markup: &markup,
                        harvest_roots,
                    };
                    protocol::handle_line(request, &ctx)
                }
                Err(e) => {
                    warn!(page = %page.display(), "cannot read page: {e}");
                    protocol::format_error(
                        "unknown",
                        "E_PARSE",
                        &format!("cannot read page {}: {e}", page.display()),
                    )
                }
            }
        };

        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
        served += 1;
    }

    Ok(served)
}
