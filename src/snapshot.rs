use std::path::PathBuf;

use anyhow::Result;

use crate::config::{FigSize, PER_PAGE};
use crate::error::VizError;
use crate::layout;
use crate::log_reader::{self, LogMode};
use crate::render;
use crate::views;

#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub input: PathBuf,
    pub page: isize,
    pub output: PathBuf,
    pub figsize: FigSize,
    pub pattern: Option<String>,
    pub max_iter: Option<u64>,
    pub delimiter: u8,
}

/// Renders one page of EMA priors to a PNG. Nothing is written when the log
/// is empty or no key matches.
pub fn make_snapshot(req: &SnapshotRequest) -> Result<PathBuf> {
    let table = log_reader::read_log(&req.input, LogMode::Ema, req.delimiter)?;
    if table.is_empty() {
        return Err(VizError::EmptyInput.into());
    }
    let table = table.with_mode("ema");

    let keys = views::select_keys(&table, req.pattern.as_deref());
    if keys.is_empty() {
        let reason = match &req.pattern {
            Some(pattern) => format!("No keys found in CSV (mode=ema, pattern={:?}).", pattern),
            None => "No keys found in CSV (mode=ema).".to_string(),
        };
        return Err(VizError::NoMatchingData(reason).into());
    }

    let page = layout::paginate(&keys, PER_PAGE, req.page);
    log::info!(
        "Rendering page {}/{} ({} of {} keys)",
        page.index + 1,
        page.total,
        page.keys.len(),
        keys.len()
    );

    let figure = views::ema_snapshot_figure(&table, &page, req.max_iter, req.figsize);
    let image = render::tight_crop(&render::render_page(&figure)?, 8);
    render::save_png(&image, &req.output)?;
    log::info!("Saved snapshot to: {}", req.output.display());
    Ok(req.output.clone())
}
