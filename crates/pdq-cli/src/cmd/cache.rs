//! `pdq cache` — inspect and reset the on-disk catalog snapshot and the
//! latest-mode query entries.

use clap::{Args, Subcommand};
use serde::Serialize;

use pdq_core::{CacheManager, CacheStatus, LatestCache};

use crate::output::{pretty_kv, pretty_section, render_mode};

use super::{Context, fail};

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    #[command(
        about = "Report snapshot freshness against the feed",
        after_help = "EXAMPLES:\n    # Is the snapshot still valid?\n    pdq cache status\n\n    # Machine-readable\n    pdq cache status --json"
    )]
    Status,

    #[command(
        about = "Remove the snapshot and all latest-mode entries",
        after_help = "EXAMPLES:\n    pdq cache clear"
    )]
    Clear,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<usize>,
    snapshot: String,
    latest_entries: usize,
}

#[derive(Debug, Serialize)]
struct ClearOutput {
    ok: bool,
    latest_entries_removed: usize,
}

pub fn run_cache(args: &CacheArgs, ctx: &Context) -> anyhow::Result<()> {
    match args.command {
        CacheCommand::Status => run_status(ctx),
        CacheCommand::Clear => run_clear(ctx),
    }
}

fn run_status(ctx: &Context) -> anyhow::Result<()> {
    let manager = CacheManager::new(&ctx.cache_dir);
    let status = manager.status(&ctx.feed).map_err(|e| fail(ctx.output, &e))?;
    let latest_entries = LatestCache::new(&ctx.cache_dir).entry_count();

    let (state, written_at, records) = match status {
        CacheStatus::Missing => ("missing", None, None),
        CacheStatus::Corrupt => ("corrupt", None, None),
        CacheStatus::Fresh {
            written_at,
            records,
        } => ("fresh", Some(written_at.to_rfc3339()), Some(records)),
        CacheStatus::Stale {
            written_at,
            records,
        } => ("stale", Some(written_at.to_rfc3339()), Some(records)),
    };
    let output = StatusOutput {
        state,
        written_at,
        records,
        snapshot: manager.snapshot_path().display().to_string(),
        latest_entries,
    };

    render_mode(
        ctx.output,
        &output,
        |o, w| {
            writeln!(
                w,
                "{}  {}  {} record(s)  {} latest entr{}",
                o.state,
                o.snapshot,
                o.records.unwrap_or(0),
                o.latest_entries,
                if o.latest_entries == 1 { "y" } else { "ies" }
            )
        },
        |o, w| {
            pretty_section(w, "cache status")?;
            pretty_kv(w, "state", o.state)?;
            pretty_kv(w, "snapshot", &o.snapshot)?;
            if let Some(ref written_at) = o.written_at {
                pretty_kv(w, "written", written_at)?;
            }
            if let Some(records) = o.records {
                pretty_kv(w, "records", records.to_string())?;
            }
            pretty_kv(w, "latest", format!("{} entr{}", o.latest_entries, if o.latest_entries == 1 { "y" } else { "ies" }))
        },
    )
}

fn run_clear(ctx: &Context) -> anyhow::Result<()> {
    let manager = CacheManager::new(&ctx.cache_dir);
    manager.discard();
    let removed = LatestCache::new(&ctx.cache_dir).clear();

    let output = ClearOutput {
        ok: true,
        latest_entries_removed: removed,
    };
    render_mode(
        ctx.output,
        &output,
        |o, w| writeln!(w, "cleared  {} latest entr{} removed", o.latest_entries_removed, if o.latest_entries_removed == 1 { "y" } else { "ies" }),
        |o, w| {
            writeln!(
                w,
                "cache cleared ({} latest entr{} removed)",
                o.latest_entries_removed,
                if o.latest_entries_removed == 1 { "y" } else { "ies" }
            )
        },
    )
}
