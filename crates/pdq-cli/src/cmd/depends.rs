//! `pdq depends` — what a package requires, optionally transitively.
//!
//! Normal mode queries the installed-package feed through the snapshot
//! cache. Latest mode queries a catalog feed instead, with a per-query
//! cache entry keyed by the package and its traversal options.

use std::path::PathBuf;

use clap::Args;

use pdq_core::{
    CatalogSource, DependencyGraph, EngineError, FeedDir, Fmri, FmriError, LatestCache, LatestKey,
    Operation, QueryOpts, query, validate_options,
};

use super::{
    Context, QueryOutput, TraversalArgs, emit_query, fail, invalid_package, load_graph,
    provenance_str, report_warnings,
};

/// Arguments for `pdq depends`.
#[derive(Args, Debug)]
pub struct DependsArgs {
    /// Package to query (name, optionally with @version).
    #[arg(value_name = "PKG")]
    pub package: String,

    #[command(flatten)]
    pub traversal: TraversalArgs,

    /// Query the latest-package catalog instead of installed state.
    #[arg(long)]
    pub latest: bool,

    /// Feed directory holding the latest catalog (with --latest).
    #[arg(long, value_name = "PATH", requires = "latest")]
    pub catalog: Option<PathBuf>,
}

/// Run the forward dependency query.
///
/// # Errors
///
/// Fails on an unparsable package argument, a rejected option
/// combination, an unavailable source, or a package absent from the
/// catalog; each is rendered through the structured error path first.
pub fn run_depends(args: &DependsArgs, ctx: &Context) -> anyhow::Result<()> {
    let fmri: Fmri = args
        .package
        .parse()
        .map_err(|e: FmriError| invalid_package(ctx.output, &args.package, &e))?;
    let opts = args.traversal.to_opts();
    validate_options(Operation::Depends, args.latest, opts.recurse, Some(&fmri))
        .map_err(|e| fail(ctx.output, &e))?;

    if args.latest {
        return run_latest(args, &fmri, &opts, ctx);
    }

    let (graph, loaded) = load_graph(ctx)?;
    let listing = query::depends(&graph, &fmri, &opts).map_err(|e| fail(ctx.output, &e))?;
    emit_query(
        ctx,
        &QueryOutput::new(
            "depends",
            Some(fmri.to_string()),
            provenance_str(loaded.source),
            Some(&loaded.catalog),
            listing,
        ),
    )
}

/// Latest mode: per-query cache keyed by package and options, validated
/// against the catalog feed's staleness token.
fn run_latest(
    args: &DependsArgs,
    fmri: &Fmri,
    opts: &QueryOpts,
    ctx: &Context,
) -> anyhow::Result<()> {
    let Some(dir) = args.catalog.clone().or_else(|| ctx.catalog_dir.clone()) else {
        return Err(fail(
            ctx.output,
            &EngineError::UnsupportedOption {
                reason: "latest mode needs a catalog feed: pass --catalog or set [source] catalog"
                    .to_string(),
            },
        ));
    };
    let feed = FeedDir::new(dir);
    let token = feed.token().map_err(|e| fail(ctx.output, &e))?;
    let latest = LatestCache::new(&ctx.cache_dir);
    let key = LatestKey::new(fmri, opts);

    if let Some(listing) = latest.lookup(&key, &token, ctx.cache) {
        return emit_query(
            ctx,
            &QueryOutput::new("depends", Some(fmri.to_string()), "cache", None, listing),
        );
    }

    let catalog = feed.load().map_err(|e| fail(ctx.output, &e))?;
    report_warnings(ctx, catalog.warnings());
    let graph = DependencyGraph::from_catalog(&catalog);
    let listing = query::depends(&graph, fmri, opts).map_err(|e| fail(ctx.output, &e))?;
    latest.store(&key, &token, &listing, ctx.cache);
    emit_query(
        ctx,
        &QueryOutput::new(
            "depends",
            Some(fmri.to_string()),
            "rebuilt",
            Some(&catalog),
            listing,
        ),
    )
}
