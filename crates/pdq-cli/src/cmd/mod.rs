//! Command handlers and the plumbing shared between them.
//!
//! Every handler receives a [`Context`] assembled in `main` from global
//! flags and the config file, converts its clap args into core
//! [`QueryOpts`], and emits one [`QueryOutput`] through the output layer.
//! Fatal engine errors are rendered via the structured error path before
//! the process exits non-zero.

pub mod cache;
pub mod completions;
pub mod dependants;
pub mod depends;
pub mod no_dependants;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tracing::debug;

use pdq_core::{
    CacheManager, CacheOptions, Catalog, DependencyGraph, DependencyType, EngineError, FeedDir,
    FmriError, Listing, ListingMode, LoadResult, LoadSource, LoadWarning, QueryOpts, ResultFlag,
    TypeFilter,
};

use crate::output::{CliError, OutputMode, pretty_rule, pretty_section, render_error, render_mode};

// ---------------------------------------------------------------------------
// Shared invocation context
// ---------------------------------------------------------------------------

/// Everything a handler needs beyond its own args: resolved sources, cache
/// switches, and output settings.
pub struct Context {
    /// Installed-package feed.
    pub feed: FeedDir,
    /// Latest-catalog feed from the config file, used when `--catalog` is
    /// not given.
    pub catalog_dir: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache: CacheOptions,
    pub output: OutputMode,
    pub quiet: bool,
}

/// Render an engine error through the structured path, then produce the
/// error that makes `main` exit non-zero.
pub fn fail(mode: OutputMode, err: &EngineError) -> anyhow::Error {
    let cli = CliError::from(err);
    if let Err(render_err) = render_error(mode, &cli) {
        return render_err;
    }
    anyhow::anyhow!("{}", cli.message)
}

/// Like [`fail`], for a package argument that does not parse as an FMRI.
pub fn invalid_package(mode: OutputMode, text: &str, err: &FmriError) -> anyhow::Error {
    let cli = CliError::new(format!("invalid package FMRI '{text}': {err}"));
    if let Err(render_err) = render_error(mode, &cli) {
        return render_err;
    }
    anyhow::anyhow!("{}", cli.message)
}

/// Load the catalog through the cache manager and build the graph.
pub fn load_graph(ctx: &Context) -> anyhow::Result<(DependencyGraph, LoadResult)> {
    let manager = CacheManager::new(&ctx.cache_dir);
    let loaded = manager
        .load(&ctx.feed, ctx.cache)
        .map_err(|e| fail(ctx.output, &e))?;
    report_warnings(ctx, loaded.catalog.warnings());
    let graph = DependencyGraph::from_catalog(&loaded.catalog);
    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        hash = graph.content_hash(),
        "dependency graph built"
    );
    Ok((graph, loaded))
}

/// Load warnings go to stderr so pipelines reading stdout stay clean.
pub fn report_warnings(ctx: &Context, warnings: &[LoadWarning]) {
    if ctx.quiet {
        return;
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

pub const fn provenance_str(source: LoadSource) -> &'static str {
    match source {
        LoadSource::Cache => "cache",
        LoadSource::Rebuilt => "rebuilt",
        LoadSource::RebuiltWriteFailed => "rebuilt-write-failed",
    }
}

// ---------------------------------------------------------------------------
// Shared traversal flags
// ---------------------------------------------------------------------------

/// Traversal flags common to `depends` and `dependants`.
#[derive(Args, Debug)]
pub struct TraversalArgs {
    /// Expand require / require-any dependencies transitively.
    #[arg(short, long)]
    pub recurse: bool,

    /// Deepest level to print when recursing (minimum 1).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_depth: Option<u64>,

    /// Print a package once per path instead of once per run.
    #[arg(long)]
    pub allow_repeats: bool,

    /// Resolve the package by exact version instead of at-or-before.
    #[arg(long)]
    pub exact: bool,

    /// Follow only edges of these dependency types (repeatable).
    #[arg(long = "type", value_name = "TYPE")]
    pub include_types: Vec<DependencyType>,

    /// Skip edges of these dependency types (repeatable; ignored when
    /// --type is given).
    #[arg(long = "exclude-type", value_name = "TYPE")]
    pub exclude_types: Vec<DependencyType>,

    /// Print a flat, deduplicated name list instead of a tree.
    #[arg(long)]
    pub names: bool,

    /// With --names, append each package's dependency types.
    #[arg(long = "types", requires = "names")]
    pub with_types: bool,
}

impl TraversalArgs {
    pub fn to_opts(&self) -> QueryOpts {
        QueryOpts {
            recurse: self.recurse,
            max_depth: self
                .max_depth
                .map(|d| usize::try_from(d).unwrap_or(usize::MAX)),
            allow_repeats: self.allow_repeats,
            exact: self.exact,
            filter: TypeFilter::new(self.include_types.clone(), self.exclude_types.clone()),
            listing: if self.with_types {
                ListingMode::NamesWithTypes
            } else if self.names {
                ListingMode::Names
            } else {
                ListingMode::Tree
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Query output
// ---------------------------------------------------------------------------

/// The full payload of one query: what ran, where the catalog came from,
/// retained load warnings, and the listing itself. JSON mode serializes
/// this whole; text and pretty modes render the listing (warnings having
/// already gone to stderr).
#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub provenance: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<LoadWarning>,
    pub listing: Listing,
}

impl QueryOutput {
    pub fn new(
        operation: &'static str,
        package: Option<String>,
        provenance: &'static str,
        catalog: Option<&Catalog>,
        listing: Listing,
    ) -> Self {
        Self {
            operation,
            package,
            provenance,
            warnings: catalog.map_or_else(Vec::new, |c| c.warnings().to_vec()),
            listing,
        }
    }
}

/// Render a query result in the resolved output mode.
pub fn emit_query(ctx: &Context, output: &QueryOutput) -> anyhow::Result<()> {
    render_mode(
        ctx.output,
        output,
        |o, w| write_listing(&o.listing, w),
        |o, w| {
            let heading = o.package.as_ref().map_or_else(
                || o.operation.to_string(),
                |pkg| format!("{} {pkg}", o.operation),
            );
            pretty_section(w, &heading)?;
            write_listing(&o.listing, w)?;
            pretty_rule(w)?;
            writeln!(
                w,
                "{} result(s), catalog from {}",
                o.listing.len(),
                o.provenance
            )
        },
    )
}

/// Two spaces of indent per depth; edge type in angle brackets; expansion
/// flags spelled out in parentheses.
fn write_listing(listing: &Listing, w: &mut dyn Write) -> io::Result<()> {
    match listing {
        Listing::Tree(records) => {
            for record in records {
                write!(w, "{:indent$}{}", "", record.fmri, indent = record.depth * 2)?;
                if let Some(dep_type) = record.dep_type {
                    write!(w, " <{dep_type}>")?;
                }
                match record.flag {
                    ResultFlag::None => {}
                    ResultFlag::AlreadyExpanded => write!(w, " (already expanded)")?,
                    ResultFlag::DepthTruncated => write!(w, " (depth truncated)")?,
                }
                writeln!(w)?;
            }
        }
        Listing::Names(entries) => {
            for entry in entries {
                write!(w, "{}", entry.fmri)?;
                if !entry.types.is_empty() {
                    let joined = entry
                        .types
                        .iter()
                        .map(|t| t.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(w, "  [{joined}]")?;
                }
                writeln!(w)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdq_core::{Fmri, NamesEntry, ResultRecord};

    fn fmri(text: &str) -> Fmri {
        text.parse().expect("test FMRI should parse")
    }

    fn record(text: &str, dep_type: Option<DependencyType>, depth: usize, flag: ResultFlag) -> ResultRecord {
        ResultRecord {
            fmri: fmri(text),
            dep_type,
            depth,
            flag,
        }
    }

    // === traversal flag conversion ========================================

    #[test]
    fn default_flags_produce_tree_listing() {
        let args = TraversalArgs {
            recurse: false,
            max_depth: None,
            allow_repeats: false,
            exact: false,
            include_types: vec![],
            exclude_types: vec![],
            names: false,
            with_types: false,
        };
        let opts = args.to_opts();
        assert_eq!(opts.listing, ListingMode::Tree);
        assert!(opts.filter.is_unrestricted());
        assert_eq!(opts.max_depth, None);
    }

    #[test]
    fn names_and_types_select_listing_modes() {
        let mut args = TraversalArgs {
            recurse: true,
            max_depth: Some(3),
            allow_repeats: false,
            exact: false,
            include_types: vec![DependencyType::Require],
            exclude_types: vec![],
            names: true,
            with_types: false,
        };
        assert_eq!(args.to_opts().listing, ListingMode::Names);
        args.with_types = true;
        let opts = args.to_opts();
        assert_eq!(opts.listing, ListingMode::NamesWithTypes);
        assert_eq!(opts.max_depth, Some(3));
        assert!(opts.filter.passes(DependencyType::Require));
        assert!(!opts.filter.passes(DependencyType::Optional));
    }

    // === listing rendering ================================================

    #[test]
    fn tree_listing_indents_and_annotates() {
        let listing = Listing::Tree(vec![
            record("a/app@1.0", None, 0, ResultFlag::None),
            record(
                "b/lib@1.0",
                Some(DependencyType::Require),
                1,
                ResultFlag::None,
            ),
            record(
                "c/base@1.0",
                Some(DependencyType::Require),
                2,
                ResultFlag::AlreadyExpanded,
            ),
            record(
                "d/deep@1.0",
                Some(DependencyType::RequireAny),
                2,
                ResultFlag::DepthTruncated,
            ),
        ]);
        let mut buf = Vec::new();
        write_listing(&listing, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            text,
            "a/app@1.0\n  b/lib@1.0 <require>\n    c/base@1.0 <require> (already expanded)\n    d/deep@1.0 <require-any> (depth truncated)\n"
        );
    }

    #[test]
    fn names_listing_joins_types() {
        let listing = Listing::Names(vec![
            NamesEntry {
                fmri: fmri("a/app@1.0"),
                types: vec![],
            },
            NamesEntry {
                fmri: fmri("b/lib@1.0"),
                types: vec![DependencyType::Require, DependencyType::Optional],
            },
        ]);
        let mut buf = Vec::new();
        write_listing(&listing, &mut buf).expect("render");
        let text = String::from_utf8(buf).expect("utf8");
        assert_eq!(text, "a/app@1.0\nb/lib@1.0  [require, optional]\n");
    }

    // === provenance =======================================================

    #[test]
    fn provenance_strings_are_stable() {
        assert_eq!(provenance_str(LoadSource::Cache), "cache");
        assert_eq!(provenance_str(LoadSource::Rebuilt), "rebuilt");
        assert_eq!(
            provenance_str(LoadSource::RebuiltWriteFailed),
            "rebuilt-write-failed"
        );
    }
}
