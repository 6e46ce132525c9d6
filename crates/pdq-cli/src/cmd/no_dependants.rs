//! `pdq no-dependants` — packages nothing requires, with the ring-fence
//! closure under `--recurse`: the extras that would become dependency-free
//! once the leaf set itself is removed.

use clap::Args;

use pdq_core::{DependencyType, ListingMode, QueryOpts, TypeFilter, query};

use super::{Context, QueryOutput, emit_query, fail, load_graph, provenance_str};

/// Arguments for `pdq no-dependants`.
#[derive(Args, Debug)]
pub struct NoDependantsArgs {
    /// Restrict the report to these package names; empty means all.
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// Also report the ring-fence closure: packages freed up if the leaf
    /// set were removed.
    #[arg(short, long)]
    pub recurse: bool,

    /// Count only edges of these dependency types (repeatable; default
    /// require and require-any).
    #[arg(long = "type", value_name = "TYPE")]
    pub include_types: Vec<DependencyType>,

    /// Ignore edges of these dependency types (repeatable).
    #[arg(long = "exclude-type", value_name = "TYPE")]
    pub exclude_types: Vec<DependencyType>,

    /// Print a flat, deduplicated name list instead of the sectioned tree.
    #[arg(long = "names")]
    pub names_only: bool,
}

impl NoDependantsArgs {
    fn to_opts(&self) -> QueryOpts {
        QueryOpts {
            recurse: self.recurse,
            filter: TypeFilter::new(self.include_types.clone(), self.exclude_types.clone()),
            listing: if self.names_only {
                ListingMode::Names
            } else {
                ListingMode::Tree
            },
            ..QueryOpts::default()
        }
    }
}

/// Run the leaf report.
///
/// # Errors
///
/// Fails when the package source is unavailable.
pub fn run_no_dependants(args: &NoDependantsArgs, ctx: &Context) -> anyhow::Result<()> {
    let opts = args.to_opts();
    let (graph, loaded) = load_graph(ctx)?;
    let listing =
        query::no_dependants(&graph, &args.names, &opts).map_err(|e| fail(ctx.output, &e))?;
    emit_query(
        ctx,
        &QueryOutput::new(
            "no-dependants",
            None,
            provenance_str(loaded.source),
            Some(&loaded.catalog),
            listing,
        ),
    )
}
