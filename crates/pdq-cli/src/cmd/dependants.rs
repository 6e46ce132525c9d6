//! `pdq dependants` — what requires a package: the reverse of `depends`
//! over the same traversal flags.

use clap::Args;

use pdq_core::{Fmri, FmriError, query};

use super::{
    Context, QueryOutput, TraversalArgs, emit_query, fail, invalid_package, load_graph,
    provenance_str,
};

/// Arguments for `pdq dependants`.
#[derive(Args, Debug)]
pub struct DependantsArgs {
    /// Package to query (name, optionally with @version).
    #[arg(value_name = "PKG")]
    pub package: String,

    #[command(flatten)]
    pub traversal: TraversalArgs,
}

/// Run the reverse dependency query.
///
/// # Errors
///
/// Fails on an unparsable package argument, an unavailable source, or a
/// package absent from the catalog.
pub fn run_dependants(args: &DependantsArgs, ctx: &Context) -> anyhow::Result<()> {
    let fmri: Fmri = args
        .package
        .parse()
        .map_err(|e: FmriError| invalid_package(ctx.output, &args.package, &e))?;
    let opts = args.traversal.to_opts();

    let (graph, loaded) = load_graph(ctx)?;
    let listing = query::dependants(&graph, &fmri, &opts).map_err(|e| fail(ctx.output, &e))?;
    emit_query(
        ctx,
        &QueryOutput::new(
            "dependants",
            Some(fmri.to_string()),
            provenance_str(loaded.source),
            Some(&loaded.catalog),
            listing,
        ),
    )
}
