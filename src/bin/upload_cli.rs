//! Demo CLI: applies an OsmChange file to a fresh in-memory store and
//! prints the resulting diff-result.
//!
//! Not a production entry point - there is no transport layer here, only
//! enough scaffolding to exercise [`changeset_engine::pipeline::upload`]
//! from the command line.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use time::OffsetDateTime;

use changeset_engine::{pipeline, Config, RequestContext, Store};

/// Applies an OsmChange document to a brand-new changeset and prints the
/// diff-result.
#[derive(Parser)]
struct Args {
    /// Path to an OsmChange XML file.
    file: std::path::PathBuf,

    /// User id to attribute the changeset to.
    #[arg(long, default_value_t = 1)]
    user_id: u64,

    /// Treat the user as a moderator for rate-limit purposes.
    #[arg(long)]
    moderator: bool,
}

fn main() -> ExitCode {
    changeset_engine::logging::init();
    let args = Args::parse();

    let xml = match fs::read(&args.file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.file.display());
            return ExitCode::FAILURE;
        }
    };

    let store = Store::new();
    let config = Config::default();
    let ctx = if args.moderator {
        RequestContext::moderator(args.user_id)
    } else {
        RequestContext::user(args.user_id)
    };
    let now = OffsetDateTime::now_utc();

    let changeset_id = changeset_engine::changeset::ChangesetUpdater::create(
        &store,
        &config,
        ctx,
        Default::default(),
        now,
    );

    match pipeline::upload(&store, &config, ctx, changeset_id, &xml, now, None) {
        Ok(result) => {
            print!("{}", changeset_engine::diff::to_xml(&result.diff));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("upload rejected: {e}");
            ExitCode::FAILURE
        }
    }
}
