//! Source listing for `cidx sources`.
//!
//! Shows the root and glob filters, then every file a reindex pass would
//! consider. Paths the walk could not read are listed separately; their
//! previously indexed files are left alone by `reindex`.

use anyhow::Result;

use code_index_core::source::SourceTree;

use crate::config::Config;
use crate::connector_fs::FsSourceTree;

/// Print every file the configured source tree would index.
pub fn list_sources(config: &Config) -> Result<()> {
    let tree = FsSourceTree::new(&config.source)?;
    let listing = tree.list_files()?;

    println!("root: {}", tree.root().display());
    println!("include: {}", config.source.include_globs.join(", "));
    println!("exclude: {}", config.source.exclude_globs.join(", "));
    println!();
    for file in &listing.files {
        println!("{}", file);
    }
    println!();
    println!("{} files", listing.files.len());

    if !listing.unreadable.is_empty() {
        println!();
        println!("unreadable:");
        for failure in &listing.unreadable {
            println!("  {} ({})", failure.filename, failure.reason);
        }
    }

    Ok(())
}
