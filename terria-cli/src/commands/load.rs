//! Load command - resolve init sources and print the result.

use std::sync::atomic::Ordering;

use terria::terria::{resolve_url, InitSource};
use tracing::info;

use super::output::print_summary;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the load command.
pub struct LoadArgs {
    pub sources: Vec<String>,
    pub timeout: Option<u64>,
}

/// Run the load command.
pub async fn run(args: LoadArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("load");
    let (terria, raised) = runner.create_terria(args.timeout)?;

    let sources = args
        .sources
        .iter()
        .map(|source| -> Result<InitSource, CliError> {
            let url = resolve_url(source)
                .ok_or_else(|| CliError::Config(format!("Cannot resolve init source '{}'", source)))?;
            Ok(InitSource::url(source.clone(), url.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(count = sources.len(), "Loading init sources");
    terria.add_init_sources(sources);
    terria.load_init_sources().await?;
    terria.attach_viewer();

    print_summary(&terria);

    match raised.load(Ordering::SeqCst) {
        0 => Ok(()),
        count => Err(CliError::Load(count)),
    }
}
