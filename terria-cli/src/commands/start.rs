//! Start command - run the full application start-up sequence.

use std::sync::atomic::Ordering;

use terria::terria::{resolve_url, InitSource, StartOptions};

use super::output::print_summary;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the start command.
pub struct StartArgs {
    pub config_url: Option<String>,
    pub app_url: Option<String>,
    pub timeout: Option<u64>,
}

/// Run the start command.
pub async fn run(args: StartArgs) -> Result<(), CliError> {
    let runner = CliRunner::new()?;
    runner.log_startup("start");
    let config = runner.config();

    // CLI > config file
    let config_url = args
        .config_url
        .or_else(|| config.terria.config_url.clone())
        .ok_or_else(|| {
            CliError::Config(
                "No application config given. \
                 Use --config-url or set terria.config_url with 'terria config set'."
                    .to_string(),
            )
        })?;

    let (terria, raised) = runner.create_terria(args.timeout)?;

    let extra: Vec<InitSource> = config
        .terria
        .init_urls
        .iter()
        .filter_map(|url| {
            resolve_url(url).map(|resolved| {
                InitSource::url(format!("Init URL from config file {}", url), resolved.to_string())
            })
        })
        .collect();
    terria.add_init_sources(extra);

    println!("Terria v{}", terria::VERSION);
    println!("Config: {}", config_url);
    if let Some(app_url) = &args.app_url {
        println!("App URL: {}", app_url);
    }
    println!();

    terria
        .start(StartOptions {
            config_url,
            application_url: args.app_url,
        })
        .await;
    terria.attach_viewer();

    println!("Application: {}", terria.app_name());
    println!("Viewer mode: {:?}", terria.main_viewer().viewer_mode());
    println!();
    print_summary(&terria);

    match raised.load(Ordering::SeqCst) {
        0 => Ok(()),
        count => Err(CliError::Load(count)),
    }
}
