//! 🚀 bottle-cli: the front door, the bouncer, the maitre d' of bottle.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Loads config, sets up logging, and lets the library do the heavy lifting.
//! Like a manager. 🦆

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🚀 main(): where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Find the config file, or settle for env vars
/// 3. Run until the queues close (file replay ends, or Ctrl-C)
/// 4. Print the summary, or the error chain and exit 1
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path_arg = std::env::args().nth(1).unwrap_or_else(|| "bottle.toml".to_string());

    // 🔒 No file is fine, env vars alone can carry a config. An unreadable path is not.
    let config_file = std::path::Path::new(&path_arg);
    let config_file = match config_file.try_exists().context(format!(
        "💀 Could not check whether the configuration file exists. Maybe permissions, maybe \
         a relative path resolved against the wrong cwd. Was checking here: '{}'",
        config_file.display()
    ))? {
        true => Some(config_file),
        false => {
            info!("🔧 no '{}' here, configuring from BOTTLE_* env vars only", config_file.display());
            None
        }
    };

    let result = match bottle::app_config::load_config(config_file)
        .context("💀 In bottle-cli, main, we couldn't load the config. Take a look at the file and the BOTTLE_* env vars.")
    {
        Ok(app_config) => bottle::run(app_config).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(reports) => {
            info!("📊 run summary\n{}", bottle::report::render_summary(&reports));
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
            }
            std::process::exit(1);
        }
    }
}
