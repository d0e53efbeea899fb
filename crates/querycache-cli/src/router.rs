//! Command routing logic for CLI

use crate::args::{Cli, Commands, ConfigAction};
use crate::commands;
use querycache_core::error::QueryCacheResult;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> QueryCacheResult<()> {
    match cli.command {
        Commands::Key(args) => commands::inspect::key(&args),
        Commands::Tags(args) => commands::inspect::tags(&cli.config, &args),
        Commands::Check {
            statement,
            cache,
            no_cache,
            ttl,
        } => commands::inspect::check(&cli.config, &statement, cache, no_cache, ttl),
        Commands::Replay { file } => commands::replay::run(&cli.config, &file).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&cli.config),
            ConfigAction::Validate => commands::config::validate(&cli.config),
            ConfigAction::Init { force } => commands::config::init(&cli.config, force).await,
        },
    }
}
