use crate::cli::{Cli, Commands};
use crate::Workspace;
use anyhow::Result;

mod export;
mod import;
mod validate;

pub fn execute(cli: Cli) -> Result<()> {
    let workspace = Workspace::new()?;

    match cli.command {
        Commands::Export {
            tool,
            scope,
            include_sensitive,
            output,
            description,
        } => export::execute(
            &workspace,
            export::Args {
                tool: tool.into(),
                scope: scope.into(),
                include_sensitive,
                output,
                description,
            },
        ),

        Commands::Import {
            package,
            strategy,
            no_backup,
            no_adapt,
            tool,
            scope,
        } => import::execute(
            &workspace,
            import::Args {
                package,
                strategy: strategy.map(Into::into),
                no_backup,
                no_adapt,
                tool: tool.into(),
                scope: scope.into(),
            },
        ),

        Commands::Validate { package } => validate::execute(&package),
    }
}
