mod cli;
mod paths;
mod run;
mod state;

use anyhow::Result;
use cli::Command;
use paths::AppPaths;
use shadergraph::CHANNELS;
use state::AppState;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Channels) => run_channels(),
        Some(Command::Where) => run_where(),
        None => run::run(cli.run),
    }
}

fn run_channels() -> Result<()> {
    println!("Bakeable channels:");
    for spec in CHANNELS.iter() {
        println!(
            "  {:<11} key={:<11} socket={:<19} color={:<9} default={}",
            spec.id,
            spec.key,
            spec.target_socket,
            spec.color_space.to_string(),
            if spec.enabled_by_default { "on" } else { "off" }
        );
    }
    Ok(())
}

fn run_where() -> Result<()> {
    let paths = AppPaths::discover()?;
    println!("Configuration directories:");
    println!("  config:     {}", paths.config_dir().display());
    println!("  bake.toml:  {}", paths.config_file().display());
    println!("  state:      {}", paths.state_file().display());

    let state = AppState::load_or_default(&paths.state_file())?;
    if let Some(outcome) = &state.last_outcome {
        println!("Last run ({} total): {outcome}", state.runs);
        if let Some(dir) = &state.last_output_dir {
            println!("  output:     {}", dir.display());
        }
        if let Some(seconds) = state.last_elapsed_seconds {
            println!("  elapsed:    {seconds:.2}s");
        }
        println!("  files:      {}", state.last_files.len());
        if state.last_failures > 0 {
            println!("  failures:   {}", state.last_failures);
        }
    }
    Ok(())
}
