use clap::Parser;
use promptctl::cli::{
    handle_create, handle_delete, handle_diff, handle_generate, handle_get, handle_init, handle_invoke,
    handle_list, handle_promote, handle_sweep, handle_test, handle_traces, handle_update,
    handle_variables, Cli, Commands, GlobalOptions,
};
use promptctl::Result;
use tracing::warn;

fn configure_logging(verbose: bool, quiet: bool) {
    use tracing::Level;
    use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

    let log_level = if quiet {
        Level::ERROR
    } else if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("loro=warn,{log_level}")));

    registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn dispatch(command: Commands, opts: &GlobalOptions) -> Result<i32> {
    let done = |result: Result<()>| result.map(|()| 0);

    match command {
        Commands::Init => done(handle_init()),
        Commands::List { json } => done(handle_list(opts, json).await),
        Commands::Get { slug, json } => done(handle_get(opts, slug, json).await),
        Commands::Create {
            slug,
            name,
            description,
            revision,
            json,
        } => done(handle_create(opts, slug, name, description, revision, json).await),
        Commands::Update {
            slug,
            name,
            description,
            revision,
            json,
        } => done(handle_update(opts, slug, name, description, revision, json).await),
        Commands::Delete { slug, force } => done(handle_delete(opts, slug, force).await),
        Commands::Diff { slug, revision, json } => done(handle_diff(opts, slug, revision, json).await),
        Commands::Invoke { slug, input, json } => done(handle_invoke(opts, slug, input, json).await),
        Commands::Test {
            slug,
            input,
            revision,
            keep,
            force,
            json,
        } => handle_test(opts, slug, input, revision, keep, force, json).await,
        Commands::Promote {
            from,
            to,
            keep,
            force,
        } => handle_promote(opts, from, to, keep, force).await,
        Commands::Generate { slug, output } => done(handle_generate(opts, slug, output).await),
        Commands::Variables { slug, json } => done(handle_variables(opts, slug, json).await),
        Commands::Sweep { source, force } => done(handle_sweep(opts, source, force).await),
        Commands::Traces { slug, limit, json } => done(handle_traces(opts, slug, limit, json).await),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    configure_logging(cli.verbose, cli.quiet);

    let opts = GlobalOptions {
        project: cli.project,
        timeout_ms: cli.timeout_ms,
    };

    let result = tokio::select! {
        result = dispatch(cli.command, &opts) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted. A staged candidate may remain; run 'promptctl sweep' to remove it.");
            std::process::exit(130);
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
