use crate::demo::{run_demo, DemoArgs};
use crate::infra::SeedDirectory;
use crate::server;
use clap::{Args, Parser, Subcommand};
use kantama::config::AppConfig;
use kantama::error::AppError;
use kantama::workflows::leasing::{TokenIssuer, WorkflowError};

#[derive(Parser, Debug)]
#[command(
    name = "Kantama Leasing",
    about = "Run the Kantama leasing workflow service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk one application from public submission to a signed contract
    Demo(DemoArgs),
    /// Print a bearer token for one of the seeded accounts
    Token(TokenArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct TokenArgs {
    /// E-mail of a seeded account (admin, financier user or customer)
    #[arg(long)]
    pub(crate) email: String,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Demo(args) => run_demo(args),
        Command::Token(args) => print_token(args),
    }
}

fn print_token(args: TokenArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let seed = SeedDirectory::standard(&config.workflow.admin_email);
    let user = seed
        .user_by_email(&args.email)
        .ok_or_else(|| WorkflowError::not_found("user"))?;
    let token = TokenIssuer::from_config(&config.auth).issue(user)?;

    println!("{} ({})", user.email, user.role.label());
    println!("Authorization: Bearer {token}");
    Ok(())
}
