use crate::{infra, server};
use clap::{Args, Parser, Subcommand};
use hireflow::applications::ApplicationStatus;
use hireflow::config::AppConfig;
use hireflow::error::AppError;
use hireflow::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "hireflow",
    about = "Run the job application intake service and inspect its records",
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
    /// Apply pending database migrations and print the schema version
    Migrate,
    /// Print stored applications, newest first
    List(ListArgs),
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

#[derive(Args, Debug, Default)]
pub(crate) struct ListArgs {
    /// Only show applications in this status (Pending, Approved, Rejected)
    #[arg(long, value_parser = parse_status_arg)]
    pub(crate) status: Option<ApplicationStatus>,
}

fn parse_status_arg(raw: &str) -> Result<ApplicationStatus, String> {
    ApplicationStatus::parse(raw)
        .ok_or_else(|| format!("unknown status '{raw}'; expected Pending, Approved, or Rejected"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Migrate => run_migrate(),
        Command::List(args) => run_list(args),
    }
}

fn run_migrate() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let database = infra::open_database(&config.storage)?;
    println!(
        "database {} at schema version {}",
        config.storage.database_path,
        database.schema_version()?
    );
    Ok(())
}

fn run_list(args: ListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let service = infra::build_service(&config)?;
    let records = service.list(args.status)?;
    if records.is_empty() {
        println!("no applications found");
        return Ok(());
    }

    for record in records {
        println!(
            "{:>5}  {}  {:<8}  {}  <{}>  {} / {}  {}",
            record.id.0,
            record.reference_id,
            record.status.label(),
            record.contact.full_name,
            record.contact.email,
            record.contact.department,
            record.contact.job_role,
            record.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    Ok(())
}
