use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, Parser, Subcommand};

pub use crate::cli_ops::*;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

#[derive(Debug, Parser)]
#[command(name = "mav")]
#[command(bin_name = "mav")]
#[command(version)]
#[command(about = "Municipal public-works problems, candidatures and projects")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "MAVILLE_DATA_DIR",
        global = true,
        help = "Data directory (overrides data_dir from the config file)."
    )]
    pub data_dir: Option<PathBuf>,

    #[arg(
        short = 'c',
        long,
        env = "MAVILLE_CONFIG",
        global = true,
        help = "TOML config file (defaults to ./maville.toml when present)."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        global = true,
        help = "Log engine activity to stderr (MAVILLE_LOG takes precedence)."
    )]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Report, list, prioritize and resolve problems.")]
    Problem(ProblemArgs),
    #[command(about = "Register and look up service providers.")]
    Provider(ProviderArgs),
    #[command(about = "Register and look up residents.")]
    Resident(ResidentArgs),
    #[command(about = "Submit and review candidatures.")]
    Candidature(CandidatureArgs),
    #[command(about = "Drive approved projects through their lifecycle.")]
    Project(ProjectArgs),
    #[command(about = "Manage notification subscriptions.")]
    Subscription(SubscriptionArgs),
    #[command(about = "Read notifications.")]
    Notification(NotificationArgs),
    #[command(about = "Validate the data directory without modifying it.")]
    Fsck(FsckArgs),
    #[command(about = "Print the effective configuration.")]
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ProblemArgs {
    #[command(subcommand)]
    pub command: ProblemSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ProblemSubcommands {
    #[command(about = "Report a new problem as a registered resident.")]
    Report(ProblemReportArgs),
    #[command(about = "List problems (open only unless --all).")]
    Ls(ProblemListArgs),
    #[command(about = "Show one problem.")]
    Show(ShowIdArgs),
    #[command(about = "Change the priority of an open problem.")]
    Priority(ProblemPriorityArgs),
    #[command(about = "Mark a problem resolved.")]
    Resolve(IdArgs),
}

#[derive(Debug, Args)]
pub struct ProblemReportArgs {
    #[arg(long, help = "Explicit problem id (must not be in use).")]
    pub id: Option<u64>,

    #[arg(short = 'l', long, help = "Street address or place description.")]
    pub location: String,

    #[arg(short = 't', long = "type", help = "Problem type, e.g. road_works.")]
    pub problem_type: String,

    #[arg(short = 'm', long = "desc", help = "Free-text description.")]
    pub description: String,

    #[arg(short = 'r', long, help = "Reporting resident's email.")]
    pub reporter: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProblemListArgs {
    #[arg(short = 'a', long = "all", help = "Include resolved problems.")]
    pub all: bool,

    #[arg(short = 't', long = "type", help = "Filter by problem type.")]
    pub problem_type: Option<String>,

    #[arg(short = 'p', long, help = "Filter by priority (low, medium, high).")]
    pub priority: Option<String>,

    #[arg(long, help = "Filter by district.")]
    pub district: Option<String>,

    #[arg(short = 'r', long, help = "Filter by reporter email.")]
    pub reporter: Option<String>,

    #[arg(short = 'q', long, help = "Text query over location and description.")]
    pub query: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProblemPriorityArgs {
    #[arg(help = "Problem id.")]
    pub id: u64,

    #[arg(help = "New priority (low, medium, high).")]
    pub priority: String,
}

#[derive(Debug, Args)]
pub struct ProviderArgs {
    #[command(subcommand)]
    pub command: ProviderSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ProviderSubcommands {
    #[command(about = "Register a provider by NEQ.")]
    Register(ProviderRegisterArgs),
    #[command(about = "List registered providers.")]
    Ls(JsonArgs),
    #[command(about = "Show one provider.")]
    Show(ShowKeyArgs),
}

#[derive(Debug, Args)]
pub struct ProviderRegisterArgs {
    #[arg(long, help = "Quebec enterprise number (10 digits).")]
    pub neq: String,

    #[arg(short = 'n', long = "name", help = "Business name.")]
    pub business_name: String,

    #[arg(long, default_value = "", help = "Contact person.")]
    pub contact: String,

    #[arg(long, default_value = "", help = "Contact phone number.")]
    pub phone: String,

    #[arg(short = 'e', long, help = "Contact email.")]
    pub email: String,
}

#[derive(Debug, Args)]
pub struct ResidentArgs {
    #[command(subcommand)]
    pub command: ResidentSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ResidentSubcommands {
    #[command(about = "Register a resident by email.")]
    Register(ResidentRegisterArgs),
    #[command(about = "List registered residents.")]
    Ls(JsonArgs),
    #[command(about = "Show one resident.")]
    Show(ShowKeyArgs),
}

#[derive(Debug, Args)]
pub struct ResidentRegisterArgs {
    #[arg(short = 'e', long, help = "Email address (the resident's key).")]
    pub email: String,

    #[arg(long, help = "First name.")]
    pub first_name: String,

    #[arg(long, help = "Last name.")]
    pub last_name: String,

    #[arg(long, default_value = "", help = "Phone number.")]
    pub phone: String,

    #[arg(long, default_value = "", help = "Home address.")]
    pub address: String,
}

#[derive(Debug, Args)]
pub struct FsckArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(short = 'j', long, help = "Render JSON instead of TOML.")]
    pub json: bool,
}
