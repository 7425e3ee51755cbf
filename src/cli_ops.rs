use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct IdArgs {
    #[arg(help = "Record id.")]
    pub id: u64,
}

#[derive(Debug, Args)]
pub struct ShowIdArgs {
    #[arg(help = "Record id.")]
    pub id: u64,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowKeyArgs {
    #[arg(help = "NEQ for providers, email for residents.")]
    pub key: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

/// Zero-based page selection; the size is clamped to the configured bounds.
#[derive(Debug, Args)]
pub struct PageArgs {
    #[arg(long, default_value_t = 0, help = "Zero-based page number.")]
    pub page: usize,

    #[arg(long, help = "Items per page (defaults to the configured size).")]
    pub page_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CandidatureArgs {
    #[command(subcommand)]
    pub command: CandidatureSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum CandidatureSubcommands {
    #[command(about = "Submit a candidature for one or more problems.")]
    Submit(DraftArgs),
    #[command(about = "Revise a candidature still awaiting review.")]
    Update(CandidatureUpdateArgs),
    #[command(about = "Withdraw a submitted candidature.")]
    Withdraw(IdArgs),
    #[command(about = "Approve a candidature and create its project.")]
    Approve(ShowIdArgs),
    #[command(about = "Reject a candidature with a comment.")]
    Reject(CandidatureRejectArgs),
    #[command(about = "List candidatures.")]
    Ls(CandidatureListArgs),
    #[command(about = "Show one candidature.")]
    Show(ShowIdArgs),
}

#[derive(Debug, Args)]
pub struct DraftArgs {
    #[arg(long = "provider", help = "Submitting provider's NEQ.")]
    pub provider_neq: String,

    #[arg(
        short = 'p',
        long = "problem",
        required = true,
        help = "Targeted problem id (repeatable)."
    )]
    pub problem_ids: Vec<u64>,

    #[arg(short = 'm', long = "desc", help = "Work description.")]
    pub description: String,

    #[arg(long = "cost", help = "Estimated cost.")]
    pub estimated_cost: f64,

    #[arg(long = "start", help = "Planned start date (YYYY-MM-DD).")]
    pub planned_start: String,

    #[arg(long = "end", help = "Planned end date (YYYY-MM-DD).")]
    pub planned_end: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CandidatureUpdateArgs {
    #[arg(help = "Candidature id.")]
    pub id: u64,

    #[command(flatten)]
    pub draft: DraftArgs,
}

#[derive(Debug, Args)]
pub struct CandidatureRejectArgs {
    #[arg(help = "Candidature id.")]
    pub id: u64,

    #[arg(short = 'm', long, help = "Reason shown to the provider (required).")]
    pub comment: Option<String>,
}

#[derive(Debug, Args)]
pub struct CandidatureListArgs {
    #[arg(long = "provider", help = "Filter by provider NEQ.")]
    pub provider_neq: Option<String>,

    #[arg(short = 's', long, help = "Filter by status.")]
    pub status: Option<String>,

    #[arg(short = 'p', long = "problem", help = "Only candidatures targeting this problem.")]
    pub problem_id: Option<u64>,

    #[command(flatten)]
    pub page: PageArgs,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum ProjectSubcommands {
    #[command(about = "Start a planned project.")]
    Start(IdArgs),
    #[command(about = "Suspend a project in progress.")]
    Suspend(IdArgs),
    #[command(about = "Resume a suspended project.")]
    Resume(IdArgs),
    #[command(about = "Complete a project and resolve its problems.")]
    Complete(IdArgs),
    #[command(about = "Cancel a project.")]
    Cancel(IdArgs),
    #[command(about = "List projects (active only unless --all).")]
    Ls(ProjectListArgs),
    #[command(about = "Show one project.")]
    Show(ShowIdArgs),
}

#[derive(Debug, Args)]
pub struct ProjectListArgs {
    #[arg(short = 'a', long = "all", help = "Include completed and cancelled projects.")]
    pub all: bool,

    #[arg(long = "provider", help = "Filter by provider NEQ.")]
    pub provider_neq: Option<String>,

    #[arg(short = 's', long, help = "Filter by status.")]
    pub status: Option<String>,

    #[arg(long, help = "Filter by district.")]
    pub district: Option<String>,

    #[arg(short = 't', long = "type", help = "Filter by work type.")]
    pub work_type: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

/// Identifies a resident or provider; exactly one must be given.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct PartyArgs {
    #[arg(long, help = "Resident email.")]
    pub resident: Option<String>,

    #[arg(long, help = "Provider NEQ.")]
    pub provider: Option<String>,
}

/// Identifies a notification recipient, STPM included.
#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
pub struct RecipientArgs {
    #[arg(long, help = "Resident email.")]
    pub resident: Option<String>,

    #[arg(long, help = "Provider NEQ.")]
    pub provider: Option<String>,

    #[arg(long, help = "The public-works department (STPM).")]
    pub stpm: bool,
}

#[derive(Debug, Args)]
pub struct SubscriptionArgs {
    #[command(subcommand)]
    pub command: SubscriptionSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionSubcommands {
    #[command(about = "Subscribe to a problem type, location or district.")]
    Add(SubscriptionChangeArgs),
    #[command(about = "Remove a subscription.")]
    Remove(SubscriptionChangeArgs),
    #[command(about = "List a party's subscriptions.")]
    Ls(SubscriptionListArgs),
}

#[derive(Debug, Args)]
pub struct SubscriptionChangeArgs {
    #[command(flatten)]
    pub party: PartyArgs,

    #[arg(help = "Subscription kind: problem_type, location or district.")]
    pub kind: String,

    #[arg(help = "Value to match.")]
    pub value: String,
}

#[derive(Debug, Args)]
pub struct SubscriptionListArgs {
    #[command(flatten)]
    pub party: PartyArgs,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct NotificationArgs {
    #[command(subcommand)]
    pub command: NotificationSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum NotificationSubcommands {
    #[command(about = "List a recipient's notifications, newest first.")]
    Ls(NotificationListArgs),
    #[command(about = "Mark one notification read.")]
    Read(NotificationIdArgs),
    #[command(about = "Mark all of a recipient's notifications read.")]
    ReadAll(RecipientOnlyArgs),
}

#[derive(Debug, Args)]
pub struct NotificationListArgs {
    #[command(flatten)]
    pub recipient: RecipientArgs,

    #[arg(short = 'u', long, help = "Only unread notifications.")]
    pub unread: bool,

    #[command(flatten)]
    pub page: PageArgs,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct NotificationIdArgs {
    #[arg(help = "Notification id, as listed by `notification ls`.")]
    pub id: i64,
}

#[derive(Debug, Args)]
pub struct RecipientOnlyArgs {
    #[command(flatten)]
    pub recipient: RecipientArgs,
}
