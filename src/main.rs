mod app;
mod cli;
mod cli_ops;
mod clock;
mod config;
mod domain;
mod fsck;
mod ids;
mod integrity;
mod listing;
mod locks;
mod logging;
mod notify;
mod store;
mod ui;

use app::{App, AppError};
use config::EngineConfig;
use notify::LiveMessage;
use time::Date;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("{}", error_line(&err));
        std::process::exit(1);
    }
}

/// `error[<kind>] (<field>): <message>`; the field only for input errors.
fn error_line(err: &AppError) -> String {
    match err.field() {
        Some(field) => format!("error[{}] ({}): {}", err.kind().as_str(), field, err),
        None => format!("error[{}]: {}", err.kind().as_str(), err),
    }
}

fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).expect("json serialization should work")
    );
}

fn run() -> Result<(), AppError> {
    use clap::Parser;
    use cli::Commands;

    let cli = cli::Cli::parse();
    logging::init(cli.verbose);

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config = config.with_data_dir(data_dir);
    }

    match cli.command {
        Commands::Config(args) => {
            if args.json {
                print_json(&config);
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
        Commands::Fsck(args) => {
            let store = store::Store::open(&config.data_dir)?;
            let report = fsck::run_fsck(&store)?;
            if args.json {
                print_json(&report);
            } else {
                println!(
                    "fsck scanned_files={} issues={}",
                    report.files_scanned,
                    report.issues.len()
                );
                for issue in &report.issues {
                    println!("  - {}: {}", issue.path, issue.message);
                }
            }
            if !report.ok() {
                return Err(AppError::Consistency(format!(
                    "fsck found {} issue(s)",
                    report.issues.len()
                )));
            }
            Ok(())
        }
        Commands::Problem(args) => with_app(config, |app| run_problem(app, args.command)),
        Commands::Provider(args) => with_app(config, |app| run_provider(app, args.command)),
        Commands::Resident(args) => with_app(config, |app| run_resident(app, args.command)),
        Commands::Candidature(args) => with_app(config, |app| run_candidature(app, args.command)),
        Commands::Project(args) => with_app(config, |app| run_project(app, args.command)),
        Commands::Subscription(args) => {
            with_app(config, |app| run_subscription(app, args.command))
        }
        Commands::Notification(args) => {
            with_app(config, |app| run_notification(app, args.command))
        }
    }
}

/// Opens the engine for one command and logs what the command pushed to the
/// live channel.
fn with_app(
    config: EngineConfig,
    command: impl FnOnce(&App) -> Result<(), AppError>,
) -> Result<(), AppError> {
    let app = App::open(config)?;
    let mut live = app.live_receiver();
    let outcome = command(&app);
    log_live_deliveries(&mut live);
    outcome
}

fn log_live_deliveries(live: &mut broadcast::Receiver<LiveMessage>) {
    loop {
        match live.try_recv() {
            Ok(message) => info!(
                recipient_class = message.recipient_class.as_str(),
                recipient = message.recipient_key.as_deref().unwrap_or("-"),
                payload = %message.payload,
                "live notification"
            ),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "live notifications dropped before logging");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

fn run_problem(app: &App, command: cli::ProblemSubcommands) -> Result<(), AppError> {
    use cli::ProblemSubcommands;
    use domain::problem::{Priority, ProblemType};

    match command {
        ProblemSubcommands::Report(args) => {
            let problem = app.report_problem(app::NewProblem {
                id: args.id,
                location: args.location,
                problem_type: args.problem_type.parse::<ProblemType>()?,
                description: args.description,
                reporter_email: args.reporter,
            })?;
            if args.json {
                print_json(&problem);
            } else {
                println!(
                    "reported problem #{} ({}) in {}",
                    problem.id, problem.problem_type, problem.district
                );
            }
        }
        ProblemSubcommands::Ls(args) => {
            let filter = listing::ProblemFilter {
                include_resolved: args.all,
                problem_type: args
                    .problem_type
                    .as_deref()
                    .map(str::parse::<ProblemType>)
                    .transpose()?,
                priority: args
                    .priority
                    .as_deref()
                    .map(str::parse::<Priority>)
                    .transpose()?,
                district: args.district,
                reporter_email: args.reporter,
                query: args.query,
            };
            let page = paginate(app, app.filter_problems(&filter), &args.page);
            if args.json {
                print_json(&page);
            } else {
                ui::print_problem_list(&page);
            }
        }
        ProblemSubcommands::Show(args) => {
            let problem = app.find_problem(args.id)?;
            if args.json {
                print_json(&problem);
            } else {
                ui::print_problem(&problem);
            }
        }
        ProblemSubcommands::Priority(args) => {
            let problem = app.set_priority(args.id, args.priority.parse::<Priority>()?)?;
            println!("problem #{} priority={}", problem.id, problem.priority.as_str());
        }
        ProblemSubcommands::Resolve(args) => {
            let problem = app.resolve_problem(args.id)?;
            println!("resolved problem #{}", problem.id);
        }
    }
    Ok(())
}

fn run_provider(app: &App, command: cli::ProviderSubcommands) -> Result<(), AppError> {
    use cli::ProviderSubcommands;

    match command {
        ProviderSubcommands::Register(args) => {
            let provider = app.register_provider(app::NewProvider {
                neq: args.neq,
                business_name: args.business_name,
                contact_name: args.contact,
                phone: args.phone,
                email: args.email,
            })?;
            println!("registered provider {} ({})", provider.neq, provider.business_name);
        }
        ProviderSubcommands::Ls(args) => {
            let providers = app.list_providers();
            if args.json {
                print_json(&providers);
            } else {
                providers.iter().for_each(ui::print_provider);
            }
        }
        ProviderSubcommands::Show(args) => {
            let provider = app.find_provider(&args.key)?;
            if args.json {
                print_json(&provider);
            } else {
                ui::print_provider(&provider);
            }
        }
    }
    Ok(())
}

fn run_resident(app: &App, command: cli::ResidentSubcommands) -> Result<(), AppError> {
    use cli::ResidentSubcommands;

    match command {
        ResidentSubcommands::Register(args) => {
            let resident = app.register_resident(app::NewResident {
                email: args.email,
                first_name: args.first_name,
                last_name: args.last_name,
                phone: args.phone,
                address: args.address,
            })?;
            println!("registered resident {}", resident.email);
        }
        ResidentSubcommands::Ls(args) => {
            let residents = app.list_residents();
            if args.json {
                print_json(&residents);
            } else {
                residents.iter().for_each(ui::print_resident);
            }
        }
        ResidentSubcommands::Show(args) => {
            let resident = app.find_resident(&args.key)?;
            if args.json {
                print_json(&resident);
            } else {
                ui::print_resident(&resident);
            }
        }
    }
    Ok(())
}

fn run_candidature(app: &App, command: cli::CandidatureSubcommands) -> Result<(), AppError> {
    use cli::CandidatureSubcommands;
    use domain::candidature::CandidatureStatus;

    match command {
        CandidatureSubcommands::Submit(args) => {
            let json = args.json;
            let candidature = app.submit_candidature(draft_from(args)?)?;
            if json {
                print_json(&candidature);
            } else {
                println!("submitted candidature #{}", candidature.id);
            }
        }
        CandidatureSubcommands::Update(args) => {
            let json = args.draft.json;
            let candidature = app.update_candidature(args.id, draft_from(args.draft)?)?;
            if json {
                print_json(&candidature);
            } else {
                println!("updated candidature #{}", candidature.id);
            }
        }
        CandidatureSubcommands::Withdraw(args) => {
            let candidature = app.withdraw_candidature(args.id)?;
            println!("withdrew candidature #{}", candidature.id);
        }
        CandidatureSubcommands::Approve(args) => {
            let approval = app.approve_candidature(args.id)?;
            if args.json {
                print_json(&approval);
            } else {
                println!(
                    "approved candidature #{}; created project #{}",
                    approval.candidature.id, approval.project.id
                );
            }
        }
        CandidatureSubcommands::Reject(args) => {
            let candidature = app.reject_candidature(args.id, args.comment.as_deref())?;
            println!("rejected candidature #{}", candidature.id);
        }
        CandidatureSubcommands::Ls(args) => {
            let filter = listing::CandidatureFilter {
                provider_neq: args.provider_neq,
                status: args
                    .status
                    .as_deref()
                    .map(str::parse::<CandidatureStatus>)
                    .transpose()?,
                problem_id: args.problem_id,
            };
            let page = paginate(app, app.filter_candidatures(&filter), &args.page);
            if args.json {
                print_json(&page);
            } else {
                ui::print_candidature_list(&page);
            }
        }
        CandidatureSubcommands::Show(args) => {
            let candidature = app.find_candidature(args.id)?;
            if args.json {
                print_json(&candidature);
            } else {
                ui::print_candidature(&candidature);
            }
        }
    }
    Ok(())
}

fn run_project(app: &App, command: cli::ProjectSubcommands) -> Result<(), AppError> {
    use cli::ProjectSubcommands;
    use domain::problem::ProblemType;
    use domain::project::ProjectStatus;

    let changed = match command {
        ProjectSubcommands::Start(args) => app.start_project(args.id)?,
        ProjectSubcommands::Suspend(args) => app.suspend_project(args.id)?,
        ProjectSubcommands::Resume(args) => app.resume_project(args.id)?,
        ProjectSubcommands::Complete(args) => app.complete_project(args.id)?,
        ProjectSubcommands::Cancel(args) => app.cancel_project(args.id)?,
        ProjectSubcommands::Ls(args) => {
            let filter = listing::ProjectFilter {
                include_finished: args.all,
                provider_neq: args.provider_neq,
                status: args
                    .status
                    .as_deref()
                    .map(str::parse::<ProjectStatus>)
                    .transpose()?,
                district: args.district,
                work_type: args
                    .work_type
                    .as_deref()
                    .map(str::parse::<ProblemType>)
                    .transpose()?,
            };
            let page = paginate(app, app.filter_projects(&filter), &args.page);
            if args.json {
                print_json(&page);
            } else {
                ui::print_project_list(&page);
            }
            return Ok(());
        }
        ProjectSubcommands::Show(args) => {
            let project = app.find_project(args.id)?;
            if args.json {
                print_json(&project);
            } else {
                ui::print_project(&project);
            }
            return Ok(());
        }
    };
    println!("project #{} is now {}", changed.id, changed.status.as_str());
    Ok(())
}

fn run_subscription(app: &App, command: cli::SubscriptionSubcommands) -> Result<(), AppError> {
    use cli::SubscriptionSubcommands;
    use notify::SubscriptionKind;

    match command {
        SubscriptionSubcommands::Add(args) => {
            let subscriber = party(&args.party)?;
            let kind = args.kind.parse::<SubscriptionKind>()?;
            match app.subscribe(&subscriber, kind, &args.value)? {
                Some(subscription) => println!(
                    "subscribed {} to {} = {}",
                    subscriber, kind, subscription.value
                ),
                None => println!("{} is already subscribed to {} = {}", subscriber, kind, args.value),
            }
        }
        SubscriptionSubcommands::Remove(args) => {
            let subscriber = party(&args.party)?;
            let kind = args.kind.parse::<SubscriptionKind>()?;
            if !app.unsubscribe(&subscriber, kind, &args.value)? {
                return Err(AppError::not_found(
                    "subscription",
                    format!("{} {}={}", subscriber, kind, args.value),
                ));
            }
            println!("unsubscribed {} from {} = {}", subscriber, kind, args.value);
        }
        SubscriptionSubcommands::Ls(args) => {
            let subscriptions = app.subscriptions_for(&party(&args.party)?)?;
            if args.json {
                print_json(&subscriptions);
            } else {
                ui::print_subscriptions(&subscriptions);
            }
        }
    }
    Ok(())
}

fn run_notification(app: &App, command: cli::NotificationSubcommands) -> Result<(), AppError> {
    use cli::NotificationSubcommands;

    match command {
        NotificationSubcommands::Ls(args) => {
            let notifications = app.notifications_for(&recipient(&args.recipient)?, args.unread)?;
            let page = paginate(app, notifications, &args.page);
            if args.json {
                print_json(&page);
            } else {
                ui::print_notification_list(&page);
            }
        }
        NotificationSubcommands::Read(args) => {
            let notification = app.mark_notification_read(args.id)?;
            println!("marked notification #{} read", notification.id);
        }
        NotificationSubcommands::ReadAll(args) => {
            let marked = app.mark_all_read(&recipient(&args.recipient)?)?;
            println!("marked {} notification(s) read", marked);
        }
    }
    Ok(())
}

fn paginate<T>(app: &App, items: Vec<T>, args: &cli::PageArgs) -> listing::Page<T> {
    listing::paginate(items, args.page, args.page_size, app.config().pagination)
}

fn draft_from(args: cli::DraftArgs) -> Result<app::CandidatureDraft, AppError> {
    Ok(app::CandidatureDraft {
        provider_neq: args.provider_neq,
        problem_ids: args.problem_ids,
        description: args.description,
        estimated_cost: args.estimated_cost,
        planned_start: date_arg("planned_start", &args.planned_start)?,
        planned_end: date_arg("planned_end", &args.planned_end)?,
    })
}

fn date_arg(field: &'static str, raw: &str) -> Result<Date, AppError> {
    clock::parse_date(raw.trim()).map_err(|err| {
        AppError::validation(field, format!("'{}' is not a YYYY-MM-DD date ({})", raw, err))
    })
}

fn party(args: &cli::PartyArgs) -> Result<notify::Recipient, AppError> {
    match (args.resident.as_deref(), args.provider.as_deref()) {
        (Some(email), None) => Ok(notify::Recipient::resident(email)),
        (None, Some(neq)) => Ok(notify::Recipient::provider(neq)),
        _ => Err(AppError::validation(
            "subscriber",
            "pass exactly one of --resident or --provider",
        )),
    }
}

fn recipient(args: &cli::RecipientArgs) -> Result<notify::Recipient, AppError> {
    match (args.resident.as_deref(), args.provider.as_deref(), args.stpm) {
        (Some(email), None, false) => Ok(notify::Recipient::resident(email)),
        (None, Some(neq), false) => Ok(notify::Recipient::provider(neq)),
        (None, None, true) => Ok(notify::Recipient::stpm()),
        _ => Err(AppError::validation(
            "recipient",
            "pass exactly one of --resident, --provider or --stpm",
        )),
    }
}
