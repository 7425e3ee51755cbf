use std::io::{self, IsTerminal};

use crate::clock::format_date;
use crate::domain::candidature::Candidature;
use crate::domain::party::{Provider, Resident};
use crate::domain::problem::Problem;
use crate::domain::project::Project;
use crate::listing::Page;
use crate::notify::{Notification, Subscription};

pub fn print_problem_list(page: &Page<Problem>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Problems"));
    if page.items.is_empty() {
        println!("{}", palette.dim("no problems matched"));
    }
    for problem in &page.items {
        println!("{}", format_problem_row(problem, &palette));
    }
    println!("{}", palette.dim(&page_footer(page, "problem")));
}

pub fn print_problem(problem: &Problem) {
    let palette = Palette::auto();
    println!("{}", format_problem_row(problem, &palette));
    println!("  district: {}", problem.district);
    println!("  reported: {} by {}", problem.reported_at, problem.reporter_email);
    if let Some(resolved_at) = problem.resolved_at.as_deref() {
        println!("  resolved: {}", resolved_at);
    }
    println!("  {}", problem.description);
}

fn format_problem_row(problem: &Problem, palette: &Palette) -> String {
    let state = if problem.resolved { "resolved" } else { "open" };
    format!(
        "{} {} {} {} {}",
        palette.id(&format!("#{}", problem.id)),
        palette.status(state),
        palette.kind(problem.problem_type.as_str()),
        palette.priority(problem.priority.as_str()),
        problem.location
    )
}

pub fn print_candidature_list(page: &Page<Candidature>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Candidatures"));
    if page.items.is_empty() {
        println!("{}", palette.dim("no candidatures matched"));
    }
    for candidature in &page.items {
        println!("{}", format_candidature_row(candidature, &palette));
    }
    println!("{}", palette.dim(&page_footer(page, "candidature")));
}

pub fn print_candidature(candidature: &Candidature) {
    let palette = Palette::auto();
    println!("{}", format_candidature_row(candidature, &palette));
    println!(
        "  planned: {} .. {}",
        format_date(candidature.planned_start),
        format_date(candidature.planned_end)
    );
    println!("  cost: {:.2}", candidature.estimated_cost);
    println!("  submitted: {}", candidature.submitted_at);
    if let Some(comment) = candidature.rejection_comment.as_deref() {
        println!("  rejection: {}", comment);
    }
    println!("  {}", candidature.description);
}

fn format_candidature_row(candidature: &Candidature, palette: &Palette) -> String {
    format!(
        "{} {} provider={} problems={}",
        palette.id(&format!("#{}", candidature.id)),
        palette.status(candidature.status.as_str()),
        candidature.provider_neq,
        id_list(&candidature.problem_ids)
    )
}

pub fn print_project_list(page: &Page<Project>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Projects"));
    if page.items.is_empty() {
        println!("{}", palette.dim("no projects matched"));
    }
    for project in &page.items {
        println!("{}", format_project_row(project, &palette));
    }
    println!("{}", palette.dim(&page_footer(page, "project")));
}

pub fn print_project(project: &Project) {
    let palette = Palette::auto();
    println!("{}", format_project_row(project, &palette));
    println!(
        "  candidature: #{}  provider: {}",
        project.candidature_id, project.provider_neq
    );
    println!("  problems: {}", id_list(&project.problem_ids));
    println!(
        "  planned: {} .. {}",
        format_date(project.planned_start),
        format_date(project.planned_end)
    );
    if let Some(start) = project.actual_start {
        let end = project.actual_end.map(format_date).unwrap_or_default();
        println!("  actual: {} .. {}", format_date(start), end);
    }
    println!("  cost: {:.2}", project.cost);
    println!("  {}", project.description);
}

fn format_project_row(project: &Project, palette: &Palette) -> String {
    format!(
        "{} {} {} {} {} ({})",
        palette.id(&format!("#{}", project.id)),
        palette.status(project.status.as_str()),
        palette.kind(project.work_type.as_str()),
        palette.priority(project.priority.as_str()),
        project.location,
        project.district
    )
}

pub fn print_provider(provider: &Provider) {
    let palette = Palette::auto();
    let mut line = format!("{} {}", palette.id(&provider.neq), provider.business_name);
    if !provider.contact_name.is_empty() {
        line.push_str(&format!(" ({})", provider.contact_name));
    }
    line.push_str(&format!(" {}", provider.email));
    if !provider.phone.is_empty() {
        line.push_str(&format!(" {}", provider.phone));
    }
    println!("{}", line);
}

pub fn print_resident(resident: &Resident) {
    let palette = Palette::auto();
    println!(
        "{} {}{}",
        palette.id(&resident.email),
        resident.full_name(),
        if resident.address.is_empty() {
            String::new()
        } else {
            format!(", {}", resident.address)
        }
    );
}

pub fn print_subscriptions(subscriptions: &[Subscription]) {
    let palette = Palette::auto();
    if subscriptions.is_empty() {
        println!("{}", palette.dim("no subscriptions"));
        return;
    }
    for subscription in subscriptions {
        println!(
            "{} {} = {}",
            palette.id(&format!("#{}", subscription.id)),
            palette.kind(subscription.kind.as_str()),
            subscription.value
        );
    }
}

pub fn print_notification_list(page: &Page<Notification>) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Notifications"));
    if page.items.is_empty() {
        println!("{}", palette.dim("no notifications"));
    }
    for notification in &page.items {
        let marker = if notification.read { " " } else { "*" };
        println!(
            "{} {} {} {}",
            marker,
            palette.id(&format!("#{}", notification.id)),
            palette.dim(&notification.created_at),
            notification.message
        );
    }
    println!("{}", palette.dim(&page_footer(page, "notification")));
}

fn page_footer<T>(page: &Page<T>, noun: &str) -> String {
    format!(
        "{} {}(s), page {} of {}",
        page.total_items,
        noun,
        page.page,
        page.total_pages.saturating_sub(1)
    )
}

fn id_list(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{}", id))
        .collect::<Vec<_>>()
        .join(",")
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn status(&self, status: &str) -> String {
        let upper = status.to_ascii_uppercase();
        self.paint(status_color_code(status), &format!("[{upper}]"))
    }

    fn kind(&self, kind: &str) -> String {
        self.paint("35", &format!("({kind})"))
    }

    fn priority(&self, priority: &str) -> String {
        let code = match priority {
            "high" => "31",
            "medium" => "33",
            _ => "90",
        };
        self.paint(code, priority)
    }
}

fn status_color_code(status: &str) -> &'static str {
    match status {
        "open" | "submitted" | "planned" => "34",
        "in_progress" => "33",
        "suspended" => "35",
        "approved" | "resolved" | "completed" => "32",
        "rejected" | "cancelled" => "31",
        _ => "37",
    }
}

#[cfg(test)]
mod tests {
    use super::{id_list, page_footer, status_color_code};
    use crate::listing::Page;

    #[test]
    fn page_footer_reports_zero_based_last_page() {
        let page = Page {
            items: vec![1, 2],
            page: 0,
            page_size: 2,
            total_items: 5,
            total_pages: 3,
        };
        assert_eq!(page_footer(&page, "problem"), "5 problem(s), page 0 of 2");
    }

    #[test]
    fn id_list_prefixes_each_id() {
        assert_eq!(id_list(&[3, 9]), "#3,#9");
        assert_eq!(id_list(&[]), "");
    }

    #[test]
    fn terminal_statuses_share_colors() {
        assert_eq!(status_color_code("completed"), status_color_code("approved"));
        assert_eq!(status_color_code("cancelled"), status_color_code("rejected"));
        assert_eq!(status_color_code("withdrawn"), "37");
    }
}
