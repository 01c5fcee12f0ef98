//! CLI front ends for the patient and nurse client shells.
//!
//! Both commands talk to the HTTP API at the configured base URL using the
//! stored session (or the build's auto login).

use std::future::Future;
use std::time::Duration;

use anyhow::Result;

use stoma_core::client::shell::NoticeLevel;
use stoma_core::client::{
    ClientContext, CompletionFilter, HttpSource, Notice, NurseShell, PatientShell, PlanView,
    Screen, SessionStore,
};

use crate::config::{self, StomaConfig};

pub struct TasksOptions {
    pub filter: CompletionFilter,
    pub search: String,
    pub toggle: Option<i64>,
    pub as_nurse: bool,
    pub watch: bool,
}

/// A shell that can reload the plan it shows.
trait ReloadPlan {
    fn reload(&mut self, patient_id: i64) -> impl Future<Output = Screen<PlanView>>;
}

impl ReloadPlan for PatientShell<HttpSource> {
    async fn reload(&mut self, patient_id: i64) -> Screen<PlanView> {
        self.open_plan(patient_id).await
    }
}

impl ReloadPlan for NurseShell<HttpSource> {
    async fn reload(&mut self, patient_id: i64) -> Screen<PlanView> {
        self.open_plan(patient_id).await
    }
}

fn context(resolved: &StomaConfig) -> Result<ClientContext> {
    let store = SessionStore::new(config::session_path());
    ClientContext::bootstrap(resolved.client_config(), &store)
}

/// Print an informational notice, or turn an error notice into a failure.
fn report(notice: Notice) -> Result<()> {
    match notice.level {
        NoticeLevel::Info => {
            println!("{notice}");
            Ok(())
        }
        NoticeLevel::Error => anyhow::bail!("{}", notice.message),
    }
}

/// `stoma tasks <patient-id>`
pub async fn run_tasks(resolved: &StomaConfig, patient_id: i64, options: TasksOptions) -> Result<()> {
    let ctx = context(resolved)?;
    let source = HttpSource::new(&ctx);

    if options.as_nurse {
        let mut shell = NurseShell::new(ctx, source);
        if let Screen::Back(notice) = shell.open_plan(patient_id).await {
            return report(notice);
        }
        shell.set_filter(options.filter);
        shell.set_search(options.search);
        if let Some(view) = shell.view() {
            print_plan(&view);
        }
        if options.watch {
            let every = shell.context().config.refresh_interval();
            watch_plan(&mut shell, patient_id, every, ctrl_c()).await;
        }
        return Ok(());
    }

    let mut shell = PatientShell::new(ctx, source);
    if let Screen::Back(notice) = shell.open_plan(patient_id).await {
        return report(notice);
    }
    if let Some(item_id) = options.toggle {
        match shell.toggle_item(item_id).await {
            Ok(true) => println!("Task {item_id} completed."),
            Ok(false) => println!("Task {item_id} marked pending."),
            Err(notice) => return report(notice),
        }
    }
    shell.set_filter(options.filter);
    shell.set_search(options.search);
    if let Some(view) = shell.view() {
        print_plan(&view);
    }
    if options.watch {
        let every = shell.context().config.refresh_interval();
        watch_plan(&mut shell, patient_id, every, ctrl_c()).await;
    }
    Ok(())
}

async fn ctrl_c() {
    // A missing signal handler means there is nothing to wait for.
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Reload and print the plan every `every` until `stop` resolves.
/// Returns the number of reloads. A failed reload prints its notice and
/// the loop carries on with the next tick.
async fn watch_plan<R: ReloadPlan>(
    shell: &mut R,
    patient_id: i64,
    every: Duration,
    stop: impl Future<Output = ()>,
) -> usize {
    println!();
    println!("Watching plan every {}s, Ctrl+C to stop.", every.as_secs_f32());
    tokio::pin!(stop);
    let mut reloads = 0;
    loop {
        tokio::select! {
            _ = &mut stop => return reloads,
            _ = tokio::time::sleep(every) => {}
        }
        reloads += 1;
        println!();
        match shell.reload(patient_id).await {
            Screen::Show(view) => print_plan(&view),
            Screen::Back(notice) => println!("{notice}"),
        }
    }
}

fn print_plan(view: &PlanView) {
    println!("{} (plan {})", view.title, view.plan_id);
    println!(
        "  {} .. {}  {}  {}",
        view.start_date, view.end_date, view.frequency, view.status
    );
    println!("  Progress: {}", view.progress);
    if !view.notes.is_empty() {
        println!("  Notes: {}", view.notes);
    }
    println!();

    if view.items.is_empty() {
        println!("  (no tasks match filter {:?})", view.filter.as_str());
        return;
    }
    for item in &view.items {
        let check = if item.completed { "x" } else { " " };
        println!("  [{check}] #{:<5} {}", item.id, item.title);
        if !item.target_value.is_empty() {
            println!("           target: {}", item.target_value);
        }
    }
}

/// `stoma education`
pub async fn run_education(
    resolved: &StomaConfig,
    category: Option<&str>,
    search: &str,
) -> Result<()> {
    let ctx = context(resolved)?;
    let source = HttpSource::new(&ctx);
    let mut shell = PatientShell::new(ctx, source);

    let articles = match shell.browse_articles(category, search).await {
        Screen::Show(articles) => articles,
        Screen::Back(notice) => return report(notice),
    };

    let categories = shell.article_categories();
    if !categories.is_empty() {
        println!("Categories: {}", categories.join(", "));
        println!();
    }

    if articles.is_empty() {
        println!("No articles found.");
        return Ok(());
    }
    for article in &articles {
        println!("[{}] {}", article.category, article.title);
        if !article.summary.is_empty() {
            println!("    {}", article.summary);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every reload fails; counts the attempts.
    struct Flaky {
        calls: usize,
    }

    impl ReloadPlan for Flaky {
        async fn reload(&mut self, _patient_id: i64) -> Screen<PlanView> {
            self.calls += 1;
            Screen::Back(Notice::error(format!("reload {} failed", self.calls)))
        }
    }

    #[tokio::test]
    async fn watch_keeps_reloading_after_failures_until_stopped() {
        let mut shell = Flaky { calls: 0 };
        let every = Duration::from_millis(10);

        let reloads = watch_plan(
            &mut shell,
            1,
            every,
            tokio::time::sleep(Duration::from_millis(75)),
        )
        .await;

        assert!(reloads >= 2, "expected repeated reloads, got {reloads}");
        assert_eq!(reloads, shell.calls);
    }

    #[tokio::test]
    async fn watch_stops_before_first_tick() {
        let mut shell = Flaky { calls: 0 };
        let reloads = watch_plan(&mut shell, 1, Duration::from_secs(30), async {}).await;
        assert_eq!(reloads, 0);
        assert_eq!(shell.calls, 0);
    }
}
