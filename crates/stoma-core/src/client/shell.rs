//! Patient and nurse shells: load plan data, render filtered views and
//! write task completion back.
//!
//! Failures never leave a shell in a broken state. Load failures come back
//! as [`Screen::Back`] with a [`Notice`]; failed writes return a notice and
//! leave the in-memory plan untouched.

use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, warn};

use stoma_db::models::{CarePlanItem, EducationArticle, Frequency, PlanDetail, PlanStatus};

use super::source::{CarePlanSource, ClientError};
use super::view::{self, CompletionFilter, Progress};
use super::ClientContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    fn from_client_error(action: &str, err: &ClientError) -> Self {
        match err {
            ClientError::Unauthorized(_) => {
                Self::error(format!("{action}: not authorized, please log in again"))
            }
            ClientError::Transport(_) => {
                Self::error(format!("{action}: network unavailable, try again later"))
            }
            other => Self::error(format!("{action}: {other}")),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => f.write_str(&self.message),
            NoticeLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// Result of navigating to a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum Screen<T> {
    Show(T),
    /// The screen could not be shown; go back to the previous one.
    Back(Notice),
}

impl<T> Screen<T> {
    pub fn is_back(&self) -> bool {
        matches!(self, Self::Back(_))
    }

    pub fn into_shown(self) -> Option<T> {
        match self {
            Self::Show(view) => Some(view),
            Self::Back(_) => None,
        }
    }
}

/// Render-ready snapshot of the loaded plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanView {
    pub plan_id: i64,
    pub patient_id: i64,
    pub title: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub status: PlanStatus,
    pub notes: String,
    /// Over all items, regardless of the active filter.
    pub progress: Progress,
    pub filter: CompletionFilter,
    pub search: String,
    /// Items passing the filter and search, in display order.
    pub items: Vec<CarePlanItem>,
}

/// Loaded plan plus the view settings shared by both shells.
#[derive(Debug, Default)]
struct PlanPanel {
    detail: Option<PlanDetail>,
    filter: CompletionFilter,
    search: String,
}

impl PlanPanel {
    async fn load<S: CarePlanSource>(&mut self, source: &S, patient_id: i64) -> Screen<PlanView> {
        match source.fetch_active_plan(patient_id).await {
            Ok(detail) => {
                debug!(patient_id, plan_id = detail.summary.plan.id, "care plan loaded");
                self.detail = Some(detail);
                match self.view() {
                    Some(view) => Screen::Show(view),
                    None => Screen::Back(Notice::error("care plan could not be shown")),
                }
            }
            Err(ClientError::NotFound(_)) => {
                Screen::Back(Notice::info(format!("patient {patient_id} has no active care plan")))
            }
            Err(e) => {
                warn!(patient_id, error = %e, "loading care plan failed");
                Screen::Back(Notice::from_client_error("could not load care plan", &e))
            }
        }
    }

    fn view(&self) -> Option<PlanView> {
        let detail = self.detail.as_ref()?;
        let plan = &detail.summary.plan;
        Some(PlanView {
            plan_id: plan.id,
            patient_id: plan.patient_id,
            title: plan.title.clone(),
            start_date: plan.start_date,
            end_date: plan.end_date,
            frequency: plan.frequency,
            status: plan.status,
            notes: plan.notes.clone(),
            progress: Progress::of(&detail.items),
            filter: self.filter,
            search: self.search.clone(),
            items: view::filter_items(&detail.items, self.filter, &self.search)
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    fn item(&self, item_id: i64) -> Option<&CarePlanItem> {
        self.detail
            .as_ref()
            .and_then(|d| d.items.iter().find(|i| i.id == item_id))
    }

    fn apply(&mut self, stored: CarePlanItem) {
        if let Some(detail) = self.detail.as_mut() {
            if let Some(slot) = detail.items.iter_mut().find(|i| i.id == stored.id) {
                *slot = stored;
            }
            detail.summary.completed_count =
                detail.items.iter().filter(|i| i.completed).count() as i64;
        }
    }
}

/// The patient-facing client.
pub struct PatientShell<S> {
    ctx: ClientContext,
    source: S,
    panel: PlanPanel,
    articles: Option<Vec<EducationArticle>>,
}

impl<S: CarePlanSource> PatientShell<S> {
    pub fn new(ctx: ClientContext, source: S) -> Self {
        Self {
            ctx,
            source,
            panel: PlanPanel::default(),
            articles: None,
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Load the active plan of `patient_id`.
    pub async fn open_plan(&mut self, patient_id: i64) -> Screen<PlanView> {
        self.panel.load(&self.source, patient_id).await
    }

    /// Current view of the loaded plan.
    pub fn view(&self) -> Option<PlanView> {
        self.panel.view()
    }

    pub fn set_filter(&mut self, filter: CompletionFilter) {
        self.panel.filter = filter;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.panel.search = search.into();
    }

    /// Write an item's completion flag and update the loaded plan.
    pub async fn set_item_completed(&mut self, item_id: i64, completed: bool) -> Result<(), Notice> {
        if !self.ctx.is_logged_in() {
            return Err(Notice::error("please log in before updating tasks"));
        }
        if self.panel.item(item_id).is_none() {
            return Err(Notice::error(format!("task {item_id} is not part of this plan")));
        }

        match self.source.set_item_completed(item_id, completed).await {
            Ok(stored) => {
                debug!(item_id, completed = stored.completed, "task updated");
                self.panel.apply(stored);
                Ok(())
            }
            Err(e) => {
                warn!(item_id, error = %e, "updating task failed");
                Err(Notice::from_client_error("could not update task", &e))
            }
        }
    }

    /// Flip an item's completion flag. Returns the new value.
    pub async fn toggle_item(&mut self, item_id: i64) -> Result<bool, Notice> {
        let completed = match self.panel.item(item_id) {
            Some(item) => !item.completed,
            None => return Err(Notice::error(format!("task {item_id} is not part of this plan"))),
        };
        self.set_item_completed(item_id, completed).await?;
        Ok(completed)
    }

    /// Education articles in `category` matching `search`.
    ///
    /// The article list is fetched once and filtered locally afterwards.
    pub async fn browse_articles(
        &mut self,
        category: Option<&str>,
        search: &str,
    ) -> Screen<Vec<EducationArticle>> {
        if self.articles.is_none() {
            match self.source.list_articles(None).await {
                Ok(articles) => self.articles = Some(articles),
                Err(e) => {
                    warn!(error = %e, "loading education articles failed");
                    return Screen::Back(Notice::from_client_error(
                        "could not load education articles",
                        &e,
                    ));
                }
            }
        }

        let articles = self.articles.as_deref().unwrap_or_default();
        Screen::Show(
            view::filter_articles(articles, category, search)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    /// Categories of the loaded articles, in first-seen order.
    pub fn article_categories(&self) -> Vec<&str> {
        self.articles
            .as_deref()
            .map(view::categories)
            .unwrap_or_default()
    }
}

/// The nurse-facing client: read-only plan views with progress.
pub struct NurseShell<S> {
    ctx: ClientContext,
    source: S,
    panel: PlanPanel,
}

impl<S: CarePlanSource> NurseShell<S> {
    pub fn new(ctx: ClientContext, source: S) -> Self {
        Self {
            ctx,
            source,
            panel: PlanPanel::default(),
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.ctx
    }

    /// Load the active plan of `patient_id`.
    pub async fn open_plan(&mut self, patient_id: i64) -> Screen<PlanView> {
        self.panel.load(&self.source, patient_id).await
    }

    pub fn view(&self) -> Option<PlanView> {
        self.panel.view()
    }

    pub fn set_filter(&mut self, filter: CompletionFilter) {
        self.panel.filter = filter;
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.panel.search = search.into();
    }

    /// Completed over total items of the loaded plan.
    pub fn progress(&self) -> Option<Progress> {
        self.panel.detail.as_ref().map(|d| Progress::of(&d.items))
    }
}
