//! Adaptive window fetching for providers that may answer a range with partial or no data.
//!
//! [`WindowPlan`] holds the target range, the range currently requested and the range
//! observed so far. Each provider answer is fed to [`WindowPlan::record`]; the next request
//! comes from [`WindowPlan::next_request`], which widens the window by [`WIDEN_STEP_DAYS`]
//! on the side(s) still missing, at most [`MAX_WIDENINGS`] times.

use crate::core::series::{Fetched, SyncWindow};
use chrono::{Days, NaiveDate};
use std::future::Future;
use tracing::debug;

pub const MAX_WIDENINGS: u32 = 2;
pub const WIDEN_STEP_DAYS: u64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    target: SyncWindow,
    current: SyncWindow,
    observed: Option<SyncWindow>,
    widenings: u32,
    requests: u32,
    no_content: bool,
}

impl WindowPlan {
    pub fn new(target: SyncWindow) -> Self {
        Self {
            target,
            current: target,
            observed: None,
            widenings: 0,
            requests: 0,
            no_content: false,
        }
    }

    pub fn target(&self) -> SyncWindow {
        self.target
    }

    pub fn observed(&self) -> Option<SyncWindow> {
        self.observed
    }

    pub fn widenings(&self) -> u32 {
        self.widenings
    }

    pub fn is_covered(&self) -> bool {
        self.observed.is_some_and(|seen| seen.covers(&self.target))
    }

    /// The window to request next, or `None` once the target is covered or the
    /// widening budget is spent.
    pub fn next_request(&mut self, today: NaiveDate) -> Option<SyncWindow> {
        if self.is_covered() || self.widenings >= MAX_WIDENINGS {
            return None;
        }

        let missing_start = self.observed.is_some_and(|seen| seen.from > self.target.from);
        let missing_end = self.observed.is_some_and(|seen| seen.to < self.target.to);

        let mut widened = false;
        if self.no_content || missing_start {
            self.current.from = self
                .current
                .from
                .checked_sub_days(Days::new(WIDEN_STEP_DAYS))
                .unwrap_or(NaiveDate::MIN);
            widened = true;
        }
        if self.no_content || (missing_end && self.current.to < today) {
            self.current.to = self
                .current
                .to
                .checked_add_days(Days::new(WIDEN_STEP_DAYS))
                .unwrap_or(NaiveDate::MAX);
            widened = true;
        }
        if widened {
            self.widenings += 1;
        } else if self.requests > 0 {
            // Asking for the same window again cannot change the answer.
            return None;
        }

        self.requests += 1;
        Some(self.current)
    }

    /// Feeds a provider answer for the last requested window. Returns the items that
    /// extend the observed range; items inside it are dropped.
    pub fn record<T>(
        &mut self,
        answer: Fetched<Vec<T>>,
        today: NaiveDate,
        date_of: impl Fn(&T) -> NaiveDate,
    ) -> Vec<T> {
        let items = match answer {
            Fetched::Empty => {
                self.no_content = true;
                return Vec::new();
            }
            Fetched::Data(items) if items.is_empty() => {
                self.no_content = true;
                return Vec::new();
            }
            Fetched::Data(items) => items,
        };
        self.no_content = false;

        let mut accepted = Vec::new();
        for item in items {
            let date = date_of(&item);
            let extends = if let Some(seen) = self.observed.as_mut() {
                let mut extends = false;
                if date < seen.from {
                    seen.from = date;
                    extends = true;
                }
                if date > seen.to {
                    seen.to = date;
                    extends = true;
                }
                extends
            } else {
                self.observed = Some(SyncWindow::new(date, date));
                true
            };
            if extends {
                accepted.push(item);
            }
        }

        // Nothing newer can exist once the request reaches today.
        if let Some(seen) = self.observed
            && seen.to < self.target.to
            && self.current.to >= today
        {
            self.target.to = seen.to;
        }

        accepted
    }
}

/// Repeatedly calls `fetch_page` with a widening window until `target` is covered or the
/// widening budget is exhausted, returning every observation that extended the covered range.
pub async fn fetch_covering<T, E, F, Fut>(
    target: SyncWindow,
    today: NaiveDate,
    date_of: impl Fn(&T) -> NaiveDate,
    mut fetch_page: F,
) -> Result<Vec<T>, E>
where
    F: FnMut(SyncWindow) -> Fut,
    Fut: Future<Output = Result<Fetched<Vec<T>>, E>>,
{
    let mut plan = WindowPlan::new(target);
    let mut result = Vec::new();

    while let Some(window) = plan.next_request(today) {
        debug!(%window, widenings = plan.widenings(), "Requesting window");
        let answer = fetch_page(window).await?;
        if answer.is_empty() {
            debug!(%window, "Provider reported no content");
        }
        result.extend(plan.record(answer, today, &date_of));
    }

    debug!(
        target = %plan.target(),
        observed = ?plan.observed(),
        covered = plan.is_covered(),
        "Window fetch finished"
    );
    Ok(result)
}
