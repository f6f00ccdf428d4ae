use super::ui;
use crate::App;
use crate::core::clock::{Clock, SystemClock};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use comfy_table::Cell;

/// The last stored point of one sync target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRow {
    pub family: String,
    pub target: String,
    pub last_point: Option<DateTime<Utc>>,
}

pub async fn collect_status(app: &App) -> Result<Vec<StatusRow>> {
    let mut rows = Vec::new();
    for family in app.collector.families() {
        for target in family.targets() {
            let last_point = app.store.last_checkpoint(&target.checkpoint).await?;
            rows.push(StatusRow {
                family: family.name().to_string(),
                target: target.key,
                last_point,
            });
        }
    }
    Ok(rows)
}

pub fn render_status(rows: &[StatusRow], today: NaiveDate) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Family"),
        ui::header_cell("Target"),
        ui::header_cell("Last point (UTC)"),
        ui::header_cell("Behind"),
    ]);

    for row in rows {
        let last_point = ui::format_optional_cell(row.last_point, "never", |ts| {
            ts.format("%Y-%m-%d %H:%M").to_string()
        });
        let lag = row.last_point.map_or(Cell::new(""), |ts| {
            ui::lag_cell((today - ts.date_naive()).num_days())
        });
        table.add_row(vec![
            Cell::new(&row.family),
            Cell::new(&row.target),
            last_point,
            lag,
        ]);
    }

    let never = rows.iter().filter(|row| row.last_point.is_none()).count();
    let mut output = format!(
        "{}\n\n",
        ui::style_text("Synchronisation status", ui::StyleType::Title)
    );
    output.push_str(&table.to_string());
    if never > 0 {
        output.push_str(&format!(
            "\n\n{}",
            ui::style_text(
                &format!("{never} targets have never been synchronised"),
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

pub async fn display_status(app: &App) -> Result<()> {
    let rows = collect_status(app).await?;
    println!("{}", render_status(&rows, SystemClock.today()));
    Ok(())
}
