use super::ui;
use crate::App;
use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Prints the SEK per EUR rate that applies at `date`.
pub async fn display_rate(app: &App, date: NaiveDate) -> Result<()> {
    let rate = app
        .rates
        .rate_on(date)
        .await
        .with_context(|| format!("Failed to look up exchange rate for {date}"))?;

    println!(
        "{} {}",
        ui::style_text(&format!("{date}:"), ui::StyleType::TotalLabel),
        ui::style_text(&format!("{rate} SEK/EUR"), ui::StyleType::TotalValue)
    );
    if let Some(range) = app.rates.cached_range().await {
        println!(
            "{}",
            ui::style_text(&format!("cached rates {range}"), ui::StyleType::Subtle)
        );
    }
    Ok(())
}
