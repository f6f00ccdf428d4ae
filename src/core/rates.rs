//! Process-wide exchange-rate cache.
//!
//! The cache owns a contiguous `[first, last]` range of daily rates. Lookups inside the range
//! never touch the network; lookups outside it extend the range through the rate source and the
//! adaptive window fetcher. All state lives behind one async mutex held for the whole lookup,
//! network load included, so concurrent callers never trigger duplicate loads.

use crate::core::clock::Clock;
use crate::core::currency::{ExchangeRateEntry, ExchangeRateSource, RateConverter};
use crate::core::error::RateError;
use crate::core::series::SyncWindow;
use crate::core::window::fetch_covering;
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// How many days before the requested date a published rate may lie.
pub const LOOKBACK_DAYS: u32 = 10;
/// Extra days requested when extending the cache backwards.
pub const BACKFILL_DAYS: u64 = 7;

#[derive(Debug, Default)]
struct RateCacheState {
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
    entries: BTreeMap<NaiveDate, Decimal>,
    attempted: HashSet<NaiveDate>,
}

impl RateCacheState {
    fn range(&self) -> Option<SyncWindow> {
        Some(SyncWindow::new(self.first?, self.last?))
    }

    /// The range to load so that `date` becomes reachable.
    fn load_window(&self, date: NaiveDate, today: NaiveDate) -> SyncWindow {
        match self.range() {
            None => SyncWindow::new(date.min(today), date.max(today)),
            Some(cached) if date < cached.from => SyncWindow::new(
                date.checked_sub_days(Days::new(BACKFILL_DAYS))
                    .unwrap_or(NaiveDate::MIN),
                cached.from,
            ),
            Some(cached) => SyncWindow::new(cached.to, date.max(cached.to)),
        }
    }

    /// Stores the fetched rates and fills the days between them.
    ///
    /// Days without a published rate receive the closest earlier rate. On the very first load
    /// the days of `window` before the earliest observation receive the earliest rate instead.
    /// Nothing is filled past the latest observation.
    fn absorb(&mut self, window: SyncWindow, mut observed: Vec<ExchangeRateEntry>) {
        if observed.is_empty() {
            return;
        }
        observed.sort_by_key(|entry| entry.date);
        let initial = self.entries.is_empty();
        let earliest = observed[0];
        let latest = observed[observed.len() - 1].date;

        for entry in &observed {
            self.entries.insert(entry.date, entry.value);
        }

        let mut written_from = earliest.date;
        if initial {
            for day in window.from.iter_days().take_while(|day| *day < earliest.date) {
                self.entries.insert(day, earliest.value);
                written_from = written_from.min(day);
            }
        }

        let fill_from = window.from.max(earliest.date);
        for day in fill_from.iter_days().take_while(|day| *day <= latest) {
            if self.entries.contains_key(&day) {
                continue;
            }
            let previous = self.entries.range(..day).next_back().map(|(_, rate)| *rate);
            if let Some(previous) = previous {
                self.entries.insert(day, previous);
            }
        }

        self.first = Some(self.first.map_or(written_from, |first| first.min(written_from)));
        self.last = Some(self.last.map_or(latest, |last| last.max(latest)));
    }

    fn lookback(&self, date: NaiveDate) -> Option<Decimal> {
        (0..=LOOKBACK_DAYS)
            .filter_map(|offset| date.checked_sub_days(Days::new(offset.into())))
            .find_map(|day| self.entries.get(&day).copied())
    }
}

/// Exchange-rate lookup shared by every conversion in the process.
pub struct ExchangeRateCache {
    source: Arc<dyn ExchangeRateSource>,
    clock: Arc<dyn Clock>,
    state: Mutex<RateCacheState>,
}

impl ExchangeRateCache {
    pub fn new(source: Arc<dyn ExchangeRateSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            state: Mutex::new(RateCacheState::default()),
        }
    }

    /// The currently cached `[first, last]` range, if anything has been loaded.
    pub async fn cached_range(&self) -> Option<SyncWindow> {
        self.state.lock().await.range()
    }

    #[instrument(skip(self))]
    pub async fn rate_on(&self, date: NaiveDate) -> Result<Decimal, RateError> {
        let mut state = self.state.lock().await;

        let cached = state.range();
        if cached.is_some_and(|range| range.contains(date))
            && let Some(rate) = state.entries.get(&date)
        {
            return Ok(*rate);
        }

        let outside = !cached.is_some_and(|range| range.contains(date));
        if outside && !state.attempted.contains(&date) {
            let today = self.clock.today();
            let window = state.load_window(date, today);
            info!(%date, %window, "Loading exchange rates");

            let observed = fetch_covering(
                window,
                today,
                |entry: &ExchangeRateEntry| entry.date,
                |page| self.source.fetch_rates(page),
            )
            .await?;
            debug!(count = observed.len(), "Fetched exchange rates");

            state.absorb(window, observed);
            state.attempted.insert(date);
        }

        match state.first {
            Some(first) if date < first => Err(RateError::DateOutOfRange { date, first }),
            _ => state.lookback(date).ok_or(RateError::NoRateAvailable {
                date,
                lookback_days: LOOKBACK_DAYS,
            }),
        }
    }
}

#[async_trait]
impl RateConverter for ExchangeRateCache {
    async fn convert(&self, date: NaiveDate) -> Result<Decimal, RateError> {
        self.rate_on(date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::error::ProviderError;
    use crate::core::series::Fetched;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[derive(Default)]
    struct StubRates {
        rates: BTreeMap<NaiveDate, Decimal>,
        failing: bool,
        requests: std::sync::Mutex<Vec<SyncWindow>>,
    }

    impl StubRates {
        fn with(rates: &[(NaiveDate, Decimal)]) -> Self {
            Self {
                rates: rates.iter().copied().collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn requested(&self) -> Vec<SyncWindow> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExchangeRateSource for StubRates {
        async fn fetch_rates(
            &self,
            window: SyncWindow,
        ) -> Result<Fetched<Vec<ExchangeRateEntry>>, ProviderError> {
            self.requests.lock().unwrap().push(window);
            if self.failing {
                return Err(ProviderError::Other("rate service unavailable".to_string()));
            }
            let entries: Vec<_> = self
                .rates
                .range(window.from..=window.to)
                .map(|(date, value)| ExchangeRateEntry {
                    date: *date,
                    value: *value,
                })
                .collect();
            if entries.is_empty() {
                Ok(Fetched::Empty)
            } else {
                Ok(Fetched::Data(entries))
            }
        }
    }

    fn cache(source: &Arc<StubRates>, today: NaiveDate) -> ExchangeRateCache {
        ExchangeRateCache::new(source.clone(), Arc::new(FixedClock::at_date(today)))
    }

    #[tokio::test]
    async fn test_single_published_rate() {
        let source = Arc::new(StubRates::with(&[(date(2024, 1, 1), dec!(11.20))]));
        let cache = cache(&source, date(2024, 1, 3));

        assert_eq!(cache.convert(date(2024, 1, 3)).await.unwrap(), dec!(11.20));
        let err = cache.convert(date(2023, 12, 20)).await.unwrap_err();
        assert!(matches!(
            err,
            RateError::DateOutOfRange { first, .. } if first == date(2024, 1, 1)
        ));
    }

    #[tokio::test]
    async fn test_repeat_lookup_does_not_reload() {
        let source = Arc::new(StubRates::with(&[
            (date(2024, 1, 1), dec!(11.20)),
            (date(2024, 1, 2), dec!(11.25)),
        ]));
        let cache = cache(&source, date(2024, 1, 6));

        assert_eq!(cache.convert(date(2024, 1, 6)).await.unwrap(), dec!(11.25));
        let calls = source.calls();
        assert!(calls > 0);

        for _ in 0..3 {
            assert_eq!(cache.convert(date(2024, 1, 6)).await.unwrap(), dec!(11.25));
            assert_eq!(cache.convert(date(2024, 1, 1)).await.unwrap(), dec!(11.20));
        }
        assert_eq!(source.calls(), calls);
    }

    #[test]
    fn test_load_window_directions() {
        let today = date(2024, 1, 10);
        let mut state = RateCacheState::default();

        assert_eq!(
            state.load_window(date(2024, 1, 5), today),
            SyncWindow::new(date(2024, 1, 5), today)
        );
        assert_eq!(
            state.load_window(date(2024, 1, 12), today),
            SyncWindow::new(today, date(2024, 1, 12))
        );

        state.first = Some(date(2024, 1, 5));
        state.last = Some(date(2024, 1, 10));
        assert_eq!(
            state.load_window(date(2023, 12, 28), today),
            SyncWindow::new(date(2023, 12, 21), date(2024, 1, 5))
        );
        assert_eq!(
            state.load_window(date(2024, 1, 15), today),
            SyncWindow::new(date(2024, 1, 10), date(2024, 1, 15))
        );
    }

    #[tokio::test]
    async fn test_cache_extends_in_the_direction_of_the_lookup() {
        let mut published = vec![
            (date(2023, 12, 21), dec!(11.05)),
            (date(2024, 1, 15), dec!(11.60)),
        ];
        published.extend((5..=10).map(|day| (date(2024, 1, day), dec!(11.20))));
        let source = Arc::new(StubRates::with(&published));
        let cache = cache(&source, date(2024, 1, 10));

        assert_eq!(cache.convert(date(2024, 1, 5)).await.unwrap(), dec!(11.20));
        assert_eq!(cache.convert(date(2023, 12, 28)).await.unwrap(), dec!(11.05));
        assert_eq!(cache.convert(date(2024, 1, 15)).await.unwrap(), dec!(11.60));

        assert_eq!(
            source.requested(),
            vec![
                SyncWindow::new(date(2024, 1, 5), date(2024, 1, 10)),
                SyncWindow::new(date(2023, 12, 21), date(2024, 1, 5)),
                SyncWindow::new(date(2024, 1, 10), date(2024, 1, 15)),
            ]
        );
        assert_eq!(
            cache.cached_range().await,
            Some(SyncWindow::new(date(2023, 12, 21), date(2024, 1, 15)))
        );
    }

    #[tokio::test]
    async fn test_fill_between_published_days() {
        let source = Arc::new(StubRates::with(&[
            (date(2024, 3, 1), dec!(11.00)),
            (date(2024, 3, 5), dec!(11.50)),
        ]));
        let cache = cache(&source, date(2024, 3, 7));

        assert_eq!(cache.convert(date(2024, 3, 2)).await.unwrap(), dec!(11.00));
        {
            let state = cache.state.lock().await;
            for day in 2..=4 {
                assert_eq!(state.entries.get(&date(2024, 3, day)), Some(&dec!(11.00)));
            }
            assert_eq!(state.range(), Some(SyncWindow::new(date(2024, 3, 1), date(2024, 3, 5))));
        }

        assert_eq!(cache.convert(date(2024, 3, 4)).await.unwrap(), dec!(11.00));
        assert_eq!(cache.convert(date(2024, 3, 7)).await.unwrap(), dec!(11.50));
    }

    #[tokio::test]
    async fn test_initial_load_carries_first_rate_backwards() {
        let source = Arc::new(StubRates::with(&[(date(2024, 1, 4), dec!(11.40))]));
        let cache = cache(&source, date(2024, 1, 5));

        assert_eq!(cache.convert(date(2024, 1, 2)).await.unwrap(), dec!(11.40));
        assert_eq!(
            cache.cached_range().await,
            Some(SyncWindow::new(date(2024, 1, 2), date(2024, 1, 4)))
        );
    }

    #[tokio::test]
    async fn test_lookback_is_bounded_to_ten_days() {
        let source = Arc::new(StubRates::with(&[(date(2024, 1, 1), dec!(11.20))]));

        let ten_back = cache(&source, date(2024, 1, 11));
        assert_eq!(ten_back.convert(date(2024, 1, 11)).await.unwrap(), dec!(11.20));

        let eleven_back = cache(&source, date(2024, 1, 12));
        let err = eleven_back.convert(date(2024, 1, 12)).await.unwrap_err();
        assert!(matches!(
            err,
            RateError::NoRateAvailable { lookback_days: 10, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_date_is_attempted_once() {
        let source = Arc::new(StubRates::default());
        let cache = cache(&source, date(2024, 1, 10));

        assert!(cache.convert(date(2024, 1, 10)).await.is_err());
        // Initial request plus two widenings.
        assert_eq!(source.calls(), 3);

        assert!(cache.convert(date(2024, 1, 10)).await.is_err());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let source = Arc::new(StubRates {
            failing: true,
            ..Default::default()
        });
        let cache = cache(&source, date(2024, 1, 10));

        let err = cache.convert(date(2024, 1, 10)).await.unwrap_err();
        assert!(matches!(err, RateError::Provider(_)));
        assert!(cache.convert(date(2024, 1, 10)).await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_convert_at_uses_local_delivery_day() {
        let source = Arc::new(StubRates::with(&[
            (date(2024, 1, 1), dec!(11.20)),
            (date(2024, 1, 2), dec!(11.30)),
        ]));
        let cache = cache(&source, date(2024, 1, 2));

        // 00:45 on the 2nd in Stockholm.
        let late_evening = Utc.with_ymd_and_hms(2024, 1, 1, 23, 45, 0).unwrap();
        assert_eq!(
            cache.convert_at(late_evening, chrono_tz::Europe::Stockholm).await.unwrap(),
            dec!(11.30)
        );
        assert_eq!(
            cache.convert_at(late_evening, chrono_tz::UTC).await.unwrap(),
            dec!(11.20)
        );
    }

    #[tokio::test]
    async fn test_concurrent_lookups_load_once() {
        let source = Arc::new(StubRates::with(&[(date(2024, 1, 1), dec!(11.20))]));
        let cache = Arc::new(cache(&source, date(2024, 1, 1)));

        let lookups = (0..8).map(|_| {
            let cache = cache.clone();
            async move { cache.convert(date(2024, 1, 1)).await }
        });
        for rate in futures::future::join_all(lookups).await {
            assert_eq!(rate.unwrap(), dec!(11.20));
        }
        assert_eq!(source.calls(), 1);
    }
}
