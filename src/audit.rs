//! Audit trail of semantic canvas edits.
//!
//! Events are recorded synchronously at the call site of each mutation,
//! independent of autosave. A failed graph save therefore never leaves a
//! hole in the trail.
//!
//! Reads filter by event type and a date range resolved in the caller's
//! local time zone, then group the results by calendar day for display.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::models::{AuditEvent, EventType};
use crate::storage::{AuditQuery, AuditSink};
use crate::{Error, Result};

/// Default number of events returned by a listing.
pub const DEFAULT_EVENT_LIMIT: usize = 100;

/// Which days of history to include.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateRange {
    #[default]
    All,
    Today,
    Yesterday,
    Last7Days,
    Last30Days,
    /// Inclusive calendar days
    Between(NaiveDate, NaiveDate),
}

impl DateRange {
    /// Parse a preset name or an explicit `YYYY-MM-DD..YYYY-MM-DD` range.
    pub fn parse(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        match lowered.as_str() {
            "all" => return Ok(DateRange::All),
            "today" => return Ok(DateRange::Today),
            "yesterday" => return Ok(DateRange::Yesterday),
            "last7days" | "last-7-days" | "7d" => return Ok(DateRange::Last7Days),
            "last30days" | "last-30-days" | "30d" => return Ok(DateRange::Last30Days),
            _ => {}
        }

        let (from, to) = lowered
            .split_once("..")
            .ok_or_else(|| Error::Validation(format!("Unknown date range: {}", s)))?;
        let parse_day = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                .map_err(|e| Error::Validation(format!("Invalid date {}: {}", d, e)))
        };
        let (from, to) = (parse_day(from)?, parse_day(to)?);
        if from > to {
            return Err(Error::Validation(format!(
                "Date range starts after it ends: {}..{}",
                from, to
            )));
        }
        Ok(DateRange::Between(from, to))
    }

    /// Resolve to a half-open UTC interval relative to `now`'s local day.
    pub fn bounds<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let tz = now.timezone();
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);

        match *self {
            DateRange::All => (None, None),
            DateRange::Today => (
                Some(start_of_day(&tz, today)),
                Some(start_of_day(&tz, tomorrow)),
            ),
            DateRange::Yesterday => (
                Some(start_of_day(&tz, today - Duration::days(1))),
                Some(start_of_day(&tz, today)),
            ),
            DateRange::Last7Days => (
                Some(start_of_day(&tz, today - Duration::days(6))),
                Some(start_of_day(&tz, tomorrow)),
            ),
            DateRange::Last30Days => (
                Some(start_of_day(&tz, today - Duration::days(29))),
                Some(start_of_day(&tz, tomorrow)),
            ),
            DateRange::Between(from, to) => (
                Some(start_of_day(&tz, from)),
                Some(start_of_day(&tz, to + Duration::days(1))),
            ),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::All => write!(f, "all"),
            DateRange::Today => write!(f, "today"),
            DateRange::Yesterday => write!(f, "yesterday"),
            DateRange::Last7Days => write!(f, "last7days"),
            DateRange::Last30Days => write!(f, "last30days"),
            DateRange::Between(from, to) => write!(f, "{}..{}", from, to),
        }
    }
}

/// First instant of `date` in `tz`, skipping forward over a DST gap.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Listing filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Empty means every type
    pub types: BTreeSet<EventType>,
    pub range: DateRange,
    pub limit: usize,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            types: BTreeSet::new(),
            range: DateRange::All,
            limit: DEFAULT_EVENT_LIMIT,
        }
    }
}

impl EventFilter {
    pub fn with_type(mut self, event_type: EventType) -> Self {
        self.types.insert(event_type);
        self
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Events of one local calendar day, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayGroup {
    pub date: NaiveDate,
    pub events: Vec<AuditEvent>,
}

/// Group events by local calendar day: newest day first, newest event first.
pub fn group_by_day<Tz: TimeZone>(mut events: Vec<AuditEvent>, tz: &Tz) -> Vec<DayGroup> {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut groups: Vec<DayGroup> = Vec::new();
    for event in events {
        let date = event.created_at.with_timezone(tz).date_naive();
        match groups.last_mut() {
            Some(group) if group.date == date => group.events.push(event),
            _ => groups.push(DayGroup {
                date,
                events: vec![event],
            }),
        }
    }
    groups
}

/// Records and reads audit events for canvases.
#[derive(Clone)]
pub struct EventTracker {
    sink: Arc<dyn AuditSink>,
}

impl EventTracker {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append one event, stamped now.
    pub fn record(
        &self,
        canvas_id: &str,
        user_id: &str,
        event_type: EventType,
        target_id: &str,
        event_data: Value,
    ) -> Result<AuditEvent> {
        let event = AuditEvent {
            id: format!("ev-{}", uuid::Uuid::new_v4().simple()),
            canvas_id: canvas_id.to_string(),
            user_id: user_id.to_string(),
            event_type,
            target_id: target_id.to_string(),
            event_data,
            created_at: Utc::now(),
        };
        self.sink.append(&event)?;
        debug!(canvas_id, event_type = %event_type, target_id, "audit event recorded");
        Ok(event)
    }

    /// List events relative to the local clock, grouped by local day.
    pub fn list(&self, canvas_id: &str, filter: &EventFilter) -> Result<Vec<DayGroup>> {
        self.list_at(canvas_id, filter, &Local::now())
    }

    /// List events relative to an explicit `now`; its zone defines "day".
    pub fn list_at<Tz: TimeZone>(
        &self,
        canvas_id: &str,
        filter: &EventFilter,
        now: &DateTime<Tz>,
    ) -> Result<Vec<DayGroup>> {
        let (from, to) = filter.range.bounds(now);
        let query = AuditQuery {
            types: filter.types.clone(),
            from,
            to,
            limit: filter.limit,
        };
        let events = self.sink.list(canvas_id, &query)?;
        Ok(group_by_day(events, &now.timezone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;
    use std::sync::Mutex;

    /// In-memory sink that keeps events in insertion order.
    #[derive(Default)]
    struct MemorySink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl MemorySink {
        fn push_at(&self, event_type: EventType, created_at: DateTime<Utc>) {
            let mut events = self.events.lock().unwrap();
            let id = format!("ev-{}", events.len());
            events.push(AuditEvent {
                id,
                canvas_id: "c".to_string(),
                user_id: "u".to_string(),
                event_type,
                target_id: "n".to_string(),
                event_data: Value::Null,
                created_at,
            });
        }
    }

    impl AuditSink for MemorySink {
        fn append(&self, event: &AuditEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn list(&self, canvas_id: &str, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
            let mut events: Vec<AuditEvent> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.canvas_id == canvas_id && query.matches(e))
                .cloned()
                .collect();
            events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            events.truncate(query.limit);
            Ok(events)
        }
    }

    fn zone() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn local(day: u32, hour: u32) -> DateTime<Utc> {
        zone()
            .with_ymd_and_hms(2026, 5, day, hour, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn now() -> DateTime<FixedOffset> {
        zone().with_ymd_and_hms(2026, 5, 10, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_presets_and_ranges() {
        assert_eq!(DateRange::parse("today").unwrap(), DateRange::Today);
        assert_eq!(DateRange::parse("Last7Days").unwrap(), DateRange::Last7Days);
        assert_eq!(DateRange::parse("all").unwrap(), DateRange::All);
        assert_eq!(
            DateRange::parse("2026-01-01..2026-01-31").unwrap(),
            DateRange::Between(
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()
            )
        );
        assert!(DateRange::parse("2026-02-01..2026-01-01").is_err());
        assert!(DateRange::parse("fortnight").is_err());
    }

    #[test]
    fn test_today_bounds_follow_local_midnight() {
        let (from, to) = DateRange::Today.bounds(&now());
        assert_eq!(from.unwrap(), local(10, 0));
        assert_eq!(to.unwrap(), local(11, 0));
    }

    #[test]
    fn test_rolling_windows_include_today() {
        let (from, to) = DateRange::Last7Days.bounds(&now());
        assert_eq!(from.unwrap(), local(4, 0));
        assert_eq!(to.unwrap(), local(11, 0));

        let (from, to) = DateRange::Last30Days.bounds(&now());
        let april_11 = zone()
            .with_ymd_and_hms(2026, 4, 11, 0, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(from.unwrap(), april_11);
        assert_eq!(to.unwrap(), local(11, 0));
    }

    #[test]
    fn test_between_includes_whole_end_day() {
        let range = DateRange::Between(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 5, 3).unwrap(),
        );
        let (from, to) = range.bounds(&now());
        assert_eq!(from.unwrap(), local(1, 0));
        assert_eq!(to.unwrap(), local(4, 0));

        let sink = Arc::new(MemorySink::default());
        sink.push_at(EventType::BlockCreated, local(1, 0));
        sink.push_at(EventType::BlockCreated, local(3, 23));
        sink.push_at(EventType::BlockCreated, local(4, 0));
        sink.push_at(EventType::BlockCreated, local(1, 0) - Duration::seconds(1));

        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default().with_range(range);
        let events: Vec<_> = tracker
            .list_at("c", &filter, &now())
            .unwrap()
            .into_iter()
            .flat_map(|g| g.events)
            .map(|e| e.created_at)
            .collect();
        assert_eq!(events, vec![local(3, 23), local(1, 0)]);
    }

    #[test]
    fn test_last7days_window_edges() {
        let sink = Arc::new(MemorySink::default());
        sink.push_at(EventType::PromptAdded, local(4, 0));
        sink.push_at(EventType::PromptAdded, local(4, 0) - Duration::seconds(1));
        sink.push_at(EventType::PromptAdded, local(10, 23));

        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default().with_range(DateRange::Last7Days);
        let groups = tracker.list_at("c", &filter, &now()).unwrap();
        let days: Vec<_> = groups.iter().map(|g| g.date).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2026, 5, 10).unwrap(),
                NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
            ]
        );
    }

    #[test]
    fn test_yesterday_returns_only_yesterday() {
        let sink = Arc::new(MemorySink::default());
        for hour in [9, 12, 23] {
            sink.push_at(EventType::BlockCreated, local(9, hour));
        }
        sink.push_at(EventType::BlockCreated, local(10, 1));
        sink.push_at(EventType::PromptAdded, local(10, 2));

        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default().with_range(DateRange::Yesterday);
        let groups = tracker.list_at("c", &filter, &now()).unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date, NaiveDate::from_ymd_opt(2026, 5, 9).unwrap());
        assert_eq!(groups[0].events.len(), 3);
        assert_eq!(groups[0].events[0].created_at, local(9, 23));
    }

    #[test]
    fn test_type_and_today_filter() {
        let sink = Arc::new(MemorySink::default());
        sink.push_at(EventType::BlockCreated, local(10, 8));
        sink.push_at(EventType::BlockDeleted, local(10, 9));
        sink.push_at(EventType::BlockCreated, local(9, 9));

        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default()
            .with_type(EventType::BlockCreated)
            .with_range(DateRange::Today);
        let groups = tracker.list_at("c", &filter, &now()).unwrap();

        let events: Vec<_> = groups.iter().flat_map(|g| g.events.iter()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::BlockCreated);
        assert_eq!(events[0].created_at, local(10, 8));
    }

    #[test]
    fn test_group_by_day_orders_newest_first() {
        let sink = Arc::new(MemorySink::default());
        sink.push_at(EventType::BlockCreated, local(8, 10));
        sink.push_at(EventType::BlockCreated, local(10, 7));
        sink.push_at(EventType::BlockCreated, local(8, 20));
        sink.push_at(EventType::BlockCreated, local(10, 9));

        let tracker = EventTracker::new(sink);
        let groups = tracker
            .list_at("c", &EventFilter::default(), &now())
            .unwrap();

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
        assert_eq!(groups[0].events[0].created_at, local(10, 9));
        assert_eq!(groups[1].events[0].created_at, local(8, 20));
        assert_eq!(groups[1].events[1].created_at, local(8, 10));
    }

    #[test]
    fn test_grouping_uses_caller_zone() {
        // 23:30 UTC on the 9th is already the 10th two hours east
        let late = Utc.with_ymd_and_hms(2026, 5, 9, 23, 30, 0).unwrap();
        let sink = Arc::new(MemorySink::default());
        sink.push_at(EventType::TimerStarted, late);

        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default().with_range(DateRange::Today);
        let groups = tracker.list_at("c", &filter, &now()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].date, NaiveDate::from_ymd_opt(2026, 5, 10).unwrap());
    }

    #[test]
    fn test_limit_applies() {
        let sink = Arc::new(MemorySink::default());
        for hour in 0..10 {
            sink.push_at(EventType::PromptCompleted, local(10, hour));
        }
        let tracker = EventTracker::new(sink);
        let filter = EventFilter::default().with_limit(4);
        let groups = tracker.list_at("c", &filter, &now()).unwrap();
        assert_eq!(groups[0].events.len(), 4);
        assert_eq!(groups[0].events[0].created_at, local(10, 9));
    }

    #[test]
    fn test_record_appends_event() {
        let sink = Arc::new(MemorySink::default());
        let tracker = EventTracker::new(sink.clone());

        let event = tracker
            .record(
                "c",
                "alice",
                EventType::BlockRenamed,
                "n1",
                serde_json::json!({"from": "Old", "to": "New"}),
            )
            .unwrap();

        assert!(event.id.starts_with("ev-"));
        let stored = sink.events.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].event_data["to"], "New");
    }
}
