use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use reqwest::{Client, Url};

use crate::{
    core::deadline::{CalendarEvent, Frequency, Recurrence},
    prelude::*,
};

/// iCalendar feed over HTTP.
pub struct Api {
    client: Client,
}

impl Api {
    pub fn try_new() -> Result<Self> {
        Ok(Self { client: super::client::try_new()? })
    }

    #[instrument(skip_all, fields(host = url.host_str()))]
    pub async fn get_events(&self, url: Url) -> Result<Vec<CalendarEvent>> {
        info!("fetching…");
        let text = self
            .client
            .get(url)
            .send()
            .await
            .context("failed to request the calendar")?
            .error_for_status()
            .context("calendar request failed")?
            .text()
            .await
            .context("failed to read the calendar")?;
        let events = parse(&text);
        info!(n_events = events.len(), "fetched");
        Ok(events)
    }
}

/// Parse the `VEVENT`s, skipping those without a usable start.
///
/// Daily and weekly recurrence rules are kept for the expansion, other rules are dropped,
/// so that only the first occurrence counts.
pub fn parse(text: &str) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut current: Option<PendingEvent> = None;

    for line in unfold(text) {
        let Some((name, params, value)) = split_property(&line) else {
            continue;
        };
        let Some(event) = &mut current else {
            if name == "BEGIN" && value == "VEVENT" {
                current = Some(PendingEvent::default());
            }
            continue;
        };
        match name {
            "BEGIN" => {
                event.n_nested += 1;
            }
            "END" if event.n_nested != 0 => {
                event.n_nested -= 1;
            }
            "END" if value == "VEVENT" => {
                events.extend(current.take().and_then(PendingEvent::finish));
            }
            // Properties of a nested component such as `VALARM`:
            _ if event.n_nested != 0 => {}
            "DTSTART" => match parse_start(params, value) {
                Ok(start) => event.start = Some(start),
                Err(error) => warn!(value, "failed to parse the start: {error:#}"),
            },
            "SUMMARY" => {
                event.summary = unescape(value);
            }
            "RRULE" => {
                event.rule = Some(value.to_string());
            }
            "EXDATE" => {
                for value in value.split(',') {
                    match parse_start(params, value) {
                        Ok((exception, _)) => event.exceptions.push(exception),
                        Err(error) => warn!(value, "failed to parse the exception: {error:#}"),
                    }
                }
            }
            _ => {}
        }
    }

    events
}

/// `VEVENT` being read.
#[derive(Default)]
struct PendingEvent {
    start: Option<(DateTime<Utc>, Tz)>,
    summary: String,
    rule: Option<String>,
    exceptions: Vec<DateTime<Utc>>,

    /// Depth of the components nested into the event.
    n_nested: usize,
}

impl PendingEvent {
    fn finish(self) -> Option<CalendarEvent> {
        let Some((start, time_zone)) = self.start else {
            warn!(summary = %self.summary, "skipping the event without a start");
            return None;
        };
        let recurrence = self.rule.as_deref().and_then(|rule| {
            parse_rule(rule, time_zone)
                .inspect_err(|error| warn!(rule, "dropping the recurrence: {error:#}"))
                .ok()
        });
        Some(
            CalendarEvent::builder()
                .start(start)
                .summary(self.summary)
                .time_zone(time_zone)
                .maybe_recurrence(recurrence)
                .exceptions(self.exceptions)
                .build(),
        )
    }
}

/// Join the folded lines: a line starting with a space or a tab continues the previous one.
fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        match (line.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(last)) => last.push_str(continuation),
            _ => lines.push(line.to_string()),
        }
    }
    lines
}

/// Split `NAME;PARAM=…:VALUE` into the name, the parameters and the value.
fn split_property(line: &str) -> Option<(&str, &str, &str)> {
    let (head, value) = line.split_once(':')?;
    let (name, params) = head.split_once(';').unwrap_or((head, ""));
    Some((name, params, value))
}

/// Parse the start and the zone in which it is specified, UTC when there is none.
fn parse_start(params: &str, value: &str) -> Result<(DateTime<Utc>, Tz)> {
    let time_zone = match params.split(';').find_map(|param| param.strip_prefix("TZID=")) {
        Some(tzid) => tzid
            .trim_matches('"')
            .parse()
            .map_err(|error| anyhow!("unknown time zone `{tzid}`: {error}"))?,
        None => Tz::UTC,
    };
    Ok((parse_time(value, time_zone)?, time_zone))
}

/// Parse a date, a UTC date-time, or a local date-time in the specified zone.
///
/// A date means its midnight.
fn parse_time(value: &str, time_zone: Tz) -> Result<DateTime<Utc>> {
    if let Some(utc) = value.strip_suffix('Z') {
        return Ok(parse_naive(utc)?.and_utc());
    }
    let naive = if value.len() == 8 {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .with_context(|| format!("invalid date `{value}`"))?
            .and_time(NaiveTime::MIN)
    } else {
        parse_naive(value)?
    };
    time_zone
        .from_local_datetime(&naive)
        .earliest()
        .map(|time| time.with_timezone(&Utc))
        .with_context(|| format!("`{naive}` does not exist in `{time_zone}`"))
}

/// Parse the daily or weekly `RRULE` value.
fn parse_rule(rule: &str, time_zone: Tz) -> Result<Recurrence> {
    let mut frequency = None;
    let mut interval = 1;
    let mut count = None;
    let mut until = None;
    let mut by_day = Vec::new();

    for part in rule.split(';') {
        let (key, value) =
            part.split_once('=').with_context(|| format!("malformed rule part `{part}`"))?;
        match key {
            "FREQ" => {
                frequency = Some(match value {
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    _ => bail!("unsupported frequency `{value}`"),
                });
            }
            "INTERVAL" => {
                interval = value.parse().with_context(|| format!("invalid interval `{value}`"))?;
            }
            "COUNT" => {
                count = Some(value.parse().with_context(|| format!("invalid count `{value}`"))?);
            }
            "UNTIL" => {
                until = Some(parse_time(value, time_zone)?);
            }
            "BYDAY" => {
                by_day = value.split(',').map(parse_weekday).collect::<Result<_>>()?;
            }
            // Only matters for the intervals over the weeks starting on other days than Monday.
            "WKST" => {}
            _ => bail!("unsupported rule part `{key}`"),
        }
    }

    ensure!(interval != 0, "zero interval");
    Ok(Recurrence {
        frequency: frequency.context("no frequency")?,
        interval,
        count,
        until,
        by_day,
    })
}

fn parse_weekday(code: &str) -> Result<Weekday> {
    match code {
        "MO" => Ok(Weekday::Mon),
        "TU" => Ok(Weekday::Tue),
        "WE" => Ok(Weekday::Wed),
        "TH" => Ok(Weekday::Thu),
        "FR" => Ok(Weekday::Fri),
        "SA" => Ok(Weekday::Sat),
        "SU" => Ok(Weekday::Sun),
        _ => bail!("unsupported weekday `{code}`"),
    }
}

fn parse_naive(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .with_context(|| format!("invalid date-time `{value}`"))
}

fn unescape(value: &str) -> String {
    value
        .replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALENDAR: &str = "BEGIN:VCALENDAR\r
VERSION:2.0\r
BEGIN:VEVENT\r
DTSTART:20220207T060000Z\r
SUMMARY:Airport [T]\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART;TZID=Europe/Copenhagen:20220207T060000\r
SUMMARY:Meeting in Aarhus\\, bring the\r
  slides [T]\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART;VALUE=DATE:20220209\r
SUMMARY:Birthday\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20220210T080000\r
SUMMARY:Floating\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:garbage\r
SUMMARY:Broken\r
END:VEVENT\r
END:VCALENDAR\r
";

    #[test]
    fn test_parse() {
        let events = parse(CALENDAR);
        assert_eq!(events.len(), 4);

        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2022, 2, 7, 6, 0, 0).unwrap());
        assert_eq!(events[0].summary, "Airport [T]");

        assert_eq!(events[1].start, Utc.with_ymd_and_hms(2022, 2, 7, 5, 0, 0).unwrap());
        assert_eq!(events[1].summary, "Meeting in Aarhus, bring the slides [T]");

        assert_eq!(events[2].start, Utc.with_ymd_and_hms(2022, 2, 9, 0, 0, 0).unwrap());
        assert_eq!(events[3].start, Utc.with_ymd_and_hms(2022, 2, 10, 8, 0, 0).unwrap());
    }

    #[test]
    fn test_summer_time() -> Result {
        let (start, time_zone) = parse_start("TZID=Europe/Copenhagen", "20220701T060000")?;
        assert_eq!(start, Utc.with_ymd_and_hms(2022, 7, 1, 4, 0, 0).unwrap());
        assert_eq!(time_zone, chrono_tz::Europe::Copenhagen);
        Ok(())
    }

    #[test]
    fn test_alarm_does_not_override_the_event() {
        let events = parse(
            "BEGIN:VEVENT\r
DTSTART:20220207T060000Z\r
SUMMARY:Airport [T]\r
BEGIN:VALARM\r
ACTION:DISPLAY\r
SUMMARY:Reminder\r
TRIGGER:-PT30M\r
END:VALARM\r
END:VEVENT\r
",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].summary, "Airport [T]");
    }

    #[test]
    fn test_recurrence() -> Result {
        let events = parse(
            "BEGIN:VEVENT\r
DTSTART;TZID=Europe/Copenhagen:20220131T070000\r
RRULE:FREQ=WEEKLY;INTERVAL=1;BYDAY=MO,TH;UNTIL=20220301T000000Z\r
EXDATE;TZID=Europe/Copenhagen:20220207T070000,20220210T070000\r
SUMMARY:Office [T]\r
END:VEVENT\r
BEGIN:VEVENT\r
DTSTART:20220131T070000Z\r
RRULE:FREQ=MONTHLY;BYMONTHDAY=31\r
SUMMARY:Monthly\r
END:VEVENT\r
",
        );
        assert_eq!(events.len(), 2);

        let office = &events[0];
        assert_eq!(office.time_zone, chrono_tz::Europe::Copenhagen);
        assert_eq!(
            office.recurrence,
            Some(Recurrence {
                frequency: Frequency::Weekly,
                interval: 1,
                count: None,
                until: Some(Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap()),
                by_day: vec![Weekday::Mon, Weekday::Thu],
            }),
        );
        let from = Utc.with_ymd_and_hms(2022, 2, 7, 0, 0, 0).unwrap();
        let occurrences = office.occurrences(from, from + chrono::TimeDelta::days(8));
        assert_eq!(
            occurrences,
            [Utc.with_ymd_and_hms(2022, 2, 14, 6, 0, 0).unwrap()],
            "the exceptions are skipped",
        );

        assert_eq!(events[1].summary, "Monthly");
        assert_eq!(events[1].recurrence, None);
        Ok(())
    }

    #[test]
    fn test_parse_rule() -> Result {
        let rule = parse_rule("FREQ=DAILY;COUNT=5;INTERVAL=2", Tz::UTC)?;
        assert_eq!(rule.frequency, Frequency::Daily);
        assert_eq!(rule.interval, 2);
        assert_eq!(rule.count, Some(5));

        assert!(parse_rule("FREQ=YEARLY", Tz::UTC).is_err());
        assert!(parse_rule("FREQ=WEEKLY;BYDAY=1MO", Tz::UTC).is_err());
        assert!(parse_rule("FREQ=DAILY;INTERVAL=0", Tz::UTC).is_err());
        assert!(parse_rule("COUNT=3", Tz::UTC).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_time_zone() {
        assert!(parse_start("TZID=Mars/Olympus", "20220701T060000").is_err());
    }
}
