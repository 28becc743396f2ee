use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskdeck-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKDECK_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Where a due date sits relative to
/// "now". Overdue wins over today.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DueStatus {
  None,
  Overdue,
  Today,
  Tomorrow,
  Upcoming
}

impl DueStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      | DueStatus::None => "none",
      | DueStatus::Overdue => "overdue",
      | DueStatus::Today => "today",
      | DueStatus::Tomorrow => {
        "tomorrow"
      }
      | DueStatus::Upcoming => {
        "upcoming"
      }
    }
  }
}

pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

#[must_use]
pub fn is_overdue(
  due: Option<DateTime<Utc>>,
  now: DateTime<Utc>
) -> bool {
  due.map(|due| due < now)
    .unwrap_or(false)
}

#[must_use]
pub fn due_date_status(
  due: Option<DateTime<Utc>>,
  now: DateTime<Utc>
) -> DueStatus {
  let Some(due) = due else {
    return DueStatus::None;
  };

  if due < now {
    return DueStatus::Overdue;
  }

  let today = to_project_date(now);
  let due_day = to_project_date(due);
  if due_day == today {
    DueStatus::Today
  } else if today.succ_opt()
    == Some(due_day)
  {
    DueStatus::Tomorrow
  } else {
    DueStatus::Upcoming
  }
}

/// Human label for a deadline:
/// "Today at 3:00 PM", "Mar 4, 2026 at
/// 9:30 AM".
#[must_use]
pub fn format_due_date(
  due: DateTime<Utc>,
  now: DateTime<Utc>
) -> String {
  let local =
    due.with_timezone(project_timezone());
  let clock = local
    .format("%-I:%M %p")
    .to_string();
  let today = to_project_date(now);
  let day = local.date_naive();

  if day == today {
    format!("Today at {clock}")
  } else if today.succ_opt()
    == Some(day)
  {
    format!("Tomorrow at {clock}")
  } else if today.pred_opt()
    == Some(day)
  {
    format!("Yesterday at {clock}")
  } else {
    local
      .format("%b %-d, %Y at %-I:%M %p")
      .to_string()
  }
}

#[must_use]
pub fn relative_time(
  ts: DateTime<Utc>,
  now: DateTime<Utc>
) -> String {
  let delta = ts - now;
  let future = delta > Duration::zero();
  let span = if future {
    delta
  } else {
    -delta
  };

  let minutes = span.num_minutes();
  let hours = span.num_hours();
  let days = span.num_days();

  let phrase = if minutes < 1 {
    "less than a minute".to_string()
  } else if minutes < 60 {
    plural(minutes, "minute")
  } else if hours < 24 {
    format!(
      "about {}",
      plural(hours, "hour")
    )
  } else if days < 30 {
    plural(days, "day")
  } else if days < 365 {
    plural(days / 30, "month")
  } else {
    format!(
      "about {}",
      plural(days / 365, "year")
    )
  };

  if future {
    format!("in {phrase}")
  } else {
    format!("{phrase} ago")
  }
}

fn plural(
  n: i64,
  unit: &str
) -> String {
  if n == 1 {
    format!("1 {unit}")
  } else {
    format!("{n} {unit}s")
  }
}

fn resolve_project_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no project timezone configured; \
     using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

fn to_utc_from_project_local(
  local_naive: NaiveDateTime,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  match project_timezone()
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::warn!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      Err(anyhow!(
        "local datetime does not \
         exist in configured \
         timezone: {context}"
      ))
    }
  }
}

fn local_midnight(
  date: NaiveDate,
  context: &str
) -> anyhow::Result<DateTime<Utc>> {
  let midnight = date
    .and_hms_opt(0, 0, 0)
    .ok_or_else(|| {
      anyhow!(
        "failed to construct \
         midnight for {context}"
      )
    })?;
  to_utc_from_project_local(
    midnight, context
  )
}

#[tracing::instrument(skip(now), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  now: DateTime<Utc>
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = to_project_date(now);

  match lower.as_str() {
    | "now" => return Ok(now),
    | "today" => {
      return local_midnight(
        today, "today"
      );
    }
    | "tomorrow" => {
      return Ok(
        local_midnight(today, "today")?
          + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        local_midnight(today, "today")?
          - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    let target_date = next_weekday_date(
      today,
      target_weekday
    );
    return local_midnight(
      target_date,
      "weekday-name"
    );
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[wdhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let duration = match unit {
      | "w" => Duration::try_weeks(num),
      | "d" => Duration::try_days(num),
      | "h" => Duration::try_hours(num),
      | "m" => {
        Duration::try_minutes(num)
      }
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    }
    .ok_or_else(|| {
      anyhow!(
        "relative offset out of \
         range: {token}"
      )
    })?;

    let shifted = if sign == "-" {
      now.checked_sub_signed(duration)
    } else {
      now.checked_add_signed(duration)
    };
    return shifted.ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    });
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(dt.with_timezone(&Utc));
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return local_midnight(date, "date");
  }

  for fmt in [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return to_utc_from_project_local(
        ndt, fmt
      );
    }
  }

  Err(anyhow!(
    "unrecognized date expression: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     weekday names (e.g. monday), \
     +Nw/+Nd/+Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  from
    .checked_add_signed(Duration::days(
      delta
    ))
    .unwrap_or(from)
}
