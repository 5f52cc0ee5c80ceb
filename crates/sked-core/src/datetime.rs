use chrono::{
  Datelike,
  Local,
  NaiveDate
};

pub const COMPACT_DATE_FORMAT: &str =
  "%Y%m%d";

#[derive(
  Debug, Clone, PartialEq, Eq, thiserror::Error,
)]
#[error(
  "expected an 8-digit YYYYMMDD \
   calendar date, got {value:?}"
)]
pub struct DateParseError {
  pub value: String
}

/// True iff `a` falls on a later
/// calendar day than `b`. Time of day
/// is never looked at.
#[must_use]
pub fn is_strictly_after<A, B>(
  a: &A,
  b: &B
) -> bool
where
  A: Datelike,
  B: Datelike
{
  (a.year(), a.month(), a.day())
    > (b.year(), b.month(), b.day())
}

pub fn parse_compact_date(
  text: &str
) -> Result<NaiveDate, DateParseError> {
  let well_formed = text.len() == 8
    && text
      .bytes()
      .all(|b| b.is_ascii_digit());
  if !well_formed {
    return Err(DateParseError {
      value: text.to_string()
    });
  }

  NaiveDate::parse_from_str(
    text,
    COMPACT_DATE_FORMAT
  )
  .map_err(|_| DateParseError {
    value: text.to_string()
  })
}

#[must_use]
pub fn format_compact_date(
  date: NaiveDate
) -> String {
  date
    .format(COMPACT_DATE_FORMAT)
    .to_string()
}

#[must_use]
pub fn today() -> NaiveDate {
  Local::now().date_naive()
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    format_compact_date,
    is_strictly_after,
    parse_compact_date
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn strictly_after_orders_by_year_month_day()
  {
    assert!(is_strictly_after(
      &ymd(2024, 1, 11),
      &ymd(2024, 1, 10)
    ));
    assert!(is_strictly_after(
      &ymd(2024, 2, 1),
      &ymd(2024, 1, 31)
    ));
    assert!(is_strictly_after(
      &ymd(2025, 1, 1),
      &ymd(2024, 12, 31)
    ));
    assert!(!is_strictly_after(
      &ymd(2023, 12, 31),
      &ymd(2024, 1, 1)
    ));
  }

  #[test]
  fn equal_dates_are_not_after() {
    let day = ymd(2024, 1, 10);
    assert!(!is_strictly_after(
      &day, &day
    ));
  }

  #[test]
  fn time_of_day_is_ignored() {
    let late = Utc
      .with_ymd_and_hms(
        2024, 1, 10, 23, 59, 59
      )
      .single()
      .expect("valid late");
    let early = Utc
      .with_ymd_and_hms(
        2024, 1, 10, 0, 0, 0
      )
      .single()
      .expect("valid early");
    assert!(!is_strictly_after(
      &late, &early
    ));
    assert!(!is_strictly_after(
      &late,
      &ymd(2024, 1, 10)
    ));
  }

  #[test]
  fn parses_and_formats_compact_dates()
  {
    let parsed =
      parse_compact_date("20240229")
        .expect("leap day");
    assert_eq!(parsed, ymd(2024, 2, 29));
    assert_eq!(
      format_compact_date(parsed),
      "20240229"
    );
  }

  #[test]
  fn rejects_malformed_compact_dates()
  {
    for bad in [
      "",
      "2024011",
      "202401011",
      "2024-01-01",
      "20231301",
      "20230229",
      "+2024011",
      "2024 101"
    ] {
      let err = parse_compact_date(bad)
        .expect_err(bad);
      assert_eq!(err.value, bad);
    }
  }
}
