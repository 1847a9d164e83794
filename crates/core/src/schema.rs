//! Series-schema to RRULE mapping
//!
//! Bidirectional mapping between the upstream's `seriesSchema` tagged union
//! and RFC 5545 recurrence rules. The `arrhythmic` variant has no RRULE
//! representation, so the outbound direction returns `None` for it.

use chrono::{Datelike, NaiveDate};

use crate::error::{GatewayError, GatewayResult};
use crate::model::{
    DailyRegularity, MonthlyRegularity, SeriesSchema, Weekday, WeeklySchema, YearlyRegularity,
};

/// Synthesize an RRULE value from a series schema
///
/// Returns `None` for arrhythmic series. BYDAY lists are emitted in MO..SU
/// order; `INTERVAL` is omitted when it is 1.
pub fn schema_to_rrule(schema: &SeriesSchema) -> Option<String> {
    match schema {
        SeriesSchema::Daily {
            data: DailyRegularity::AllBusinessDays,
        } => Some("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR".to_string()),
        SeriesSchema::Daily {
            data: DailyRegularity::Interval { days_interval },
        } => {
            if *days_interval == 1 {
                Some("FREQ=DAILY".to_string())
            } else {
                Some(format!("FREQ=DAILY;INTERVAL={days_interval}"))
            }
        }
        SeriesSchema::Weekly { data } => {
            let mut days = data.weekdays.clone();
            days.sort();
            days.dedup();
            let byday = days
                .iter()
                .map(|d| d.byday())
                .collect::<Vec<_>>()
                .join(",");
            if data.weeks_interval == 1 {
                Some(format!("FREQ=WEEKLY;BYDAY={byday}"))
            } else {
                Some(format!(
                    "FREQ=WEEKLY;INTERVAL={};BYDAY={byday}",
                    data.weeks_interval
                ))
            }
        }
        SeriesSchema::Monthly {
            data:
                MonthlyRegularity::SpecificDate {
                    day_of_month,
                    months_interval,
                },
        } => {
            if *months_interval == 1 {
                Some(format!("FREQ=MONTHLY;BYMONTHDAY={day_of_month}"))
            } else {
                Some(format!(
                    "FREQ=MONTHLY;INTERVAL={months_interval};BYMONTHDAY={day_of_month}"
                ))
            }
        }
        SeriesSchema::Monthly {
            data:
                MonthlyRegularity::SpecificDay {
                    weekday,
                    week_number,
                    months_interval,
                },
        } => {
            let byday = format!("{week_number}{}", weekday.byday());
            if *months_interval == 1 {
                Some(format!("FREQ=MONTHLY;BYDAY={byday}"))
            } else {
                Some(format!(
                    "FREQ=MONTHLY;INTERVAL={months_interval};BYDAY={byday}"
                ))
            }
        }
        SeriesSchema::Yearly {
            data:
                YearlyRegularity::SpecificDate {
                    month_of_year,
                    day_of_month,
                },
        } => Some(format!(
            "FREQ=YEARLY;BYMONTH={month_of_year};BYMONTHDAY={day_of_month}"
        )),
        SeriesSchema::Yearly {
            data:
                YearlyRegularity::SpecificDay {
                    month_of_year,
                    weekday,
                    week_number,
                },
        } => Some(format!(
            "FREQ=YEARLY;BYMONTH={month_of_year};BYDAY={week_number}{}",
            weekday.byday()
        )),
        SeriesSchema::Arrhythmic => None,
    }
}

/// Parsed key/value parts of an RRULE property value
#[derive(Debug, Default)]
pub(crate) struct RuleParts {
    pub freq: String,
    pub interval: u32,
    pub byday: Vec<String>,
    pub bymonthday: Option<u32>,
    pub bymonth: Option<u32>,
    pub until: Option<String>,
}

impl RuleParts {
    pub fn parse(rrule: &str) -> GatewayResult<Self> {
        let mut parts = RuleParts {
            interval: 1,
            ..Default::default()
        };

        for part in rrule.split(';').filter(|p| !p.is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| GatewayError::InvalidRecurrenceRule(rrule.to_string()))?;
            match name.to_ascii_uppercase().as_str() {
                "FREQ" => parts.freq = value.to_ascii_uppercase(),
                "INTERVAL" => {
                    parts.interval = value
                        .parse()
                        .map_err(|_| GatewayError::InvalidRecurrenceRule(rrule.to_string()))?;
                }
                "BYDAY" => {
                    parts.byday = value.split(',').map(|d| d.to_ascii_uppercase()).collect();
                }
                "BYMONTHDAY" => parts.bymonthday = value.parse().ok(),
                "BYMONTH" => parts.bymonth = value.parse().ok(),
                "UNTIL" => parts.until = Some(value.to_string()),
                // COUNT, WKST and the rest do not map onto the upstream model
                _ => {}
            }
        }

        if parts.freq.is_empty() {
            return Err(GatewayError::InvalidRecurrenceRule(rrule.to_string()));
        }
        Ok(parts)
    }
}

/// Split a BYDAY entry like "3FR" into (week number, weekday)
fn split_byday_entry(entry: &str) -> (u32, Option<Weekday>) {
    let digits: String = entry.chars().take_while(|c| c.is_ascii_digit()).collect();
    let week = digits.parse().unwrap_or(1);
    let token = &entry[digits.len()..];
    (week, Weekday::from_byday(token))
}

fn is_business_day_set(byday: &[String]) -> bool {
    byday.len() == 5
        && Weekday::BUSINESS_DAYS
            .iter()
            .all(|d| byday.iter().any(|b| b == d.byday()))
}

/// Map an RRULE value back onto the upstream series-schema model
///
/// `start` supplies fallbacks where the rule is underspecified: a WEEKLY rule
/// without BYDAY recurs on the start weekday, a MONTHLY rule without
/// BYMONTHDAY/BYDAY on the start day-of-month, and so on. A Monday-to-Friday
/// day set is detected and mapped to the allBusinessDays regularity in both
/// its DAILY and WEEKLY spellings.
pub fn rrule_to_schema(rrule: &str, start: NaiveDate) -> GatewayResult<SeriesSchema> {
    let parts = RuleParts::parse(rrule)?;

    match parts.freq.as_str() {
        "DAILY" => {
            if is_business_day_set(&parts.byday) {
                Ok(SeriesSchema::Daily {
                    data: DailyRegularity::AllBusinessDays,
                })
            } else {
                Ok(SeriesSchema::Daily {
                    data: DailyRegularity::Interval {
                        days_interval: parts.interval,
                    },
                })
            }
        }
        "WEEKLY" => {
            if parts.interval == 1 && is_business_day_set(&parts.byday) {
                return Ok(SeriesSchema::Daily {
                    data: DailyRegularity::AllBusinessDays,
                });
            }
            let mut weekdays: Vec<Weekday> = parts
                .byday
                .iter()
                .filter_map(|entry| split_byday_entry(entry).1)
                .collect();
            if weekdays.is_empty() {
                weekdays.push(chrono_weekday(start));
            }
            weekdays.sort();
            weekdays.dedup();
            Ok(SeriesSchema::Weekly {
                data: WeeklySchema {
                    weekdays,
                    weeks_interval: parts.interval,
                },
            })
        }
        "MONTHLY" => {
            if let Some(first) = parts.byday.first() {
                let (week_number, weekday) = split_byday_entry(first);
                let weekday = weekday
                    .ok_or_else(|| GatewayError::InvalidRecurrenceRule(rrule.to_string()))?;
                Ok(SeriesSchema::Monthly {
                    data: MonthlyRegularity::SpecificDay {
                        weekday,
                        week_number,
                        months_interval: parts.interval,
                    },
                })
            } else {
                Ok(SeriesSchema::Monthly {
                    data: MonthlyRegularity::SpecificDate {
                        day_of_month: parts.bymonthday.unwrap_or(start.day()),
                        months_interval: parts.interval,
                    },
                })
            }
        }
        "YEARLY" => {
            let month_of_year = parts.bymonth.unwrap_or(start.month());
            if let Some(first) = parts.byday.first() {
                let (week_number, weekday) = split_byday_entry(first);
                let weekday = weekday
                    .ok_or_else(|| GatewayError::InvalidRecurrenceRule(rrule.to_string()))?;
                Ok(SeriesSchema::Yearly {
                    data: YearlyRegularity::SpecificDay {
                        month_of_year,
                        weekday,
                        week_number,
                    },
                })
            } else {
                Ok(SeriesSchema::Yearly {
                    data: YearlyRegularity::SpecificDate {
                        month_of_year,
                        day_of_month: parts.bymonthday.unwrap_or(start.day()),
                    },
                })
            }
        }
        other => Err(GatewayError::InvalidRecurrenceRule(format!(
            "unsupported FREQ: {other}"
        ))),
    }
}

fn chrono_weekday(date: NaiveDate) -> Weekday {
    match date.weekday() {
        chrono::Weekday::Mon => Weekday::Monday,
        chrono::Weekday::Tue => Weekday::Tuesday,
        chrono::Weekday::Wed => Weekday::Wednesday,
        chrono::Weekday::Thu => Weekday::Thursday,
        chrono::Weekday::Fri => Weekday::Friday,
        chrono::Weekday::Sat => Weekday::Saturday,
        chrono::Weekday::Sun => Weekday::Sunday,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        // a Tuesday
        NaiveDate::from_ymd_opt(2026, 1, 13).unwrap()
    }

    #[test]
    fn test_schema_to_rrule_business_days() {
        let schema = SeriesSchema::Daily {
            data: DailyRegularity::AllBusinessDays,
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"
        );
    }

    #[test]
    fn test_schema_to_rrule_daily_interval() {
        let schema = SeriesSchema::Daily {
            data: DailyRegularity::Interval { days_interval: 1 },
        };
        assert_eq!(schema_to_rrule(&schema).unwrap(), "FREQ=DAILY");

        let schema = SeriesSchema::Daily {
            data: DailyRegularity::Interval { days_interval: 3 },
        };
        assert_eq!(schema_to_rrule(&schema).unwrap(), "FREQ=DAILY;INTERVAL=3");
    }

    #[test]
    fn test_schema_to_rrule_weekly_sorted_byday() {
        let schema = SeriesSchema::Weekly {
            data: WeeklySchema {
                weekdays: vec![Weekday::Friday, Weekday::Monday, Weekday::Wednesday],
                weeks_interval: 1,
            },
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=WEEKLY;BYDAY=MO,WE,FR"
        );
    }

    #[test]
    fn test_schema_to_rrule_weekly_with_interval() {
        let schema = SeriesSchema::Weekly {
            data: WeeklySchema {
                weekdays: vec![Weekday::Tuesday],
                weeks_interval: 2,
            },
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=WEEKLY;INTERVAL=2;BYDAY=TU"
        );
    }

    #[test]
    fn test_schema_to_rrule_monthly() {
        let schema = SeriesSchema::Monthly {
            data: MonthlyRegularity::SpecificDate {
                day_of_month: 15,
                months_interval: 1,
            },
        };
        assert_eq!(schema_to_rrule(&schema).unwrap(), "FREQ=MONTHLY;BYMONTHDAY=15");

        let schema = SeriesSchema::Monthly {
            data: MonthlyRegularity::SpecificDay {
                weekday: Weekday::Friday,
                week_number: 3,
                months_interval: 2,
            },
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=MONTHLY;INTERVAL=2;BYDAY=3FR"
        );
    }

    #[test]
    fn test_schema_to_rrule_yearly() {
        let schema = SeriesSchema::Yearly {
            data: YearlyRegularity::SpecificDate {
                month_of_year: 12,
                day_of_month: 25,
            },
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=YEARLY;BYMONTH=12;BYMONTHDAY=25"
        );

        let schema = SeriesSchema::Yearly {
            data: YearlyRegularity::SpecificDay {
                month_of_year: 6,
                weekday: Weekday::Monday,
                week_number: 1,
            },
        };
        assert_eq!(
            schema_to_rrule(&schema).unwrap(),
            "FREQ=YEARLY;BYMONTH=6;BYDAY=1MO"
        );
    }

    #[test]
    fn test_schema_to_rrule_arrhythmic_has_none() {
        assert_eq!(schema_to_rrule(&SeriesSchema::Arrhythmic), None);
    }

    #[test]
    fn test_rrule_to_schema_business_days_daily_spelling() {
        let schema = rrule_to_schema("FREQ=DAILY;BYDAY=MO,TU,WE,TH,FR", start()).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Daily {
                data: DailyRegularity::AllBusinessDays
            }
        );
    }

    #[test]
    fn test_rrule_to_schema_business_days_weekly_spelling() {
        let schema = rrule_to_schema("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR", start()).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Daily {
                data: DailyRegularity::AllBusinessDays
            }
        );
    }

    #[test]
    fn test_rrule_to_schema_weekly_keeps_interval() {
        let schema = rrule_to_schema("FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,TU,WE,TH,FR", start()).unwrap();
        match schema {
            SeriesSchema::Weekly { data } => {
                assert_eq!(data.weeks_interval, 2);
                assert_eq!(data.weekdays.len(), 5);
            }
            other => panic!("expected weekly, got {other:?}"),
        }
    }

    #[test]
    fn test_rrule_to_schema_weekly_without_byday_uses_start_weekday() {
        let schema = rrule_to_schema("FREQ=WEEKLY", start()).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Weekly {
                data: WeeklySchema {
                    weekdays: vec![Weekday::Tuesday],
                    weeks_interval: 1,
                }
            }
        );
    }

    #[test]
    fn test_rrule_to_schema_monthly_fallback_day() {
        let schema = rrule_to_schema("FREQ=MONTHLY", start()).unwrap();
        assert_eq!(
            schema,
            SeriesSchema::Monthly {
                data: MonthlyRegularity::SpecificDate {
                    day_of_month: 13,
                    months_interval: 1,
                }
            }
        );
    }

    #[test]
    fn test_rrule_to_schema_rejects_garbage() {
        assert!(rrule_to_schema("NOT-A-RULE", start()).is_err());
        assert!(rrule_to_schema("FREQ=SECONDLY", start()).is_err());
    }

    #[test]
    fn test_roundtrip_through_rrule() {
        let cases = vec![
            SeriesSchema::Daily {
                data: DailyRegularity::AllBusinessDays,
            },
            SeriesSchema::Daily {
                data: DailyRegularity::Interval { days_interval: 2 },
            },
            SeriesSchema::Weekly {
                data: WeeklySchema {
                    weekdays: vec![Weekday::Monday, Weekday::Thursday],
                    weeks_interval: 3,
                },
            },
            SeriesSchema::Monthly {
                data: MonthlyRegularity::SpecificDate {
                    day_of_month: 13,
                    months_interval: 1,
                },
            },
            SeriesSchema::Monthly {
                data: MonthlyRegularity::SpecificDay {
                    weekday: Weekday::Friday,
                    week_number: 2,
                    months_interval: 6,
                },
            },
            SeriesSchema::Yearly {
                data: YearlyRegularity::SpecificDate {
                    month_of_year: 1,
                    day_of_month: 13,
                },
            },
            SeriesSchema::Yearly {
                data: YearlyRegularity::SpecificDay {
                    month_of_year: 6,
                    weekday: Weekday::Monday,
                    week_number: 1,
                },
            },
        ];

        for schema in cases {
            let rrule = schema_to_rrule(&schema).unwrap();
            let back = rrule_to_schema(&rrule, start()).unwrap();
            assert_eq!(back, schema, "roundtrip failed for {rrule}");
        }
    }
}
