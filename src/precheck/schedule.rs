/*!
 * Dose Schedule Expansion
 * Turns 5-field intake cron expressions into concrete doses
 */

use super::types::{PrecheckError, ScheduledDose};
use crate::orders::Intake;
use chrono::{DateTime, Duration, TimeZone};
use cron::Schedule;
use std::str::FromStr;

/// Start of `now`'s day in `now`'s zone
///
/// Zones that skip midnight on a transition day start at the first hour that
/// exists.
pub fn midnight_of<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let zone = now.timezone();
    let day = now.date_naive();
    (0..24)
        .filter_map(|hour| day.and_hms_opt(hour, 0, 0))
        .find_map(|naive| zone.from_local_datetime(&naive).earliest())
        .unwrap_or_else(|| now.clone())
}

/// Parse a 5-field (minute-resolution) cron expression
///
/// The parser expects a seconds field and numbers weekdays 1-7 from Sunday,
/// so the expression is prefixed with `0` and its weekday field shifted.
pub fn parse_intake_cron(expression: &str) -> Result<Schedule, PrecheckError> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(PrecheckError::unrecoverable(format!(
            "invalid intake cron '{}': expected 5 fields, found {}",
            expression,
            fields.len()
        )));
    }

    let weekdays = shift_weekdays(fields[4]);
    let normalised = format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], weekdays
    );
    Schedule::from_str(&normalised).map_err(|e| {
        PrecheckError::unrecoverable(format!("invalid intake cron '{}': {}", expression, e))
    })
}

/// Map weekday numbers 0-7 (Sunday = 0 or 7) onto 1-7 (Sunday = 1)
fn shift_weekdays(field: &str) -> String {
    fn shift(n: &str) -> Option<u32> {
        n.parse::<u32>().ok().filter(|n| *n <= 7).map(|n| n % 7 + 1)
    }

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let shifted = match range.split_once('-') {
                // A range ending on Sunday wraps; split it into two pieces
                Some((lo, "7")) => match shift(lo) {
                    Some(lo) if step.is_none() => return format!("{}-7,1", lo),
                    _ => range.to_string(),
                },
                Some((lo, hi)) => match (shift(lo), shift(hi)) {
                    (Some(lo), Some(hi)) => format!("{}-{}", lo, hi),
                    _ => range.to_string(),
                },
                None => shift(range).map_or_else(|| range.to_string(), |n| n.to_string()),
            };
            match step {
                Some(step) => format!("{}/{}", shifted, step),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand every intake from `start` (inclusive), merge, sort and keep the
/// first `max_doses` entries
///
/// Each entry carries `dosage × dose`, or the bare dosage when the drug has
/// no product dose.
pub fn expand_schedule<Tz: TimeZone>(
    intakes: &[Intake],
    dose: Option<f64>,
    unit: Option<&str>,
    start: &DateTime<Tz>,
    max_doses: usize,
) -> Result<Vec<ScheduledDose>, PrecheckError> {
    let from = start.clone() - Duration::seconds(1);
    let mut doses = Vec::new();

    for intake in intakes {
        let schedule = parse_intake_cron(&intake.cron)?;
        let amount = dose.map_or(intake.dosage, |d| d * intake.dosage);
        doses.extend(schedule.after(&from).take(max_doses).map(|at| ScheduledDose {
            at: at.fixed_offset(),
            amount,
            unit: unit.map(str::to_string),
        }));
    }

    doses.sort_by(|a, b| a.at.cmp(&b.at));
    doses.truncate(max_doses);
    Ok(doses)
}
