//! Daily reminder tick for calendar events.
//!
//! Once a day at 09:00 local time the scheduler collects tomorrow's events
//! that have not been alerted, emits a reminder for each, and marks them sent
//! so a restart does not re-alert.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::FromRow;
use std::time::Duration;

use crate::database::Database;

const ALERT_HOUR: u32 = 9;

#[derive(Debug, FromRow)]
struct UpcomingEvent {
    id: i32,
    title: String,
    event_date: NaiveDate,
    user_name: String,
    user_email: String,
}

pub fn spawn_alert_scheduler(db: Database) {
    tokio::spawn(async move {
        log::info!("alert scheduler initialized (runs daily at {:02}:00)", ALERT_HOUR);
        loop {
            let delay = delay_until_next_run(Local::now().naive_local());
            tokio::time::sleep(delay).await;

            match process_alerts(&db).await {
                Ok(0) => log::debug!("no event reminders due"),
                Ok(sent) => log::info!("sent {} event reminders", sent),
                Err(err) => log::error!("alert run failed: {}", err),
            }
        }
    });
}

/// Alert every unalerted event scheduled for tomorrow, then mark it sent.
/// Each event is marked individually so a failure partway through does not
/// re-alert the ones already handled.
pub async fn process_alerts(db: &Database) -> Result<u64, sqlx::Error> {
    let today = Local::now().date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);

    let events: Vec<UpcomingEvent> = sqlx::query_as(
        "SELECT ce.id, ce.title, ce.event_date, u.name AS user_name, u.email AS user_email
         FROM calendar_events ce
         JOIN users u ON u.id = ce.user_id
         WHERE ce.event_date = $1
           AND ce.alert_sent = FALSE
           AND ce.is_deleted = FALSE
           AND ce.status != 'completed'",
    )
    .bind(tomorrow)
    .fetch_all(db)
    .await?;

    let mut sent = 0;
    for event in events {
        log::info!(
            "event reminder for {} <{}>: \"{}\" on {} (event {})",
            event.user_name,
            event.user_email,
            event.title,
            event.event_date,
            event.id,
        );

        sqlx::query(
            "UPDATE calendar_events SET alert_sent = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(event.id)
        .execute(db)
        .await?;

        sent += 1;
    }

    Ok(sent)
}

fn delay_until_next_run(now: NaiveDateTime) -> Duration {
    let run_time = NaiveTime::from_hms_opt(ALERT_HOUR, 0, 0).unwrap_or_default();

    let target = if now.time() < run_time {
        now.date().and_time(run_time)
    } else {
        let tomorrow = now.date().succ_opt().unwrap_or(now.date());
        tomorrow.and_time(run_time)
    };

    (target - now).to_std().unwrap_or(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn before_nine_waits_until_today_nine() {
        let delay = delay_until_next_run(at(2024, 6, 1, 7, 0));
        assert_eq!(delay, Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn after_nine_waits_until_tomorrow_nine() {
        let delay = delay_until_next_run(at(2024, 6, 1, 10, 0));
        assert_eq!(delay, Duration::from_secs(23 * 60 * 60));
    }

    #[test]
    fn exactly_nine_schedules_the_next_day() {
        let delay = delay_until_next_run(at(2024, 6, 1, 9, 0));
        assert_eq!(delay, Duration::from_secs(24 * 60 * 60));
    }
}
