use anyhow::Result;
use std::io::Write;

use crate::minutes::{played_minutes, MinutesReport};

/// Writes one CSV row per on-field interval.
pub fn write_minutes_csv<W: Write>(report: &MinutesReport, writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["match_id", "player_id", "minute_on", "minute_off", "played"])?;

    let mut rows = 0;
    for player in &report.players {
        for interval in &player.intervals {
            let minute_on = interval.minute_on.to_string();
            let minute_off = interval.minute_off.map(|m| m.to_string()).unwrap_or_default();
            let played = played_minutes(std::slice::from_ref(interval), report.at).to_string();
            wtr.write_record([
                report.match_id.as_str(),
                player.player_id.as_str(),
                minute_on.as_str(),
                minute_off.as_str(),
                played.as_str(),
            ])?;
            rows += 1;
        }
    }

    wtr.flush()?;
    Ok(rows)
}
