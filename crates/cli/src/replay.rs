use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use ccm_sip_event_core::logging::sanitize;
use ccm_sip_event_core::prelude::*;
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Counters collected while replaying
#[derive(Debug, Default)]
pub struct ReplayStats {
    pub processed: usize,
    pub malformed: usize,
    pub call_changes: usize,
    pub codec_changes: usize,
    pub by_status: BTreeMap<String, usize>,
}

/// Handle every event line from `reader`, writing one JSON result per line.
///
/// Blank lines and lines starting with `#` are skipped. Lines that are not a
/// valid event are logged and counted, never fatal.
pub async fn replay<R, W>(manager: &SipEventManager, reader: R, out: &mut W) -> Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: SipEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed event on line {}: {}", line_number, sanitize(&e.to_string()));
                stats.malformed += 1;
                continue;
            }
        };

        let result = manager.handle(event).await;
        stats.processed += 1;
        let status = result.change_status();
        if status.is_call_change() {
            stats.call_changes += 1;
        } else if status.is_codec_change() {
            stats.codec_changes += 1;
        }
        *stats.by_status.entry(format!("{:?}", status)).or_default() += 1;

        serde_json::to_writer(&mut *out, &result)?;
        writeln!(out)?;
    }

    out.flush()?;
    Ok(stats)
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Change status")]
    status: String,
    #[tabled(rename = "Events")]
    count: usize,
}

#[derive(Tabled)]
struct OngoingRow {
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Started")]
    started: String,
    #[tabled(rename = "State")]
    state: String,
}

/// Render counts, ongoing calls and archive size
pub async fn summary(stats: &ReplayStats, stores: &InMemoryStores, show_numbers: bool) -> Result<String> {
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Replay summary".bold()));
    let rows: Vec<StatusRow> = stats
        .by_status
        .iter()
        .map(|(status, count)| StatusRow {
            status: status.clone(),
            count: *count,
        })
        .collect();
    out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
    out.push('\n');

    let malformed = format!("{} malformed lines skipped", stats.malformed);
    if stats.malformed > 0 {
        out.push_str(&format!("{}\n", malformed.red()));
    } else {
        out.push_str(&format!("{}\n", malformed.dimmed()));
    }

    let ongoing = stores.calls.ongoing_calls(!show_numbers).await?;
    out.push_str(&format!("\n{} ({})\n", "Ongoing calls".bold(), ongoing.len()));
    if !ongoing.is_empty() {
        let rows: Vec<OngoingRow> = ongoing.iter().map(ongoing_row).collect();
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }

    out.push_str(&format!(
        "\nRegistrations: {}, archived calls: {}\n",
        stores.registrations.len(),
        stores.history.len()
    ));
    Ok(out)
}

fn ongoing_row(call: &OngoingCall) -> OngoingRow {
    let state = if !call.is_started {
        "progressing".yellow().to_string()
    } else if call.is_phone_call {
        "phone".cyan().to_string()
    } else {
        "started".green().to_string()
    };
    OngoingRow {
        from: party_label(&call.from),
        to: party_label(&call.to),
        started: call.started.format("%H:%M:%S").to_string(),
        state,
    }
}

fn party_label(party: &CallParty) -> String {
    if party.display_name.is_empty() || party.display_name == party.sip {
        party.sip.clone()
    } else {
        format!("{} <{}>", party.display_name, party.sip)
    }
}
