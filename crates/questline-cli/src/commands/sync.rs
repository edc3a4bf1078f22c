//! Remote synchronization commands.
//!
//! Delivery state lives in the journal, so every command persists what the
//! coordinator reports before returning.

use questline_core::DrainReport;

use crate::common::{block_on, print_json, CliResult, Session};

/// Show per-event sync state.
pub fn status(user: Option<String>, json: bool) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let events = session.engine.sync_status(&user_id);
    if json {
        return print_json(&events);
    }

    let summary = session.engine.sync_summary(&user_id);
    println!(
        "{} pending, {} failed, {} in flight",
        summary.pending_count, summary.failed_count, summary.in_flight_count
    );
    for event in events {
        let retry = if event.retryable { " (retryable)" } else { "" };
        println!(
            "  {} {:<20} {:<9} attempts={}{retry}",
            event.event_id,
            event.kind.as_str(),
            event.state.as_str(),
            event.attempts
        );
        if let Some(error) = &event.last_error {
            println!("      {error}");
        }
    }
    Ok(())
}

/// Drain the user's queue, or every user's with `all`.
pub fn sync(user: Option<String>, all: bool, prune: bool) -> CliResult {
    let session = Session::open()?;
    let reports = if all {
        block_on(session.engine.sync_all())?
    } else {
        let user_id = session.user(user)?;
        let report = block_on(session.engine.sync_user(&user_id))?;
        vec![(user_id, report)]
    };

    for (user_id, report) in &reports {
        session.persist_sync_state(user_id)?;
        print_report(user_id, report);
        if prune {
            let pruned = session.engine.prune_acknowledged(user_id);
            println!("  pruned {pruned} acknowledged event(s)");
        }
    }
    Ok(())
}

/// Re-arm a failed event and drain again.
pub fn retry(user: Option<String>, event_id: &str) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let report = block_on(session.engine.retry(&user_id, event_id))??;
    session.persist_sync_state(&user_id)?;
    print_report(&user_id, &report);
    Ok(())
}

/// Give up on a failed event. Its points stay in the snapshot.
pub fn discard(user: Option<String>, event_id: &str) -> CliResult {
    let session = Session::open()?;
    let user_id = session.user(user)?;
    let event = session.engine.discard(&user_id, event_id)?;
    session.db.mark_discarded(&event.id)?;
    println!("Discarded {} ({})", event.id, event.kind());
    Ok(())
}

fn print_report(user_id: &str, report: &DrainReport) {
    println!("{user_id}: {} acknowledged", report.acknowledged.len());
    for error in &report.failed {
        println!("  failed: {error}");
    }
    if let Some(blocked) = &report.blocked_by {
        println!("  blocked by {blocked}; retry or discard it to continue");
    }
    if report.cancelled {
        println!("  cancelled");
    }
}
