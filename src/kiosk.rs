//! The persistent scan loop behind `ptl-kiosk run`.
//!
//! Lines come from any buffered async reader (stdin in production). Each line
//! is one scan. After a scan the station schedules a delayed re-fetch, and an
//! idle poll keeps the snapshot fresh while nobody is scanning.

use std::fmt::Write as _;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::{
    client::WmsApi,
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    models::KitMergeType,
    reconciliation::{PtlStation, ScanOutcome, StationSettings},
    services::{KitMergeService, PtlService},
};

#[derive(Debug, Clone)]
pub struct KioskSettings {
    pub refetch_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            refetch_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl KioskSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            refetch_delay: config.refetch_delay(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KioskSummary {
    pub scans: usize,
    pub updates: usize,
    pub refetches: usize,
}

/// Builds a station for `gate` with the batch filter and limits from config.
/// `kind` overrides the configured kit-merge type.
pub fn station_from_config(
    api: Arc<dyn WmsApi>,
    events: EventSender,
    config: &AppConfig,
    gate: impl Into<String>,
    kind: Option<KitMergeType>,
) -> PtlStation {
    let kit_merges = KitMergeService::new(api.clone())
        .with_filter(kind.unwrap_or(config.kit_type), config.kit_status)
        .with_page_limit(config.kit_merge_page_limit);

    PtlStation::with_services(
        kit_merges,
        PtlService::new(api),
        events,
        StationSettings::from_config(config, gate),
    )
}

/// Runs the scan loop until the input closes or `shutdown` resolves.
///
/// Remote failures are reported through the station's events and never end
/// the loop. Only a broken input or output stream does.
#[instrument(skip_all, fields(gate = %station.gate()))]
pub async fn run<R, W, S>(
    station: &mut PtlStation,
    input: R,
    output: &mut W,
    settings: &KioskSettings,
    shutdown: S,
) -> Result<KioskSummary, ServiceError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut summary = KioskSummary::default();
    let mut lines = input.lines();
    let mut refetch_at: Option<Instant> = None;

    let mut poll = interval_at(Instant::now() + settings.poll_interval, settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    refetch(station).await;
    render(station, output)?;
    info!("kiosk ready");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("scanner input closed");
                    break;
                };

                summary.scans += 1;

                let outcome = station.on_scan(&line).await;
                if matches!(outcome, ScanOutcome::Updated(_)) {
                    summary.updates += 1;
                }
                // only a scan that asks for a re-fetch moves the pending deadline
                if outcome.requests_refetch() {
                    refetch_at = Some(Instant::now() + settings.refetch_delay);
                }
                if outcome != ScanOutcome::Discarded {
                    render(station, output)?;
                }
            }
            _ = deadline(refetch_at) => {
                refetch_at = None;
                summary.refetches += 1;
                refetch(station).await;
                render(station, output)?;
            }
            _ = poll.tick() => {
                if station.kit_merge().is_none() || station.is_stale(Instant::now()) {
                    debug!("idle poll re-fetching snapshot");
                    summary.refetches += 1;
                    refetch(station).await;
                    render(station, output)?;
                }
            }
        }
    }

    info!(
        scans = summary.scans,
        updates = summary.updates,
        refetches = summary.refetches,
        "kiosk stopped"
    );
    Ok(summary)
}

async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Refreshes the snapshot, then fetches the mission detail when the batch
/// has none yet. The mission panel is optional, so its failure only logs.
async fn refetch(station: &mut PtlStation) {
    if station.refresh().await.is_err() {
        return;
    }

    if station.kit_merge().is_some() && station.mission().is_none() {
        if let Err(err) = station.load_mission_detail().await {
            warn!(error = %err, "mission detail unavailable");
        }
    }
}

fn render<W: Write>(station: &PtlStation, output: &mut W) -> Result<(), ServiceError> {
    output.write_all(render_station(station).as_bytes())?;
    output.flush()?;
    Ok(())
}

/// Text rendition of the station: header, current material panel and the
/// displayed slots.
pub fn render_station(station: &PtlStation) -> String {
    let mut out = String::new();

    let Some(merge) = station.kit_merge() else {
        let _ = writeln!(out, "[{}] waiting for a kit merge", station.gate());
        return out;
    };

    let _ = writeln!(
        out,
        "[{}] kit merge {} ({}) kits: {}",
        station.gate(),
        merge.id,
        merge.kind,
        merge.kit_no.join(", ")
    );

    let Some(material) = station.material_filter() else {
        let _ = writeln!(out, "  scan a material code");
        return out;
    };

    let progress = station.progress();
    let _ = writeln!(
        out,
        "  material {}: {}/{} picked, {}/{} slots done",
        material,
        progress.picked_qty,
        progress.required_qty,
        progress.fulfilled_slots,
        progress.slots
    );

    for inventory in station.current_material_inventory() {
        let _ = writeln!(
            out,
            "  stock {} at {}",
            inventory.quantity,
            inventory.location.as_deref().unwrap_or("-")
        );
    }

    for record in station.visible_records() {
        let _ = writeln!(
            out,
            "  #{:<6} {:<10} {:>4}/{:<4} {}{}",
            record.id,
            record.issue_ord_no,
            record.picked_qty,
            record.ptl_qty,
            record.station.as_deref().unwrap_or("-"),
            if record.is_fulfilled() { "  done" } else { "" }
        );
    }

    out
}
