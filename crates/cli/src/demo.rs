//! Simulated viewer workload and the console's UI loop.
//!
//! Downloads go to the remote pool, DEM loads to the local pool and file
//! conversions to the console's own `convert` pool. Each job sleeps per item
//! instead of doing real I/O.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, warn};
use waymark_jobs::{
    JobError, JobHandle, JobList, JobSpec, PoolId, Scheduler, StatusSnapshot, UiLoop,
};

use crate::cli::DemoArgs;
use crate::terminal::Terminal;

/// Map tiles for one zoom level.
struct TileBatch {
    zoom: u8,
    fetched: Vec<u32>,
}

/// DEM files picked in the "load DEM" dialog.
struct DemLoad {
    files: Vec<PathBuf>,
    loaded: usize,
}

struct Conversion {
    source: String,
    target: String,
    written: u64,
}

fn download_job(index: usize, tiles: u32, delay: Duration) -> JobSpec<TileBatch> {
    let zoom = 10 + (index % 8) as u8;
    let batch = TileBatch {
        zoom,
        fetched: Vec::with_capacity(tiles as usize),
    };
    JobSpec::new(format!("Downloading tiles (zoom {})", zoom), batch, move |batch, ctx| {
        for tile in 0..tiles {
            thread::sleep(delay);
            batch.fetched.push(tile);
            ctx.report_progress(f64::from(tile + 1) / f64::from(tiles))?;
        }
        Ok(())
    })
    .with_items(tiles)
    .with_destructor(|batch| {
        debug!(zoom = batch.zoom, tiles = batch.fetched.len(), "Tile batch stored");
    })
    .with_cancel_cleanup(|batch| {
        info!(zoom = batch.zoom, partial = batch.fetched.len(), "Discarded partial tile batch");
    })
}

fn dem_job(index: usize, files: u32, delay: Duration) -> JobSpec<DemLoad> {
    let load = DemLoad {
        files: (0..files)
            .map(|n| PathBuf::from(format!("srtm/N{:02}E{:03}.hgt", 45 + index, n)))
            .collect(),
        loaded: 0,
    };
    let title = format!("DEM Loading ({} files)", files);
    JobSpec::new(title, load, move |load, ctx| {
        let total = load.files.len();
        for n in 0..total {
            ctx.poll_cancel()?;
            thread::sleep(delay);
            load.loaded += 1;
            ctx.report_progress((n + 1) as f64 / total as f64)?;
        }
        Ok(())
    })
    .with_items(files)
    .with_destructor(|load| {
        debug!(loaded = load.loaded, "DEM files loaded");
    })
    .with_cancel_cleanup(|load| {
        for path in load.files.iter().skip(load.loaded) {
            debug!(path = %path.display(), "Skipped DEM file");
        }
        info!(loaded = load.loaded, total = load.files.len(), "DEM loading cancelled");
    })
}

/// A conversion has no discrete items; it only reports percentage.
fn conversion_job(index: usize, delay: Duration) -> JobSpec<Conversion> {
    const CHUNKS: u64 = 5;
    let conversion = Conversion {
        source: format!("track-{}.gpx", index),
        target: format!("track-{}.kml", index),
        written: 0,
    };
    let title = format!("Converting {} to KML", conversion.source);
    JobSpec::new(title, conversion, move |conversion, ctx| {
        for chunk in 1..=CHUNKS {
            thread::sleep(delay);
            conversion.written += 4096;
            ctx.report_progress(chunk as f64 / CHUNKS as f64)?;
        }
        Ok(())
    })
    .with_destructor(|conversion| {
        debug!(output = %conversion.target, bytes = conversion.written, "Conversion written");
    })
    .with_cancel_cleanup(|conversion| {
        info!(output = %conversion.target, "Removed incomplete conversion output");
    })
}

/// Submit the whole workload. Handles come back in submission order.
pub fn submit_workload(
    scheduler: &Scheduler,
    convert: PoolId,
    args: &DemoArgs,
) -> Result<Vec<JobHandle>, JobError> {
    let delay = Duration::from_millis(args.item_ms);
    let mut handles = Vec::new();

    for i in 0..args.downloads {
        handles.push(scheduler.submit(PoolId::REMOTE, download_job(i, args.tiles, delay))?);
    }
    for i in 0..args.dem_loads {
        handles.push(scheduler.submit(PoolId::LOCAL, dem_job(i, args.dem_files, delay))?);
    }
    for i in 0..args.conversions {
        handles.push(scheduler.submit(convert, conversion_job(i, delay))?);
    }
    Ok(handles)
}

/// What one rendered frame showed; redraw only when it changes.
#[derive(Debug, PartialEq)]
struct Frame {
    rows: Vec<(u64, u32)>,
    outstanding: i64,
}

impl Frame {
    fn capture(list: &JobList, status: &StatusSnapshot) -> Self {
        Self {
            rows: list
                .rows()
                .map(|row| (row.id.get(), row.progress.round() as u32))
                .collect(),
            outstanding: status.outstanding,
        }
    }
}

/// Console stand-in for the viewer's UI thread.
pub struct Console<'a> {
    scheduler: &'a Scheduler,
    ui: UiLoop,
    terminal: &'a Terminal,
    status: Arc<Mutex<StatusSnapshot>>,
    tick: Duration,
}

impl<'a> Console<'a> {
    /// Take over the UI loop and subscribe to status updates.
    pub fn new(scheduler: &'a Scheduler, ui: UiLoop, terminal: &'a Terminal, tick: Duration) -> Self {
        let status = Arc::new(Mutex::new(scheduler.status()));
        let sink = Arc::clone(&status);
        scheduler.register_observer(Arc::new(move |snapshot: &StatusSnapshot| {
            *sink.lock().unwrap_or_else(PoisonError::into_inner) = *snapshot;
        }));
        Self {
            scheduler,
            ui,
            terminal,
            status,
            tick,
        }
    }

    fn status(&self) -> StatusSnapshot {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drain and render until every job is gone or `args.timeout_ms` passes,
    /// applying the requested cancellations along the way. Returns whether
    /// all jobs finished in time.
    pub fn run(&mut self, handles: &[JobHandle], args: &DemoArgs) -> Result<bool> {
        let started = Instant::now();
        let timeout = Duration::from_millis(args.timeout_ms);
        let mut clear_all_at = args.clear_all_after.map(Duration::from_millis);
        let mut pending_cancels = args.cancel.clone();
        let mut last_frame: Option<Frame> = None;

        loop {
            let finished = self.scheduler.active_jobs() == 0;
            self.ui.drain();

            if !pending_cancels.is_empty() {
                pending_cancels = self.apply_cancels(handles, pending_cancels)?;
            }
            if clear_all_at.is_some_and(|at| started.elapsed() >= at) {
                let cancelled = self.scheduler.request_cancel_all();
                self.terminal
                    .print_info(&format!("Clear all: {} jobs cancelled", cancelled))?;
                clear_all_at = None;
                self.ui.drain();
            }

            let status = self.status();
            let frame = Frame::capture(self.ui.list(), &status);
            if last_frame.as_ref() != Some(&frame) {
                self.terminal.render_jobs(self.ui.list(), &status)?;
                last_frame = Some(frame);
            }

            if finished {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                warn!(
                    active = self.scheduler.active_jobs(),
                    "Timed out waiting for background jobs"
                );
                return Ok(false);
            }
            thread::sleep(self.tick);
        }
    }

    /// Cancel the requested jobs whose rows are visible. Returns the ids
    /// still waiting for their row.
    fn apply_cancels(&self, handles: &[JobHandle], pending: Vec<u64>) -> Result<Vec<u64>> {
        let mut waiting = Vec::new();
        for id in pending {
            match handles.iter().find(|h| h.id().get() == id) {
                None => self.terminal.print_error(&format!("no job with id #{}", id))?,
                Some(handle) if self.ui.list().contains(handle.id()) => {
                    if self.scheduler.request_cancel(handle) {
                        self.terminal
                            .print_info(&format!("Cancelled {} {}", handle.id(), handle.title()))?;
                    }
                }
                Some(handle) if !handle.is_attached() => {
                    debug!(job = %handle.id(), "Job already gone, nothing to cancel");
                }
                Some(_) => waiting.push(id),
            }
        }
        Ok(waiting)
    }

    /// Apply whatever the workers queued after the last frame.
    pub fn flush(&mut self) -> usize {
        self.ui.drain()
    }
}
