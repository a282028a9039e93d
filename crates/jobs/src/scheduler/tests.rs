#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::config::PoolConfig;
    use crate::error::JobError;
    use crate::job::{Cancelled, JobContext, JobSpec};
    use crate::pool::{PoolId, PoolRegistry};
    use crate::scheduler::Scheduler;
    use crate::status::{StatusObserver, StatusSnapshot};
    use crate::ui::{ui_channel, UiLoop};

    const TICK: Duration = Duration::from_millis(2);
    const WAIT: Duration = Duration::from_secs(5);

    type Events = Sender<&'static str>;

    fn config(remote: usize, local: usize) -> PoolConfig {
        PoolConfig {
            max_threads: remote,
            max_threads_local: local,
        }
    }

    fn start(config: PoolConfig) -> (Scheduler, UiLoop) {
        let table = PoolRegistry::new().finalize(&config).unwrap();
        let (sender, ui) = ui_channel();
        (Scheduler::start(table, sender), ui)
    }

    /// A job whose data is an event sender; both release paths report which
    /// one ran.
    fn tracked<F>(title: &str, events: &Events, work: F) -> JobSpec<Events>
    where
        F: FnOnce(&mut Events, &mut JobContext) -> Result<(), Cancelled> + Send + 'static,
    {
        JobSpec::new(title, events.clone(), work)
            .with_destructor(|events| {
                let _ = events.send("destructor");
            })
            .with_cancel_cleanup(|events| {
                let _ = events.send("cleanup");
            })
    }

    /// A job that announces it started and then blocks until `gate` fires,
    /// never polling for cancellation.
    fn gated(title: &str, events: &Events, gate: Receiver<()>) -> JobSpec<Events> {
        tracked(title, events, move |events, _ctx| {
            let _ = events.send("started");
            let _ = gate.recv();
            Ok(())
        })
    }

    /// A job that polls until it is told to stop.
    fn polling(title: &str, events: &Events) -> JobSpec<Events> {
        tracked(title, events, |events, ctx| {
            let _ = events.send("started");
            loop {
                ctx.poll_cancel()?;
                thread::sleep(TICK);
            }
        })
    }

    fn expect(events: &Receiver<&'static str>, want: &str) {
        assert_eq!(events.recv_timeout(WAIT).unwrap(), want);
    }

    /// Drive the UI loop until every job has been torn down.
    fn settle(scheduler: &Scheduler, ui: &mut UiLoop) {
        assert!(ui.run_until(TICK, WAIT, |_| scheduler.active_jobs() == 0));
        ui.drain();
    }

    fn recording_observer() -> (Arc<Mutex<Vec<String>>>, Arc<dyn StatusObserver>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer: Arc<dyn StatusObserver> = Arc::new(move |status: &StatusSnapshot| {
            sink.lock().unwrap().push(status.to_string());
        });
        (seen, observer)
    }

    #[test]
    fn scheduler_creation() {
        let (scheduler, ui) = start(config(3, 2));
        assert_eq!(scheduler.pool_count(), 2);
        assert_eq!(scheduler.pool_ids(), vec![PoolId::REMOTE, PoolId::LOCAL]);
        assert_eq!(scheduler.pool_threads(PoolId::REMOTE), Some(3));
        assert_eq!(scheduler.pool_threads(PoolId::LOCAL), Some(2));
        assert_eq!(scheduler.pool_name(PoolId::LOCAL).as_deref(), Some("local"));
        assert_eq!(scheduler.status().outstanding, 0);
        assert!(!scheduler.is_shut_down());
        assert!(ui.list().is_empty());
    }

    #[test]
    fn all_items_reported_leaves_nothing_outstanding() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();

        let spec = tracked("DEM Loading", &tx, |_, ctx| {
            for i in 1..=5 {
                ctx.report_progress(f64::from(i) / 5.0)?;
            }
            Ok(())
        })
        .with_items(5);
        let job = scheduler.submit(PoolId::LOCAL, spec).unwrap();

        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);

        assert_eq!(scheduler.status().outstanding, 0);
        assert!(!ui.list().contains(job.id()));
        let local = scheduler.metrics().pool("local").cloned().unwrap();
        assert_eq!(local.submitted, 1);
        assert_eq!(local.completed, 1);
        assert_eq!(local.in_flight(), 0);
    }

    #[test]
    fn counter_tracks_remaining_items_of_live_jobs() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate_a, wait_a) = mpsc::channel();
        let (gate_b, wait_b) = mpsc::channel::<()>();

        let first = tracked("Download DEM", &tx, move |events, ctx| {
            ctx.report_progress(0.25)?;
            let _ = events.send("started");
            let _ = wait_a.recv();
            Ok(())
        })
        .with_items(4);
        let first = scheduler.submit(PoolId::REMOTE, first).unwrap();
        scheduler
            .submit(PoolId::REMOTE, gated("Download tiles", &tx, wait_b).with_items(2))
            .unwrap();

        expect(&rx, "started");
        expect(&rx, "started");
        assert_eq!(scheduler.status().outstanding, 3 + 2);

        ui.drain();
        assert_eq!(ui.list().len(), 2);
        assert_eq!(ui.list().get(first.id()).unwrap().progress, 25.0);

        gate_a.send(()).unwrap();
        gate_b.send(()).unwrap();
        expect(&rx, "destructor");
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);

        assert_eq!(scheduler.status().outstanding, 0);
        assert!(ui.list().is_empty());
    }

    #[test]
    fn observers_see_status_changes() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (seen, observer) = recording_observer();
        let observer_id = scheduler.register_observer(observer);
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        scheduler
            .submit(PoolId::REMOTE, gated("Download", &tx, wait).with_items(3))
            .unwrap();
        expect(&rx, "started");
        ui.drain();
        assert_eq!(seen.lock().unwrap().last().unwrap(), "3 items");

        gate.send(()).unwrap();
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);
        assert_eq!(seen.lock().unwrap().last().unwrap(), "0 items");

        assert!(scheduler.unregister_observer(observer_id));
    }

    #[test]
    fn cancel_from_jobs_window_before_job_starts() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        // Occupy the single local worker so the victim stays queued.
        let (blocker_tx, blocker_rx) = mpsc::channel();
        scheduler
            .submit(PoolId::LOCAL, gated("Blocker", &blocker_tx, wait))
            .unwrap();
        expect(&blocker_rx, "started");

        let victim = tracked("DEM Loading", &tx, |events, ctx| {
            let first_poll = ctx.poll_cancel();
            let _ = events.send(if first_poll.is_err() { "poll-cancelled" } else { "poll-ok" });
            first_poll?;
            ctx.report_progress(1.0)
        })
        .with_items(1);
        let victim = scheduler.submit(PoolId::LOCAL, victim).unwrap();

        ui.drain();
        assert!(ui.list().contains(victim.id()));
        assert!(ui.list_mut().cancel(victim.id()));
        assert!(!ui.list().contains(victim.id()));
        assert!(victim.is_cancel_requested());

        gate.send(()).unwrap();
        expect(&rx, "poll-cancelled");
        expect(&rx, "cleanup");
        expect(&blocker_rx, "destructor");
        settle(&scheduler, &mut ui);

        assert!(rx.try_recv().is_err(), "destructor must not run");
        assert_eq!(scheduler.status().outstanding, 0);
        assert!(ui.list().is_empty());
        let local = scheduler.metrics().pool("local").cloned().unwrap();
        assert_eq!(local.cancelled, 1);
        assert_eq!(local.completed, 1);
    }

    #[test]
    fn cancelled_job_row_is_never_shown() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        let (blocker_tx, blocker_rx) = mpsc::channel();
        scheduler
            .submit(PoolId::LOCAL, gated("Blocker", &blocker_tx, wait))
            .unwrap();
        expect(&blocker_rx, "started");

        let victim = scheduler
            .submit(PoolId::LOCAL, polling("Convert", &tx).with_items(2))
            .unwrap();
        assert!(scheduler.request_cancel(&victim));
        assert!(!scheduler.request_cancel(&victim));

        // Row creation and removal are both applied; the row never appears.
        ui.drain();
        assert!(!ui.list().contains(victim.id()));

        gate.send(()).unwrap();
        expect(&rx, "started");
        expect(&rx, "cleanup");
        settle(&scheduler, &mut ui);

        assert!(!ui.list().contains(victim.id()));
        assert_eq!(scheduler.status().outstanding, 0);
    }

    #[test]
    fn registered_pool_bounds_concurrency() {
        let mut registry = PoolRegistry::new();
        let convert = registry.register_pool("convert", || 2);
        let table = registry.finalize(&config(2, 1)).unwrap();
        let (sender, mut ui) = ui_channel();
        let scheduler = Scheduler::start(table, sender);
        assert_eq!(scheduler.pool_threads(convert), Some(2));

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for i in 0..5 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let spec = JobSpec::new(format!("Convert {}", i), (), move |_, _ctx| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            });
            scheduler.submit(convert, spec).unwrap();
        }

        settle(&scheduler, &mut ui);
        let peak = peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {}", peak);
        assert_eq!(scheduler.metrics().pool("convert").unwrap().completed, 5);
    }

    #[test]
    fn pools_are_isolated() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (gate, wait) = mpsc::channel();
        let (local_tx, local_rx) = mpsc::channel();
        let (remote_tx, remote_rx) = mpsc::channel();

        scheduler
            .submit(PoolId::LOCAL, gated("Busy", &local_tx, wait))
            .unwrap();
        expect(&local_rx, "started");

        // The local pool is saturated; remote work still runs.
        scheduler
            .submit(PoolId::REMOTE, tracked("Download", &remote_tx, |_, _| Ok(())))
            .unwrap();
        expect(&remote_rx, "destructor");

        gate.send(()).unwrap();
        expect(&local_rx, "destructor");
        settle(&scheduler, &mut ui);
    }

    #[test]
    fn shutdown_does_not_wait_for_running_jobs() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        scheduler
            .submit(PoolId::REMOTE, gated("Slow download", &tx, wait).with_items(1))
            .unwrap();
        expect(&rx, "started");

        let begun = Instant::now();
        scheduler.shutdown();
        assert!(begun.elapsed() < Duration::from_secs(1));
        assert!(scheduler.is_shut_down());
        assert_eq!(scheduler.pool_count(), 0);

        let late = scheduler.submit(PoolId::REMOTE, tracked("Late", &tx, |_, _| Ok(())));
        assert!(matches!(late, Err(JobError::ShutDown)));

        // The job never polled, so it finishes normally on its own time.
        gate.send(()).unwrap();
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);

        assert!(ui.list().is_empty());
        assert_eq!(scheduler.status().outstanding, 0);
    }

    #[test]
    fn polling_job_stops_on_shutdown() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();

        scheduler
            .submit(PoolId::LOCAL, polling("Convert", &tx).with_items(3))
            .unwrap();
        expect(&rx, "started");

        scheduler.shutdown();
        expect(&rx, "cleanup");
        settle(&scheduler, &mut ui);
        assert_eq!(scheduler.status().outstanding, 0);
    }

    #[test]
    fn job_that_never_polls_completes_despite_cancel() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        let job = scheduler
            .submit(PoolId::REMOTE, gated("Download", &tx, wait))
            .unwrap();
        expect(&rx, "started");
        assert!(scheduler.request_cancel(&job));

        gate.send(()).unwrap();
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);

        let remote = scheduler.metrics().pool("remote").cloned().unwrap();
        assert_eq!(remote.completed, 1);
        assert_eq!(remote.cancelled, 0);
    }

    #[test]
    fn late_progress_after_row_removal_is_harmless() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel::<()>();

        let spec = tracked("DEM Loading", &tx, move |events, ctx| {
            let _ = events.send("started");
            let _ = wait.recv();
            let late = ctx.report_progress(0.5);
            let _ = events.send(if late.is_err() { "late-cancelled" } else { "late-ok" });
            late
        })
        .with_items(2);
        let job = scheduler.submit(PoolId::LOCAL, spec).unwrap();
        expect(&rx, "started");

        ui.drain();
        assert!(ui.list_mut().cancel(job.id()));

        gate.send(()).unwrap();
        expect(&rx, "late-cancelled");
        expect(&rx, "cleanup");
        settle(&scheduler, &mut ui);

        assert!(!ui.list().contains(job.id()));
        assert_eq!(scheduler.status().outstanding, 0);
    }

    #[test]
    fn clear_all_from_jobs_window() {
        let (scheduler, mut ui) = start(config(3, 1));
        let (tx, rx) = mpsc::channel();

        for _ in 0..3 {
            scheduler
                .submit(PoolId::REMOTE, polling("Download", &tx).with_items(1))
                .unwrap();
        }
        for _ in 0..3 {
            expect(&rx, "started");
        }

        ui.drain();
        assert_eq!(ui.list_mut().clear_all(), 3);
        for _ in 0..3 {
            expect(&rx, "cleanup");
        }
        settle(&scheduler, &mut ui);

        assert!(ui.list().is_empty());
        assert_eq!(scheduler.metrics().pool("remote").unwrap().cancelled, 3);
    }

    #[test]
    fn request_cancel_all_stops_every_job() {
        let (scheduler, mut ui) = start(config(3, 1));
        let (tx, rx) = mpsc::channel();

        for _ in 0..3 {
            scheduler
                .submit(PoolId::REMOTE, polling("Download", &tx))
                .unwrap();
        }
        for _ in 0..3 {
            expect(&rx, "started");
        }

        assert_eq!(scheduler.request_cancel_all(), 3);
        for _ in 0..3 {
            expect(&rx, "cleanup");
        }
        settle(&scheduler, &mut ui);

        assert_eq!(scheduler.request_cancel_all(), 0);
        assert!(ui.list().is_empty());
        assert_eq!(scheduler.metrics().pool("remote").unwrap().cancelled, 3);
    }

    #[test]
    fn panicking_job_is_contained() {
        let (scheduler, mut ui) = start(config(1, 1));
        let (tx, rx) = mpsc::channel();

        let broken = tracked("Broken DEM", &tx, |_, _| panic!("corrupt header")).with_items(4);
        scheduler.submit(PoolId::REMOTE, broken).unwrap();
        expect(&rx, "destructor");

        // The single remote worker survives and keeps serving jobs.
        scheduler
            .submit(PoolId::REMOTE, tracked("Download", &tx, |_, _| Ok(())))
            .unwrap();
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);

        assert_eq!(scheduler.status().outstanding, 0);
        let remote = scheduler.metrics().pool("remote").cloned().unwrap();
        assert_eq!(remote.panicked, 1);
        assert_eq!(remote.completed, 1);
    }

    #[test]
    fn submit_to_unknown_pool_fails() {
        let (scheduler, mut ui) = start(config(2, 1));
        let spec = JobSpec::new("Orphan", (), |_, _| Ok(())).with_items(3);

        let result = scheduler.submit(PoolId(99), spec);
        assert!(matches!(result, Err(JobError::UnknownPool(id)) if id == PoolId(99)));
        assert_eq!(scheduler.status().outstanding, 0);
        assert_eq!(ui.drain(), 0);
    }

    #[test]
    fn over_reporting_does_not_borrow_other_jobs_items() {
        let (scheduler, mut ui) = start(config(2, 1));
        let (tx, rx) = mpsc::channel();
        let (gate, wait) = mpsc::channel();

        scheduler
            .submit(PoolId::LOCAL, gated("Waiting", &tx, wait).with_items(3))
            .unwrap();
        expect(&rx, "started");

        let (remaining_tx, remaining_rx) = mpsc::channel();
        let chatty = JobSpec::new("Chatty", (), move |_, ctx| {
            for i in 1..=5 {
                ctx.report_progress(f64::from(i) / 2.0)?;
            }
            let _ = remaining_tx.send(ctx.remaining_items());
            Ok(())
        })
        .with_items(2);
        scheduler.submit(PoolId::REMOTE, chatty).unwrap();
        assert_eq!(remaining_rx.recv_timeout(WAIT).unwrap(), 0);

        assert!(ui.run_until(TICK, WAIT, |_| scheduler.active_jobs() == 1));
        assert_eq!(scheduler.status().outstanding, 3);

        gate.send(()).unwrap();
        expect(&rx, "destructor");
        settle(&scheduler, &mut ui);
        assert_eq!(scheduler.status().outstanding, 0);
    }
}
