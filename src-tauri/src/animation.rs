//! Intro animation scheduler.
//!
//! A frame-driven timer: every frame checks elapsed time since the scheduler
//! started and dispatches the one-shot cues whose offset has passed. It knows
//! nothing about the download lifecycle.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::logger;

/// Frame period of the cooperative loop (~60fps)
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub type CueCallback = Box<dyn FnMut() + Send>;

struct ScheduledCue {
    offset: Duration,
    callback: CueCallback,
}

/// Stops a scheduler from dispatching anything further
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct AnimationScheduler {
    /// Sorted by offset; entries before `next` have fired
    cues: Vec<ScheduledCue>,
    next: usize,
    started_at: Instant,
    cancel: CancelHandle,
}

impl AnimationScheduler {
    /// Build a scheduler whose clock starts now.
    ///
    /// Entries with equal offsets keep their given order.
    pub fn new(entries: Vec<(Duration, CueCallback)>) -> Self {
        let mut cues: Vec<ScheduledCue> = entries
            .into_iter()
            .map(|(offset, callback)| ScheduledCue { offset, callback })
            .collect();
        cues.sort_by_key(|cue| cue.offset);

        Self {
            cues,
            next: 0,
            started_at: Instant::now(),
            cancel: CancelHandle::default(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// All cues fired or the scheduler was cancelled
    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || self.next >= self.cues.len()
    }

    /// Dispatch cues due at the current time. Returns how many fired.
    pub fn poll(&mut self) -> usize {
        let elapsed = self.started_at.elapsed();
        self.poll_at(elapsed)
    }

    /// Dispatch every pending cue with `offset <= elapsed`, in order.
    ///
    /// Cancellation is re-checked before each dispatch, so a cancel issued
    /// from inside a callback stops the remaining cues of the same frame.
    pub fn poll_at(&mut self, elapsed: Duration) -> usize {
        let mut fired = 0;
        while let Some(cue) = self.cues.get_mut(self.next) {
            if self.cancel.is_cancelled() || cue.offset > elapsed {
                break;
            }
            self.next += 1;
            (cue.callback)();
            fired += 1;
        }
        fired
    }

    /// Drive the schedule with a frame ticker until every cue has fired or
    /// the handle is cancelled. The schedule is dropped on return.
    pub async fn run(mut self, frame: Duration) {
        let mut ticker = tokio::time::interval(frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.is_finished() {
            ticker.tick().await;
            self.poll();
        }

        if self.cancel.is_cancelled() {
            crate::log_debug!("Intro schedule cancelled", "animation");
        } else {
            logger::log_info("Intro animation finished", Some("animation"));
        }
    }
}

/// Visual beats of the intro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IntroCue {
    Logo,
    Title,
    Controls,
}

impl IntroCue {
    pub const ALL: [IntroCue; 3] = [IntroCue::Logo, IntroCue::Title, IntroCue::Controls];

    pub fn offset(self) -> Duration {
        match self {
            IntroCue::Logo => Duration::from_millis(100),
            IntroCue::Title => Duration::from_millis(1600),
            IntroCue::Controls => Duration::from_millis(2500),
        }
    }
}

/// The fixed intro timeline, reporting each cue to `on_cue`
pub fn intro_schedule<F>(on_cue: F) -> Vec<(Duration, CueCallback)>
where
    F: Fn(IntroCue) + Send + Sync + 'static,
{
    let on_cue = Arc::new(on_cue);
    IntroCue::ALL
        .iter()
        .map(|&cue| {
            let on_cue = Arc::clone(&on_cue);
            let callback: CueCallback = Box::new(move || on_cue(cue));
            (cue.offset(), callback)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recording(offsets: &[u64]) -> (Vec<(Duration, CueCallback)>, Arc<Mutex<Vec<u64>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let entries = offsets
            .iter()
            .map(|&ms| {
                let log = Arc::clone(&log);
                let callback: CueCallback = Box::new(move || log.lock().unwrap().push(ms));
                (Duration::from_millis(ms), callback)
            })
            .collect();
        (entries, log)
    }

    #[test]
    fn test_fires_each_cue_once_in_order() {
        let (entries, log) = recording(&[100, 1600, 2500]);
        let mut scheduler = AnimationScheduler::new(entries);

        assert_eq!(scheduler.poll_at(Duration::from_millis(50)), 0);
        assert_eq!(scheduler.poll_at(Duration::from_millis(100)), 1);
        assert_eq!(scheduler.poll_at(Duration::from_millis(1000)), 0);
        assert_eq!(scheduler.poll_at(Duration::from_millis(3000)), 2);
        assert_eq!(scheduler.poll_at(Duration::from_millis(9000)), 0);

        assert_eq!(*log.lock().unwrap(), vec![100, 1600, 2500]);
        assert!(scheduler.is_finished());
    }

    #[test]
    fn test_cancel_after_first_cue() {
        let (entries, log) = recording(&[100, 1600, 2500]);
        let mut scheduler = AnimationScheduler::new(entries);
        let handle = scheduler.cancel_handle();

        scheduler.poll_at(Duration::from_millis(200));
        handle.cancel();
        assert_eq!(scheduler.poll_at(Duration::from_millis(1600)), 0);
        assert_eq!(scheduler.poll_at(Duration::from_millis(5000)), 0);

        assert_eq!(*log.lock().unwrap(), vec![100]);
        assert!(scheduler.is_finished());
    }

    #[test]
    fn test_cancel_from_inside_callback_stops_same_frame() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle_slot: Arc<Mutex<Option<CancelHandle>>> = Arc::new(Mutex::new(None));

        let first_log = Arc::clone(&log);
        let slot = Arc::clone(&handle_slot);
        let first: CueCallback = Box::new(move || {
            first_log.lock().unwrap().push(1);
            if let Some(handle) = slot.lock().unwrap().as_ref() {
                handle.cancel();
            }
        });
        let second_log = Arc::clone(&log);
        let second: CueCallback = Box::new(move || second_log.lock().unwrap().push(2));

        let mut scheduler = AnimationScheduler::new(vec![
            (Duration::from_millis(10), first),
            (Duration::from_millis(20), second),
        ]);
        *handle_slot.lock().unwrap() = Some(scheduler.cancel_handle());

        assert_eq!(scheduler.poll_at(Duration::from_millis(100)), 1);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_unsorted_entries_fire_by_offset() {
        let (entries, log) = recording(&[2500, 100, 1600]);
        let mut scheduler = AnimationScheduler::new(entries);
        scheduler.poll_at(Duration::from_secs(10));
        assert_eq!(*log.lock().unwrap(), vec![100, 1600, 2500]);
    }

    #[test]
    fn test_empty_schedule_is_finished() {
        let scheduler = AnimationScheduler::new(Vec::new());
        assert!(scheduler.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_offsets() {
        let (entries, log) = recording(&[100, 1600, 2500]);
        let scheduler = AnimationScheduler::new(entries);
        let task = tokio::spawn(scheduler.run(FRAME_INTERVAL));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(*log.lock().unwrap(), vec![100]);

        task.await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![100, 1600, 2500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_cancelled() {
        let (entries, log) = recording(&[100, 1600, 2500]);
        let scheduler = AnimationScheduler::new(entries);
        let handle = scheduler.cancel_handle();
        let task = tokio::spawn(scheduler.run(FRAME_INTERVAL));

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
        task.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(*log.lock().unwrap(), vec![100]);
    }

    #[test]
    fn test_intro_schedule_reports_cues() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut scheduler =
            AnimationScheduler::new(intro_schedule(move |cue| sink.lock().unwrap().push(cue)));

        scheduler.poll_at(Duration::from_millis(1600));
        assert_eq!(*seen.lock().unwrap(), vec![IntroCue::Logo, IntroCue::Title]);
        scheduler.poll_at(Duration::from_millis(2500));
        assert_eq!(*seen.lock().unwrap(), IntroCue::ALL.to_vec());
    }
}
