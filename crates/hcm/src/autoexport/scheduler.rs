//! Fixed-delay polling of the event journal on a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use super::processor::{EventJournalProcessor, PollOutcome};

/// Runs an [`EventJournalProcessor`] at a fixed delay.
///
/// A message on the trigger channel runs the processor immediately and
/// also restarts it after a failure; scheduled ticks leave a failed
/// processor alone.
pub struct JournalScheduler {
    processor: Arc<Mutex<EventJournalProcessor>>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl JournalScheduler {
    /// Creates a new scheduler polling `processor` every `interval`.
    pub fn new(processor: Arc<Mutex<EventJournalProcessor>>, interval: Duration) -> Self {
        Self {
            processor,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The processor driven by this scheduler.
    pub fn processor(&self) -> &Arc<Mutex<EventJournalProcessor>> {
        &self.processor
    }

    /// Starts the poll loop; `trigger_rx` receives manual run requests.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> std::io::Result<JoinHandle<()>> {
        let processor = Arc::clone(&self.processor);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;

        std::thread::Builder::new()
            .name("hcm-autoexport".to_string())
            .spawn(move || {
                runtime.block_on(async {
                    let mut timer = tokio::time::interval(interval);
                    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    timer.tick().await;

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let manual = tokio::select! {
                            _ = timer.tick() => false,
                            Ok(()) = trigger_rx.recv() => {
                                log::info!("Manual auto-export run triggered");
                                true
                            },
                        };

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let Ok(mut guard) = processor.lock() else {
                            log::error!("Auto-export processor lock poisoned, stopping");
                            break;
                        };
                        if !manual && guard.is_failed() {
                            continue;
                        }
                        let now = Instant::now();
                        let result = if manual {
                            guard.run_once(now)
                        } else {
                            guard.poll(now)
                        };
                        match result {
                            Ok(PollOutcome::Exported { revision, paths }) => {
                                log::info!("Auto-export: {} paths exported up to revision {}", paths, revision);
                            }
                            Err(e) => log::error!("Auto-export poll failed: {}", e),
                            _ => {}
                        }
                    }
                });
            })
    }

    /// Signals the loop to stop after the current poll.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoexport::change_log::ChangeLog;
    use crate::autoexport::configuration::{Configuration, CONFIG_NODE_PATH, ENABLED_PROPERTY};
    use crate::autoexport::error::Result;
    use crate::autoexport::settings::AutoExportConfig;
    use crate::repository::{EventType, MemoryJournal, MemorySession, PropertyValue};
    use serial_test::serial;

    fn processor(journal: &MemoryJournal, exports: Arc<Mutex<usize>>) -> EventJournalProcessor {
        let session = MemorySession::new().with_property(
            &format!("{}/{}", CONFIG_NODE_PATH, ENABLED_PROPERTY),
            PropertyValue::Boolean(true),
        );
        let settings = AutoExportConfig {
            min_change_log_age_ms: 20,
            ..AutoExportConfig::default()
        };
        let exporter = move |_: &ChangeLog| -> Result<()> {
            *exports.lock().unwrap() += 1;
            Ok(())
        };
        EventJournalProcessor::new(
            &settings,
            Arc::new(Configuration::new(Arc::new(session))),
            Box::new(journal.clone()),
            Box::new(exporter),
        )
        .unwrap()
    }

    #[test]
    #[serial]
    fn test_scheduler_shutdown() {
        let journal = MemoryJournal::new();
        let exports = Arc::new(Mutex::new(0));
        let scheduler = JournalScheduler::new(
            Arc::new(Mutex::new(processor(&journal, Arc::clone(&exports)))),
            Duration::from_millis(10),
        );

        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx).unwrap();

        journal.append(EventType::NodeAdded, "/config/a");
        std::thread::sleep(Duration::from_millis(300));
        scheduler.stop();
        let _ = trigger_tx.send(());

        handle.join().expect("scheduler thread panicked");
        assert_eq!(*exports.lock().unwrap(), 1);
    }

    #[test]
    #[serial]
    fn test_trigger_restarts_failed_processor() {
        let journal = MemoryJournal::new();
        let exports = Arc::new(Mutex::new(0));
        let scheduler = JournalScheduler::new(
            Arc::new(Mutex::new(processor(&journal, Arc::clone(&exports)))),
            Duration::from_millis(10),
        );

        journal.fail_reads(true);
        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(scheduler.processor().lock().unwrap().is_failed());

        journal.fail_reads(false);
        trigger_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(!scheduler.processor().lock().unwrap().is_failed());

        scheduler.stop();
        let _ = trigger_tx.send(());
        handle.join().expect("scheduler thread panicked");
    }
}
