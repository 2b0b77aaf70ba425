//! Per-device progress engine (component E): kfabric has no automatic
//! progress (no `FI_PROGRESS_AUTO`), so a dedicated driver thread advances
//! each device's default CQ.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::device::Device;
use crate::config::Config;

static NEXT_CPU: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

struct ProgressState {
    should_stop: AtomicBool,
}

/// Handle to a running progress driver. Stop is cooperative: `stop` sets a
/// flag and joins the thread; calling it more than once is a no-op.
pub struct ProgressHandle {
    state: Arc<ProgressState>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressHandle {
    pub fn stop(&self) {
        self.state.should_stop.store(true, Ordering::Release);
        if let Some(handle) = self.join.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Start the progress driver for `device`, pinned to a CPU chosen
/// round-robin among online CPUs.
pub fn start(device: Device) -> ProgressHandle {
    let state = Arc::new(ProgressState {
        should_stop: AtomicBool::new(false),
    });
    let worker_state = state.clone();

    let cpus = core_affinity::get_core_ids().unwrap_or_default();
    let cpu = if cpus.is_empty() {
        None
    } else {
        let idx = NEXT_CPU.fetch_add(1, Ordering::Relaxed) % cpus.len();
        Some(cpus[idx])
    };

    let device_name = device.name().to_owned();
    let join = std::thread::Builder::new()
        .name(format!("kfi-progress-{device_name}"))
        .spawn(move || {
            if let Some(cpu) = cpu {
                let _ = core_affinity::set_for_current(cpu);
            }
            worker_loop(device, worker_state);
        })
        .expect("failed to spawn progress thread");

    ProgressHandle {
        state,
        join: Mutex::new(Some(join)),
    }
}

fn worker_loop(device: Device, state: Arc<ProgressState>) {
    while !state.should_stop.load(Ordering::Acquire) {
        let cq = device.default_cq();
        match cq.progress_once() {
            Ok(true) => {
                // Completions were delivered; retry immediately.
                std::thread::yield_now();
            }
            Ok(false) => {
                std::thread::sleep(Duration::from_micros(Config::PROGRESS_EMPTY_SLEEP_US.0));
            }
            Err(e) => {
                log::debug!("progress[{}]: poll error: {e}", device.name());
                std::thread::sleep(Duration::from_millis(Config::PROGRESS_ERROR_SLEEP_MS.0));
            }
        }
    }
}
