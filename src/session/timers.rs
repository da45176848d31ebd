use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use log::debug;
use tokio::{task::JoinHandle, time};

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type TimerTable = Arc<Mutex<HashMap<String, ArmedTimer>>>;

/// In-memory round deadlines keyed by session id. Lost on restart.
#[derive(Clone)]
pub struct SessionTimers {
    timers: TimerTable,
    next_generation: Arc<AtomicU64>,
    unit: Duration,
}

fn lock_table(timers: &TimerTable) -> MutexGuard<'_, HashMap<String, ArmedTimer>> {
    match timers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl SessionTimers {
    /// `unit` is the wall-clock length of one round second.
    pub fn new(unit: Duration) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            unit,
        }
    }

    /// Schedules `on_expire` after `seconds`, replacing any timer already
    /// armed for `session_id`. The entry is removed before `on_expire` runs,
    /// so a later `disarm` cannot abort an expiry that is under way.
    pub fn arm<F, Fut>(&self, session_id: &str, seconds: u32, on_expire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.unit.saturating_mul(seconds);
        let timers = self.timers.clone();
        let key = session_id.to_string();

        // Hold the table while spawning so the task cannot release its entry
        // before it is inserted.
        let mut table = lock_table(&self.timers);
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            {
                let mut table = lock_table(&timers);
                if table.get(&key).map(|armed| armed.generation) == Some(generation) {
                    table.remove(&key);
                }
            }
            debug!("Round timer fired for session {key}");
            on_expire().await;
        });

        if let Some(previous) = table.insert(session_id.to_string(), ArmedTimer { generation, handle }) {
            previous.handle.abort();
            debug!("Replaced round timer for session {session_id}");
        }
        debug!("Armed round timer for session {session_id}: {seconds}s");
    }

    /// Cancels the timer for `session_id`. Returns false if none was armed.
    pub fn disarm(&self, session_id: &str) -> bool {
        match lock_table(&self.timers).remove(session_id) {
            Some(armed) => {
                armed.handle.abort();
                debug!("Disarmed round timer for session {session_id}");
                true
            }
            None => false,
        }
    }

    /// Aborts every armed timer and returns how many there were.
    pub fn disarm_all(&self) -> usize {
        let drained: Vec<ArmedTimer> = lock_table(&self.timers)
            .drain()
            .map(|(_, armed)| armed)
            .collect();
        for armed in &drained {
            armed.handle.abort();
        }
        drained.len()
    }

    pub fn is_armed(&self, session_id: &str) -> bool {
        lock_table(&self.timers).contains_key(session_id)
    }

    pub fn armed_count(&self) -> usize {
        lock_table(&self.timers).len()
    }
}
