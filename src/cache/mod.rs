use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

pub const GENERAL_TTL: Duration = Duration::from_secs(300);
pub const USER_TTL: Duration = Duration::from_secs(1800);
pub const SCHEDULE_TTL: Duration = Duration::from_secs(180);

/// How long a cached existence probe stays valid.
pub const USER_EXISTS_TTL: Duration = Duration::from_secs(900);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// The three cache partitions, split by volatility: user identity rarely
/// changes, schedules are edited constantly, everything else sits between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    General,
    User,
    Schedule,
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
}

impl Shard {
    fn get(&mut self, key: &str) -> Option<Value> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expired entries count as misses and are dropped lazily.
                self.entries.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[derive(Debug, Serialize)]
pub struct PartitionStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub general: PartitionStats,
    pub user: PartitionStats,
    pub schedule: PartitionStats,
}

/// Process-local TTL cache, constructed once and injected into handlers via
/// application state. Shards are mutex-guarded; locks are held only for map
/// operations, never across awaits.
pub struct CacheService {
    general: Mutex<Shard>,
    user: Mutex<Shard>,
    schedule: Mutex<Shard>,
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            general: Mutex::new(Shard::default()),
            user: Mutex::new(Shard::default()),
            schedule: Mutex::new(Shard::default()),
        }
    }

    fn shard(&self, partition: Partition) -> &Mutex<Shard> {
        match partition {
            Partition::General => &self.general,
            Partition::User => &self.user,
            Partition::Schedule => &self.schedule,
        }
    }

    pub fn get(&self, partition: Partition, key: &str) -> Option<Value> {
        self.shard(partition).lock().expect("cache lock").get(key)
    }

    pub fn set(&self, partition: Partition, key: &str, value: Value, ttl: Duration) {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.shard(partition)
            .lock()
            .expect("cache lock")
            .entries
            .insert(key.to_string(), entry);
    }

    pub fn remove(&self, partition: Partition, key: &str) {
        self.shard(partition)
            .lock()
            .expect("cache lock")
            .entries
            .remove(key);
    }

    /// Serves `key` from the partition or runs `fetch` and stores its result.
    /// Errors propagate uncached; there is no negative caching.
    pub async fn wrap<F>(
        &self,
        partition: Partition,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Value>
    where
        F: Future<Output = Result<Value>>,
    {
        if let Some(hit) = self.get(partition, key) {
            return Ok(hit);
        }
        let value = fetch.await?;
        self.set(partition, key, value.clone(), ttl);
        Ok(value)
    }

    pub fn clear_prefix(&self, partition: Partition, prefix: &str) {
        self.shard(partition)
            .lock()
            .expect("cache lock")
            .entries
            .retain(|key, _| !key.starts_with(prefix));
    }

    /// Drops everything cached for a user, including the existence probe.
    pub fn clear_user(&self, username: &str) {
        let mut shard = self.user.lock().expect("cache lock");
        shard.entries.remove(&user_key(username));
        shard.entries.remove(&user_exists_key(username));
    }

    /// Drops the schedule list for one owner+date, or all of the owner's
    /// dates when no date is given.
    pub fn clear_schedules(&self, username: &str, date: Option<&str>) {
        match date {
            Some(date) => self.remove(Partition::Schedule, &schedules_key(username, date)),
            None => self.clear_prefix(Partition::Schedule, &format!("schedules:{username}:")),
        }
    }

    pub fn clear_all(&self) {
        for partition in [Partition::General, Partition::User, Partition::Schedule] {
            self.shard(partition)
                .lock()
                .expect("cache lock")
                .entries
                .clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let snapshot = |shard: &Mutex<Shard>| {
            let shard = shard.lock().expect("cache lock");
            PartitionStats {
                entries: shard.entries.len(),
                hits: shard.hits,
                misses: shard.misses,
            }
        };
        CacheStats {
            general: snapshot(&self.general),
            user: snapshot(&self.user),
            schedule: snapshot(&self.schedule),
        }
    }

    /// Spawns the periodic sweep that evicts entries the lazy path never
    /// touches again.
    pub fn start_sweeper(self: &Arc<Self>) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                for partition in [Partition::General, Partition::User, Partition::Schedule] {
                    cache.shard(partition).lock().expect("cache lock").sweep();
                }
            }
        });
    }
}

pub fn user_key(username: &str) -> String {
    format!("user:{username}")
}

pub fn user_exists_key(username: &str) -> String {
    format!("user_exists:{username}")
}

pub fn schedules_key(username: &str, date: &str) -> String {
    format!("schedules:{username}:{date}")
}
