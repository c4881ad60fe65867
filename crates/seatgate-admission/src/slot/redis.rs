//! Redis slot allocator.
//!
//! Layout per section, all under the `{<section>}` hash tag:
//! - `slot:{<section>}:<n>` hash with `status`, `reservationId`, `claimedAt`, `expiresAt`
//! - `slot-index:{<section>}:<status>` set of slot ids in that status
//! - `slot-owner:{<section>}:<reservation>` set of slot ids held by a reservation
//! - `slot-meta:{<section>}` hash with `totalSlots`, `totalCapacity`, `initializedAt`
//!
//! Every mutation is one Lua script that checks status and owner in the
//! same server-side step that moves the slot between index sets. Scripts
//! that pick slots server-side (claim, sweep, initialize) derive slot keys
//! from the tagged prefix; the others receive them in `KEYS`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::AsyncCommands;
use tracing::{debug, info};
use uuid::Uuid;

use seatgate_cache::keys;
use seatgate_cache::redis::RedisClient;
use seatgate_cache::redis::client::redis_err;
use seatgate_core::error::{AppError, ErrorKind};
use seatgate_core::result::AppResult;
use seatgate_entity::slot::{SlotMetadata, SlotRecord, SlotStats, SlotStatus};

use super::SlotAllocator;

/// KEYS: meta, available, claimed, finalized
/// ARGV: capacity, slot key prefix, initialized-at ms
const INITIALIZE: &str = r#"
    local previous = tonumber(redis.call('HGET', KEYS[1], 'totalSlots') or '0')
    for i = 0, previous - 1 do
        redis.call('DEL', ARGV[2] .. i)
    end
    redis.call('DEL', KEYS[2], KEYS[3], KEYS[4])
    local capacity = tonumber(ARGV[1])
    for i = 0, capacity - 1 do
        redis.call('HSET', ARGV[2] .. i, 'status', 'available')
        redis.call('SADD', KEYS[2], i)
    end
    redis.call('HSET', KEYS[1], 'totalSlots', capacity, 'totalCapacity', capacity, 'initializedAt', ARGV[3])
    return capacity
"#;

/// KEYS: meta, available, claimed, owner set
/// ARGV: slot key prefix, owner, claimed-at ms, expires-at ms
///
/// Returns the slot id, -1 when none is free, -2 when uninitialized.
const CLAIM_ONE: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -2
    end
    local slot = redis.call('SPOP', KEYS[2])
    if not slot then
        return -1
    end
    redis.call('SADD', KEYS[3], slot)
    redis.call('SADD', KEYS[4], slot)
    redis.call('HSET', ARGV[1] .. slot,
        'status', 'claimed',
        'reservationId', ARGV[2],
        'claimedAt', ARGV[3],
        'expiresAt', ARGV[4])
    return tonumber(slot)
"#;

/// KEYS: claimed, finalized, slot records...
/// ARGV: owner, slot ids... (ARGV[i - 1] is the id of KEYS[i])
const FINALIZE: &str = r#"
    local moved = 0
    for i = 3, #KEYS do
        local fields = redis.call('HMGET', KEYS[i], 'status', 'reservationId')
        if fields[1] == 'claimed' and fields[2] == ARGV[1] then
            redis.call('SMOVE', KEYS[1], KEYS[2], ARGV[i - 1])
            redis.call('HSET', KEYS[i], 'status', 'finalized')
            redis.call('HDEL', KEYS[i], 'expiresAt')
            moved = moved + 1
        end
    end
    return moved
"#;

/// KEYS: available, claimed, finalized, owner set, slot records...
/// ARGV: owner, slot ids... (ARGV[i - 3] is the id of KEYS[i])
const FREE: &str = r#"
    local freed = 0
    for i = 5, #KEYS do
        local slot = ARGV[i - 3]
        local fields = redis.call('HMGET', KEYS[i], 'status', 'reservationId')
        if (fields[1] == 'claimed' or fields[1] == 'finalized') and fields[2] == ARGV[1] then
            redis.call('SREM', KEYS[2], slot)
            redis.call('SREM', KEYS[3], slot)
            redis.call('SADD', KEYS[1], slot)
            redis.call('SREM', KEYS[4], slot)
            redis.call('HSET', KEYS[i], 'status', 'available')
            redis.call('HDEL', KEYS[i], 'reservationId', 'claimedAt', 'expiresAt')
            freed = freed + 1
        end
    end
    return freed
"#;

/// KEYS: available, claimed
/// ARGV: slot key prefix, owner key prefix, now ms
const SWEEP_EXPIRED: &str = r#"
    local freed = 0
    local now = tonumber(ARGV[3])
    for _, slot in ipairs(redis.call('SMEMBERS', KEYS[2])) do
        local key = ARGV[1] .. slot
        local fields = redis.call('HMGET', key, 'status', 'reservationId', 'expiresAt')
        local expires = tonumber(fields[3] or '0')
        if fields[1] == 'claimed' and expires > 0 and expires <= now then
            redis.call('SMOVE', KEYS[2], KEYS[1], slot)
            if fields[2] then
                redis.call('SREM', ARGV[2] .. fields[2], slot)
            end
            redis.call('HSET', key, 'status', 'available')
            redis.call('HDEL', key, 'reservationId', 'claimedAt', 'expiresAt')
            freed = freed + 1
        end
    end
    return freed
"#;

/// Slot allocator on a shared Redis connection.
#[derive(Debug, Clone)]
pub struct RedisSlotAllocator {
    client: RedisClient,
}

struct SectionKeys {
    meta: String,
    available: String,
    claimed: String,
    finalized: String,
    slot_prefix: String,
    owner_prefix: String,
}

impl RedisSlotAllocator {
    /// Create an allocator on a shared client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    fn keys(&self, section_id: Uuid) -> SectionKeys {
        SectionKeys {
            meta: self.client.key(&keys::slot_meta(section_id)),
            available: self.client.key(&keys::slot_index(section_id, SlotStatus::Available)),
            claimed: self.client.key(&keys::slot_index(section_id, SlotStatus::Claimed)),
            finalized: self.client.key(&keys::slot_index(section_id, SlotStatus::Finalized)),
            slot_prefix: self.client.key(&keys::slot_prefix(section_id)),
            owner_prefix: self.client.key(&keys::slot_owner_prefix(section_id)),
        }
    }

    fn owner_key(&self, section_id: Uuid, owner: Uuid) -> String {
        self.client.key(&keys::slot_owner(section_id, owner))
    }

    fn slot_key(&self, section_id: Uuid, slot_id: u32) -> String {
        self.client.key(&keys::slot(section_id, slot_id))
    }
}

fn script_err(context: &'static str) -> impl Fn(redis::RedisError) -> AppError {
    redis_err(ErrorKind::Coordination, context)
}

fn parse_slot_ids(members: Vec<String>) -> Vec<u32> {
    let mut ids: Vec<u32> = members.iter().filter_map(|m| m.parse().ok()).collect();
    ids.sort_unstable();
    ids
}

fn from_millis(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[async_trait]
impl SlotAllocator for RedisSlotAllocator {
    async fn initialize(&self, section_id: Uuid, capacity: u32) -> AppResult<SlotMetadata> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();

        let owner_keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", k.owner_prefix))
            .query_async(&mut conn)
            .await
            .map_err(script_err("Redis KEYS failed"))?;
        if !owner_keys.is_empty() {
            let _: () = conn
                .del(&owner_keys)
                .await
                .map_err(script_err("Redis DEL failed"))?;
        }

        let initialized_at = Utc::now();
        let _: i64 = redis::Script::new(INITIALIZE)
            .key(&k.meta)
            .key(&k.available)
            .key(&k.claimed)
            .key(&k.finalized)
            .arg(capacity)
            .arg(&k.slot_prefix)
            .arg(initialized_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(script_err("Slot initialization script failed"))?;

        info!(section_id = %section_id, capacity, "Slots initialized in Redis");
        Ok(SlotMetadata {
            total_slots: capacity,
            total_capacity: capacity,
            initialized_at,
        })
    }

    async fn claim_one(
        &self,
        section_id: Uuid,
        owner: Uuid,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<u32>> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let reply: i64 = redis::Script::new(CLAIM_ONE)
            .key(&k.meta)
            .key(&k.available)
            .key(&k.claimed)
            .key(self.owner_key(section_id, owner))
            .arg(&k.slot_prefix)
            .arg(owner.to_string())
            .arg(Utc::now().timestamp_millis())
            .arg(expires_at.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(script_err("Slot claim script failed"))?;

        match reply {
            -2 => Err(AppError::coordination(format!(
                "Slots for section {section_id} are not initialized"
            ))),
            -1 => Ok(None),
            slot => {
                let slot = u32::try_from(slot).map_err(|_| {
                    AppError::coordination(format!("Slot claim returned invalid id {slot}"))
                })?;
                debug!(section_id = %section_id, owner = %owner, slot, "Slot claimed");
                Ok(Some(slot))
            }
        }
    }

    async fn finalize(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32> {
        if slots.is_empty() {
            return Ok(0);
        }
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let script = redis::Script::new(FINALIZE);
        let mut invocation = script.prepare_invoke();
        invocation.key(&k.claimed).key(&k.finalized);
        for slot in slots {
            invocation.key(self.slot_key(section_id, *slot));
        }
        invocation
            .arg(owner.to_string())
            .arg(slots)
            .invoke_async(&mut conn)
            .await
            .map_err(script_err("Slot finalize script failed"))
    }

    async fn free(&self, section_id: Uuid, slots: &[u32], owner: Uuid) -> AppResult<u32> {
        if slots.is_empty() {
            return Ok(0);
        }
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let script = redis::Script::new(FREE);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(&k.available)
            .key(&k.claimed)
            .key(&k.finalized)
            .key(self.owner_key(section_id, owner));
        for slot in slots {
            invocation.key(self.slot_key(section_id, *slot));
        }
        invocation
            .arg(owner.to_string())
            .arg(slots)
            .invoke_async(&mut conn)
            .await
            .map_err(script_err("Slot free script failed"))
    }

    async fn available_count(&self, section_id: Uuid) -> AppResult<u32> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        conn.scard(&k.available)
            .await
            .map_err(script_err("Redis SCARD failed"))
    }

    async fn find_by_owner(&self, section_id: Uuid, owner: Uuid) -> AppResult<Vec<u32>> {
        let mut conn = self.client.conn();
        let members: Vec<String> = conn
            .smembers(self.owner_key(section_id, owner))
            .await
            .map_err(script_err("Redis SMEMBERS failed"))?;
        Ok(parse_slot_ids(members))
    }

    async fn sweep_expired(&self, section_id: Uuid, now: DateTime<Utc>) -> AppResult<u32> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let freed: u32 = redis::Script::new(SWEEP_EXPIRED)
            .key(&k.available)
            .key(&k.claimed)
            .arg(&k.slot_prefix)
            .arg(&k.owner_prefix)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(script_err("Slot sweep script failed"))?;
        if freed > 0 {
            info!(section_id = %section_id, freed, "Expired slot claims freed");
        }
        Ok(freed)
    }

    async fn stats(&self, section_id: Uuid) -> AppResult<SlotStats> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let (available, claimed, finalized, total): (u32, u32, u32, Option<u32>) = redis::pipe()
            .scard(&k.available)
            .scard(&k.claimed)
            .scard(&k.finalized)
            .hget(&k.meta, "totalSlots")
            .query_async(&mut conn)
            .await
            .map_err(script_err("Redis slot stats pipeline failed"))?;
        Ok(SlotStats {
            available,
            claimed,
            finalized,
            total: total.unwrap_or(0),
        })
    }

    async fn metadata(&self, section_id: Uuid) -> AppResult<Option<SlotMetadata>> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let fields: HashMap<String, String> = conn
            .hgetall(&k.meta)
            .await
            .map_err(script_err("Redis HGETALL failed"))?;
        if fields.is_empty() {
            return Ok(None);
        }
        let number = |name: &str| fields.get(name).and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
        Ok(Some(SlotMetadata {
            total_slots: number("totalSlots"),
            total_capacity: number("totalCapacity"),
            initialized_at: from_millis(fields.get("initializedAt")).unwrap_or_else(Utc::now),
        }))
    }

    async fn owners(&self, section_id: Uuid) -> AppResult<HashMap<Uuid, Vec<u32>>> {
        let k = self.keys(section_id);
        let mut conn = self.client.conn();
        let owner_keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", k.owner_prefix))
            .query_async(&mut conn)
            .await
            .map_err(script_err("Redis KEYS failed"))?;

        let mut owners = HashMap::new();
        for key in owner_keys {
            let Some(owner) = key
                .strip_prefix(&k.owner_prefix)
                .and_then(|id| Uuid::parse_str(id).ok())
            else {
                continue;
            };
            let members: Vec<String> = conn
                .smembers(&key)
                .await
                .map_err(script_err("Redis SMEMBERS failed"))?;
            let held = parse_slot_ids(members);
            if !held.is_empty() {
                owners.insert(owner, held);
            }
        }
        Ok(owners)
    }

    async fn record(&self, section_id: Uuid, slot_id: u32) -> AppResult<Option<SlotRecord>> {
        let mut conn = self.client.conn();
        let fields: HashMap<String, String> = conn
            .hgetall(self.slot_key(section_id, slot_id))
            .await
            .map_err(script_err("Redis HGETALL failed"))?;
        let Some(status) = fields.get("status").and_then(|s| s.parse::<SlotStatus>().ok()) else {
            return Ok(None);
        };
        Ok(Some(SlotRecord {
            slot_id,
            status,
            owner: fields
                .get("reservationId")
                .and_then(|id| Uuid::parse_str(id).ok()),
            claimed_at: from_millis(fields.get("claimedAt")),
            expires_at: from_millis(fields.get("expiresAt")),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slot_ids_sorts_and_skips_garbage() {
        let ids = parse_slot_ids(vec!["12".into(), "3".into(), "x".into(), "7".into()]);
        assert_eq!(ids, vec![3, 7, 12]);
    }

    #[test]
    fn test_from_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).single();
        assert_eq!(from_millis(Some(&"1700000000123".to_string())), at);
        assert_eq!(from_millis(Some(&"soon".to_string())), None);
        assert_eq!(from_millis(None), None);
    }

    // Script tests need a live server:
    // REDIS_URL=redis://127.0.0.1:6379 cargo test -p seatgate-admission -- --ignored

    use chrono::Duration;
    use seatgate_core::config::RedisConfig;

    async fn allocator() -> RedisSlotAllocator {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let config = RedisConfig {
            url,
            key_prefix: format!("seatgate-test:{}:", Uuid::new_v4()),
        };
        RedisSlotAllocator::new(RedisClient::connect(&config).await.unwrap())
    }

    fn deadline() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(15)
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_claim_finalize_free_against_redis() {
        let slots = allocator().await;
        let section = Uuid::new_v4();
        let owner = Uuid::new_v4();
        slots.initialize(section, 5).await.unwrap();

        let mut held = slots.reserve(section, 3, owner, deadline()).await.unwrap().unwrap();
        held.sort_unstable();
        assert_eq!(held.len(), 3);
        assert_eq!(slots.available_count(section).await.unwrap(), 2);
        assert_eq!(slots.find_by_owner(section, owner).await.unwrap(), held);

        let record = slots.record(section, held[0]).await.unwrap().unwrap();
        assert_eq!(record.status, SlotStatus::Claimed);
        assert_eq!(record.owner, Some(owner));

        assert_eq!(slots.finalize(section, &held, owner).await.unwrap(), 3);
        let stats = slots.stats(section).await.unwrap();
        assert_eq!((stats.available, stats.claimed, stats.finalized), (2, 0, 3));

        assert_eq!(slots.free(section, &held, owner).await.unwrap(), 3);
        assert_eq!(slots.available_count(section).await.unwrap(), 5);
        assert!(slots.find_by_owner(section, owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_mutations_skip_slots_of_other_owners() {
        let slots = allocator().await;
        let section = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        slots.initialize(section, 4).await.unwrap();

        let mut held = slots.reserve(section, 2, owner, deadline()).await.unwrap().unwrap();
        held.sort_unstable();
        assert_eq!(slots.finalize(section, &held, intruder).await.unwrap(), 0);
        assert_eq!(slots.free(section, &held, intruder).await.unwrap(), 0);

        let stats = slots.stats(section).await.unwrap();
        assert_eq!((stats.available, stats.claimed, stats.finalized), (2, 2, 0));
        assert_eq!(slots.owners(section).await.unwrap().get(&owner), Some(&held));
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_reserve_is_all_or_nothing_against_redis() {
        let slots = allocator().await;
        let section = Uuid::new_v4();
        slots.initialize(section, 3).await.unwrap();

        let owner = Uuid::new_v4();
        assert!(slots.reserve(section, 4, owner, deadline()).await.unwrap().is_none());
        assert_eq!(slots.available_count(section).await.unwrap(), 3);
        assert!(slots.find_by_owner(section, owner).await.unwrap().is_empty());

        let missing = Uuid::new_v4();
        assert!(slots.claim_one(missing, owner, deadline()).await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires REDIS_URL"]
    async fn test_sweep_frees_only_overdue_claims_against_redis() {
        let slots = allocator().await;
        let section = Uuid::new_v4();
        slots.initialize(section, 6).await.unwrap();

        let stale = Uuid::new_v4();
        let past = Utc::now() - Duration::minutes(1);
        slots.reserve(section, 2, stale, past).await.unwrap().unwrap();
        let live = Uuid::new_v4();
        slots.reserve(section, 2, live, deadline()).await.unwrap().unwrap();
        let settled = Uuid::new_v4();
        let finalized = slots.reserve(section, 1, settled, past).await.unwrap().unwrap();
        slots.finalize(section, &finalized, settled).await.unwrap();

        assert_eq!(slots.sweep_expired(section, Utc::now()).await.unwrap(), 2);
        assert!(slots.find_by_owner(section, stale).await.unwrap().is_empty());
        assert_eq!(slots.find_by_owner(section, live).await.unwrap().len(), 2);

        let stats = slots.stats(section).await.unwrap();
        assert_eq!((stats.available, stats.claimed, stats.finalized), (3, 2, 1));
        assert_eq!(slots.sweep_expired(section, Utc::now()).await.unwrap(), 0);
    }
}
