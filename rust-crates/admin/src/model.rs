use chrono::{
    DateTime,
    Utc,
};
use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};
use std::{
    collections::HashMap,
    fmt,
};

/// Placeholder shown wherever a player attribute is absent.
pub const MISSING: &str = "N/A";

/// The API is loose about whether identifiers are JSON strings or numbers, so
/// every identifier-like field goes through this before it becomes a `String`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl From<Scalar> for String {
    fn from(value: Scalar) -> Self {
        match value {
            Scalar::Text(text) => text,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "Scalar", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<Scalar> for $name {
            fn from(value: Scalar) -> Self {
                Self(value.into())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(
    /// Grid row id. Only meaningful within the snapshot it came from.
    RowHandle
);
string_newtype!(
    /// Stable player identifier (the player's Telegram user id).
    TelegramId
);
string_newtype!(
    /// Free-form list entry (referrals, milestone markers).
    Tag
);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GearSlot {
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub last_level_up: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackStats {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub last_purchase: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    #[serde(rename = "_id")]
    pub row_handle: RowHandle,
    pub telegram_id: TelegramId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub coins: f64,
    #[serde(default)]
    pub diamonds: u64,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub energy: u64,
    #[serde(default)]
    pub gears: Vec<GearSlot>,
    #[serde(default)]
    pub coin_pack: PackStats,
    #[serde(default)]
    pub energy_pack: PackStats,
    #[serde(default)]
    pub public_address: Option<String>,
    #[serde(default)]
    pub wallet_balance: f64,
    #[serde(default, rename = "packageD1")]
    pub package_d1: u64,
    #[serde(default, rename = "packageD2")]
    pub package_d2: u64,
    #[serde(default, rename = "packageD3")]
    pub package_d3: u64,
    #[serde(default)]
    pub referral_code: Option<String>,
    #[serde(default)]
    pub referred_by: Option<String>,
    #[serde(default)]
    pub referrals: Vec<Tag>,
    #[serde(default)]
    pub referral_count: u64,
    #[serde(default)]
    pub milestone_rewards_given: Vec<Tag>,
    #[serde(default)]
    pub max_energy_cap: u64,
    /// Fields this console does not know about, kept so nothing is lost.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlayerRecord {
    pub fn new(row_handle: impl Into<RowHandle>, telegram_id: impl Into<TelegramId>) -> Self {
        Self {
            row_handle: row_handle.into(),
            telegram_id: telegram_id.into(),
            first_name: None,
            power: 0.0,
            coins: 0.0,
            diamonds: 0,
            level: 0,
            energy: 0,
            gears: Vec::new(),
            coin_pack: PackStats::default(),
            energy_pack: PackStats::default(),
            public_address: None,
            wallet_balance: 0.0,
            package_d1: 0,
            package_d2: 0,
            package_d3: 0,
            referral_code: None,
            referred_by: None,
            referrals: Vec::new(),
            referral_count: 0,
            milestone_rewards_given: Vec::new(),
            max_energy_cap: 0,
            extra: Map::new(),
        }
    }

    pub fn gear(&self, slot: usize) -> Option<&GearSlot> {
        self.gears.get(slot)
    }

    pub fn gear_level_label(&self, slot: usize) -> String {
        self.gear(slot)
            .and_then(|gear| gear.level)
            .map(|level| level.to_string())
            .unwrap_or_else(|| MISSING.to_string())
    }

    pub fn gear_last_level_up_label(&self, slot: usize) -> String {
        format_timestamp(self.gear(slot).and_then(|gear| gear.last_level_up.as_ref()))
    }

    pub fn first_name_label(&self) -> &str {
        self.first_name.as_deref().unwrap_or(MISSING)
    }

    pub fn public_address_label(&self) -> &str {
        non_empty_or_missing(self.public_address.as_deref())
    }

    pub fn referral_code_label(&self) -> &str {
        non_empty_or_missing(self.referral_code.as_deref())
    }

    pub fn referred_by_label(&self) -> &str {
        non_empty_or_missing(self.referred_by.as_deref())
    }

    pub fn referrals_label(&self) -> String {
        join_or_missing(&self.referrals)
    }

    pub fn milestones_label(&self) -> String {
        join_or_missing(&self.milestone_rewards_given)
    }
}

fn non_empty_or_missing(value: Option<&str>) -> &str {
    match value {
        Some(text) if !text.is_empty() => text,
        _ => MISSING,
    }
}

fn join_or_missing(tags: &[Tag]) -> String {
    if tags.is_empty() {
        MISSING.to_string()
    } else {
        tags.iter().join(", ")
    }
}

pub fn format_timestamp(timestamp: Option<&DateTime<Utc>>) -> String {
    timestamp
        .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| MISSING.to_string())
}

/// One complete listing of players as returned by a single fetch.
///
/// Snapshots are never edited; a refresh builds a new one and the old one is
/// dropped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordSnapshot {
    records: Vec<PlayerRecord>,
    by_handle: HashMap<RowHandle, usize>,
}

impl RecordSnapshot {
    pub fn new(records: Vec<PlayerRecord>) -> Self {
        let mut by_handle = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if by_handle
                .insert(record.row_handle.clone(), position)
                .is_some()
            {
                tracing::warn!(handle = %record.row_handle, "duplicate row handle in snapshot");
            }
        }
        Self { records, by_handle }
    }

    pub fn records(&self) -> &[PlayerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, handle: &RowHandle) -> Option<&PlayerRecord> {
        self.by_handle
            .get(handle)
            .and_then(|position| self.records.get(*position))
    }

    pub fn contains(&self, handle: &RowHandle) -> bool {
        self.by_handle.contains_key(handle)
    }

    pub fn totals(&self) -> DashboardTotals {
        self.records
            .iter()
            .fold(DashboardTotals::default(), |totals, record| DashboardTotals {
                total_users: totals.total_users + 1,
                package_d1: totals.package_d1.saturating_add(record.package_d1),
                package_d2: totals.package_d2.saturating_add(record.package_d2),
                package_d3: totals.package_d3.saturating_add(record.package_d3),
            })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DashboardTotals {
    pub total_users: usize,
    pub package_d1: u64,
    pub package_d2: u64,
    pub package_d3: u64,
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    #[test]
    fn player_record__deserializes_full_api_payload() {
        // given
        let payload = json!({
            "_id": "665f1c",
            "telegramId": 123456789,
            "firstName": "Ada",
            "power": 12.5,
            "coins": 1000,
            "diamonds": 7,
            "level": 3,
            "energy": 40,
            "gears": [
                { "level": 2, "lastLevelUp": "2024-05-01T10:00:00.000Z" },
                {}
            ],
            "coinPack": { "count": 2, "lastPurchase": "2024-05-02T11:30:00Z" },
            "energyPack": { "count": 0, "lastPurchase": null },
            "publicAddress": "",
            "walletBalance": 0.25,
            "packageD1": 1,
            "packageD2": 0,
            "packageD3": 4,
            "referralCode": "ADA42",
            "referredBy": null,
            "referrals": ["111", 222],
            "referralCount": 2,
            "milestoneRewardsGiven": [5, 10],
            "maxEnergyCap": 100,
            "__v": 0
        });

        // when
        let record: PlayerRecord = serde_json::from_value(payload).unwrap();

        // then
        assert_eq!(record.row_handle, RowHandle::new("665f1c"));
        assert_eq!(record.telegram_id, TelegramId::new("123456789"));
        assert_eq!(record.gear_level_label(0), "2");
        assert_eq!(record.gear_last_level_up_label(0), "2024-05-01 10:00 UTC");
        assert_eq!(record.gear_level_label(1), MISSING);
        assert_eq!(record.gear_level_label(3), MISSING);
        assert_eq!(record.coin_pack.count, 2);
        assert_eq!(record.energy_pack.last_purchase, None);
        assert_eq!(record.public_address_label(), MISSING);
        assert_eq!(record.referred_by_label(), MISSING);
        assert_eq!(record.referrals_label(), "111, 222");
        assert_eq!(record.milestones_label(), "5, 10");
        assert_eq!(record.extra.get("__v"), Some(&json!(0)));
    }

    #[test]
    fn player_record__missing_optional_fields_use_defaults() {
        // given
        let payload = json!({ "_id": "a", "telegramId": "42" });

        // when
        let record: PlayerRecord = serde_json::from_value(payload).unwrap();

        // then
        assert_eq!(record, PlayerRecord::new("a", "42"));
        assert_eq!(record.first_name_label(), MISSING);
        assert_eq!(record.referrals_label(), MISSING);
    }

    #[test]
    fn telegram_id__serializes_as_string() {
        // given
        let id = TelegramId::new("987");

        // when
        let encoded = serde_json::to_value(&id).unwrap();

        // then
        assert_eq!(encoded, json!("987"));
    }

    #[test]
    fn snapshot__looks_up_records_by_handle() {
        // given
        let snapshot = RecordSnapshot::new(vec![
            PlayerRecord::new("r1", "u1"),
            PlayerRecord::new("r2", "u2"),
        ]);

        // when
        let found = snapshot.get(&RowHandle::new("r2"));
        let missing = snapshot.get(&RowHandle::new("r3"));

        // then
        assert_eq!(found.map(|r| r.telegram_id.as_str()), Some("u2"));
        assert!(missing.is_none());
    }

    #[test]
    fn snapshot__totals_sum_package_counts() {
        // given
        let mut first = PlayerRecord::new("r1", "u1");
        first.package_d1 = 2;
        first.package_d3 = 1;
        let mut second = PlayerRecord::new("r2", "u2");
        second.package_d1 = 3;
        second.package_d2 = 5;
        let snapshot = RecordSnapshot::new(vec![first, second]);

        // when
        let totals = snapshot.totals();

        // then
        assert_eq!(
            totals,
            DashboardTotals {
                total_users: 2,
                package_d1: 5,
                package_d2: 5,
                package_d3: 1,
            }
        );
    }
}
