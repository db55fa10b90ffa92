use crate::model::{
    PlayerRecord,
    RecordSnapshot,
};
use itertools::Itertools;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    TelegramId,
    FirstName,
    Power,
    Coins,
    Diamonds,
    Level,
    Energy,
    WalletBalance,
    ReferralCount,
}

impl SortColumn {
    pub fn next(self) -> Self {
        match self {
            SortColumn::TelegramId => SortColumn::FirstName,
            SortColumn::FirstName => SortColumn::Power,
            SortColumn::Power => SortColumn::Coins,
            SortColumn::Coins => SortColumn::Diamonds,
            SortColumn::Diamonds => SortColumn::Level,
            SortColumn::Level => SortColumn::Energy,
            SortColumn::Energy => SortColumn::WalletBalance,
            SortColumn::WalletBalance => SortColumn::ReferralCount,
            SortColumn::ReferralCount => SortColumn::TelegramId,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortColumn::TelegramId => "Telegram ID",
            SortColumn::FirstName => "First Name",
            SortColumn::Power => "Power",
            SortColumn::Coins => "Coins",
            SortColumn::Diamonds => "Diamonds",
            SortColumn::Level => "Level",
            SortColumn::Energy => "Energy",
            SortColumn::WalletBalance => "Wallet Balance",
            SortColumn::ReferralCount => "Referral Count",
        }
    }

    fn compare(self, a: &PlayerRecord, b: &PlayerRecord) -> Ordering {
        match self {
            SortColumn::TelegramId => {
                compare_ids(a.telegram_id.as_str(), b.telegram_id.as_str())
            }
            SortColumn::FirstName => a.first_name.cmp(&b.first_name),
            SortColumn::Power => a.power.total_cmp(&b.power),
            SortColumn::Coins => a.coins.total_cmp(&b.coins),
            SortColumn::Diamonds => a.diamonds.cmp(&b.diamonds),
            SortColumn::Level => a.level.cmp(&b.level),
            SortColumn::Energy => a.energy.cmp(&b.energy),
            SortColumn::WalletBalance => a.wallet_balance.total_cmp(&b.wallet_balance),
            SortColumn::ReferralCount => a.referral_count.cmp(&b.referral_count),
        }
    }
}

/// Numeric ids compare as numbers and come before anything non-numeric.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u128>(), b.parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggle(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

/// How the dashboard grid presents a snapshot. Purely a view: it never touches the
/// selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GridQuery {
    pub sort: SortColumn,
    pub direction: SortDirection,
    pub filter: String,
}

impl GridQuery {
    fn matches(&self, needle: &str, record: &PlayerRecord) -> bool {
        if needle.is_empty() {
            return true;
        }
        [
            Some(record.telegram_id.as_str()),
            record.first_name.as_deref(),
            record.referral_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }

    /// Rows to show, filtered and sorted. Ties keep snapshot order.
    pub fn visible<'a>(&self, snapshot: &'a RecordSnapshot) -> Vec<&'a PlayerRecord> {
        let needle = self.filter.trim().to_lowercase();
        snapshot
            .records()
            .iter()
            .filter(|record| self.matches(&needle, record))
            .sorted_by(|a, b| {
                let ordering = self.sort.compare(a, b);
                match self.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
            .collect()
    }
}
