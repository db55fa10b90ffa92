//! Shop catalog pricing as served by `GET /shop` and written back with `PUT /shop`.
//!
//! Fields this console does not edit are carried through untouched so a save never
//! drops data another tool put there.

use crate::error::ConsoleError;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    de::Error as _,
};
use serde_json::{
    Map,
    Value,
};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogItemId {
    Number(u64),
    Text(String),
}

impl fmt::Display for CatalogItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogItemId::Number(n) => write!(f, "{n}"),
            CatalogItemId::Text(text) => f.write_str(text),
        }
    }
}

/// Older catalogs were saved with numbers as strings, so both are accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Integer(u64),
    Float(f64),
    Text(String),
}

fn loose_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Integer(n) => Ok(n),
        LooseNumber::Float(n) if n >= 0.0 && n.fract() == 0.0 && n <= u64::MAX as f64 => {
            Ok(n as u64)
        }
        LooseNumber::Float(n) => Err(D::Error::custom(format!(
            "expected a non-negative integer, got {n}"
        ))),
        LooseNumber::Text(text) => text.trim().parse().map_err(|_| {
            D::Error::custom(format!("expected a non-negative integer, got {text:?}"))
        }),
    }
}

fn loose_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Integer(n) => Ok(n as f64),
        LooseNumber::Float(n) => Ok(n),
        LooseNumber::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected a number, got {text:?}"))),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoinBag {
    pub id: CatalogItemId,
    #[serde(default, deserialize_with = "loose_u64")]
    pub coins: u64,
    #[serde(default, deserialize_with = "loose_u64")]
    pub diamonds: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnergyBag {
    pub id: CatalogItemId,
    #[serde(default, deserialize_with = "loose_u64")]
    pub energy: u64,
    #[serde(default, deserialize_with = "loose_u64")]
    pub diamonds: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: CatalogItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "loose_f64")]
    pub ether_value: f64,
    #[serde(default, deserialize_with = "loose_u64")]
    pub diamond_add: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopCatalog {
    #[serde(default)]
    pub coin_bags: Vec<CoinBag>,
    #[serde(default)]
    pub energy_bags: Vec<EnergyBag>,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatalogSection {
    CoinBags,
    EnergyBags,
    Packages,
}

impl CatalogSection {
    pub const ALL: [CatalogSection; 3] = [
        CatalogSection::CoinBags,
        CatalogSection::EnergyBags,
        CatalogSection::Packages,
    ];

    pub fn title(self) -> &'static str {
        match self {
            CatalogSection::CoinBags => "Coin Bags",
            CatalogSection::EnergyBags => "Energy Bags",
            CatalogSection::Packages => "Packages",
        }
    }

    /// Editable columns, in display order.
    pub fn fields(self) -> &'static [CatalogField] {
        match self {
            CatalogSection::CoinBags => &[CatalogField::Coins, CatalogField::Diamonds],
            CatalogSection::EnergyBags => &[CatalogField::Energy, CatalogField::Diamonds],
            CatalogSection::Packages => &[
                CatalogField::Name,
                CatalogField::EtherValue,
                CatalogField::DiamondAdd,
            ],
        }
    }

    pub fn next(self) -> Self {
        match self {
            CatalogSection::CoinBags => CatalogSection::EnergyBags,
            CatalogSection::EnergyBags => CatalogSection::Packages,
            CatalogSection::Packages => CatalogSection::CoinBags,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CatalogField {
    Coins,
    Energy,
    Diamonds,
    Name,
    EtherValue,
    DiamondAdd,
}

impl CatalogField {
    /// The JSON key, which is also what validation errors name.
    pub fn key(self) -> &'static str {
        match self {
            CatalogField::Coins => "coins",
            CatalogField::Energy => "energy",
            CatalogField::Diamonds => "diamonds",
            CatalogField::Name => "name",
            CatalogField::EtherValue => "etherValue",
            CatalogField::DiamondAdd => "diamondAdd",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CatalogField::Coins => "Coins",
            CatalogField::Energy => "Energy",
            CatalogField::Diamonds => "Diamonds",
            CatalogField::Name => "Name",
            CatalogField::EtherValue => "Ether Value",
            CatalogField::DiamondAdd => "Diamonds",
        }
    }

    fn parse_count(self, input: &str) -> Result<u64, ConsoleError> {
        input.trim().parse().map_err(|_| self.invalid(input))
    }

    fn parse_ether(self, input: &str) -> Result<f64, ConsoleError> {
        match input.trim().parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
            _ => Err(self.invalid(input)),
        }
    }

    fn invalid(self, input: &str) -> ConsoleError {
        ConsoleError::InvalidCatalogValue {
            field: self.key(),
            value: input.to_string(),
        }
    }
}

impl ShopCatalog {
    pub fn rows(&self, section: CatalogSection) -> usize {
        match section {
            CatalogSection::CoinBags => self.coin_bags.len(),
            CatalogSection::EnergyBags => self.energy_bags.len(),
            CatalogSection::Packages => self.packages.len(),
        }
    }

    pub fn item_id(&self, section: CatalogSection, row: usize) -> Option<&CatalogItemId> {
        match section {
            CatalogSection::CoinBags => self.coin_bags.get(row).map(|bag| &bag.id),
            CatalogSection::EnergyBags => self.energy_bags.get(row).map(|bag| &bag.id),
            CatalogSection::Packages => self.packages.get(row).map(|pkg| &pkg.id),
        }
    }

    pub fn field_value(
        &self,
        section: CatalogSection,
        row: usize,
        field: CatalogField,
    ) -> Option<String> {
        match (section, field) {
            (CatalogSection::CoinBags, CatalogField::Coins) => {
                self.coin_bags.get(row).map(|bag| bag.coins.to_string())
            }
            (CatalogSection::CoinBags, CatalogField::Diamonds) => {
                self.coin_bags.get(row).map(|bag| bag.diamonds.to_string())
            }
            (CatalogSection::EnergyBags, CatalogField::Energy) => {
                self.energy_bags.get(row).map(|bag| bag.energy.to_string())
            }
            (CatalogSection::EnergyBags, CatalogField::Diamonds) => {
                self.energy_bags.get(row).map(|bag| bag.diamonds.to_string())
            }
            (CatalogSection::Packages, CatalogField::Name) => {
                self.packages.get(row).map(|pkg| pkg.name.clone())
            }
            (CatalogSection::Packages, CatalogField::EtherValue) => {
                self.packages.get(row).map(|pkg| pkg.ether_value.to_string())
            }
            (CatalogSection::Packages, CatalogField::DiamondAdd) => {
                self.packages.get(row).map(|pkg| pkg.diamond_add.to_string())
            }
            _ => None,
        }
    }

    /// Parses `input` for `field` and writes it into the row. Nothing changes when
    /// the input is rejected.
    pub fn set_field(
        &mut self,
        section: CatalogSection,
        row: usize,
        field: CatalogField,
        input: &str,
    ) -> Result<(), ConsoleError> {
        let missing = || field.invalid(input);
        match (section, field) {
            (CatalogSection::CoinBags, CatalogField::Coins) => {
                let value = field.parse_count(input)?;
                self.coin_bags.get_mut(row).ok_or_else(missing)?.coins = value;
            }
            (CatalogSection::CoinBags, CatalogField::Diamonds) => {
                let value = field.parse_count(input)?;
                self.coin_bags.get_mut(row).ok_or_else(missing)?.diamonds = value;
            }
            (CatalogSection::EnergyBags, CatalogField::Energy) => {
                let value = field.parse_count(input)?;
                self.energy_bags.get_mut(row).ok_or_else(missing)?.energy = value;
            }
            (CatalogSection::EnergyBags, CatalogField::Diamonds) => {
                let value = field.parse_count(input)?;
                self.energy_bags.get_mut(row).ok_or_else(missing)?.diamonds = value;
            }
            (CatalogSection::Packages, CatalogField::Name) => {
                let value = input.trim();
                if value.is_empty() {
                    return Err(missing());
                }
                self.packages.get_mut(row).ok_or_else(missing)?.name = value.to_string();
            }
            (CatalogSection::Packages, CatalogField::EtherValue) => {
                let value = field.parse_ether(input)?;
                self.packages.get_mut(row).ok_or_else(missing)?.ether_value = value;
            }
            (CatalogSection::Packages, CatalogField::DiamondAdd) => {
                let value = field.parse_count(input)?;
                self.packages.get_mut(row).ok_or_else(missing)?.diamond_add = value;
            }
            _ => return Err(missing()),
        }
        Ok(())
    }
}

/// A fetched catalog plus the operator's unsaved edits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogDraft {
    catalog: ShopCatalog,
    dirty: bool,
    revision: u64,
}

impl CatalogDraft {
    pub fn new(catalog: ShopCatalog) -> Self {
        Self {
            catalog,
            dirty: false,
            revision: 0,
        }
    }

    pub fn catalog(&self) -> &ShopCatalog {
        &self.catalog
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped by every accepted edit.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn edit(
        &mut self,
        section: CatalogSection,
        row: usize,
        field: CatalogField,
        input: &str,
    ) -> Result<(), ConsoleError> {
        self.catalog.set_field(section, row, field, input)?;
        self.dirty = true;
        self.revision += 1;
        tracing::debug!(
            section = section.title(),
            row,
            field = field.key(),
            "catalog field edited"
        );
        Ok(())
    }

    /// Called once `PUT /shop` succeeded with the catalog as of `revision`. Edits
    /// made after that revision stay unsaved. Returns whether the draft is clean.
    pub fn mark_saved(&mut self, revision: u64) -> bool {
        if revision == self.revision {
            self.dirty = false;
        }
        !self.dirty
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use serde_json::json;

    fn sample() -> ShopCatalog {
        serde_json::from_value(json!({
            "_id": "shop",
            "coinBags": [
                { "id": 1, "coins": 1000, "diamonds": 10 },
                { "id": "2", "coins": "2500", "diamonds": "20", "badge": "hot" }
            ],
            "energyBags": [{ "id": 1, "energy": 50, "diamonds": 5 }],
            "packages": [
                { "id": 1, "name": "Starter", "etherValue": 0.05, "diamondAdd": 100 }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn shop_catalog__accepts_numeric_and_string_values() {
        // given
        let catalog = sample();

        // then
        assert_eq!(catalog.coin_bags[0].id, CatalogItemId::Number(1));
        assert_eq!(catalog.coin_bags[1].id, CatalogItemId::Text("2".into()));
        assert_eq!(catalog.coin_bags[1].coins, 2500);
        assert_eq!(catalog.packages[0].ether_value, 0.05);
        assert_eq!(catalog.rows(CatalogSection::Packages), 1);
    }

    #[test]
    fn shop_catalog__preserves_unknown_fields_on_serialize() {
        // given
        let catalog = sample();

        // when
        let encoded = serde_json::to_value(&catalog).unwrap();

        // then
        assert_eq!(encoded["_id"], json!("shop"));
        assert_eq!(encoded["coinBags"][1]["badge"], json!("hot"));
        assert_eq!(encoded["coinBags"][1]["id"], json!("2"));
        assert_eq!(encoded["packages"][0]["diamondAdd"], json!(100));
    }

    #[test]
    fn set_field__updates_numeric_value() {
        // given
        let mut catalog = sample();

        // when
        let result =
            catalog.set_field(CatalogSection::EnergyBags, 0, CatalogField::Energy, " 75 ");

        // then
        assert_eq!(result, Ok(()));
        assert_eq!(
            catalog.field_value(CatalogSection::EnergyBags, 0, CatalogField::Energy),
            Some("75".to_string())
        );
    }

    #[test]
    fn set_field__rejects_negative_and_non_numeric_input() {
        // given
        let mut catalog = sample();
        let before = catalog.clone();

        // when
        let negative =
            catalog.set_field(CatalogSection::CoinBags, 0, CatalogField::Coins, "-5");
        let text =
            catalog.set_field(CatalogSection::Packages, 0, CatalogField::EtherValue, "lots");

        // then
        assert_eq!(
            negative,
            Err(ConsoleError::InvalidCatalogValue {
                field: "coins",
                value: "-5".into()
            })
        );
        assert_eq!(
            text,
            Err(ConsoleError::InvalidCatalogValue {
                field: "etherValue",
                value: "lots".into()
            })
        );
        assert_eq!(catalog, before);
    }

    #[test]
    fn set_field__field_outside_section_is_rejected() {
        let mut catalog = sample();
        let result = catalog.set_field(CatalogSection::CoinBags, 0, CatalogField::Name, "x");
        assert!(matches!(
            result,
            Err(ConsoleError::InvalidCatalogValue { field: "name", .. })
        ));
    }

    #[test]
    fn catalog_draft__tracks_dirty_until_saved() {
        // given
        let mut draft = CatalogDraft::new(sample());

        // when
        draft
            .edit(CatalogSection::Packages, 0, CatalogField::Name, "Pro")
            .unwrap();
        let dirty_after_edit = draft.is_dirty();
        let clean = draft.mark_saved(draft.revision());

        // then
        assert!(dirty_after_edit);
        assert!(clean);
        assert!(!draft.is_dirty());
        assert_eq!(draft.catalog().packages[0].name, "Pro");
    }

    #[test]
    fn catalog_draft__edit_during_save_stays_dirty() {
        // given
        let mut draft = CatalogDraft::new(sample());
        draft
            .edit(CatalogSection::CoinBags, 0, CatalogField::Coins, "1200")
            .unwrap();
        let sent = draft.revision();
        draft
            .edit(CatalogSection::CoinBags, 0, CatalogField::Diamonds, "12")
            .unwrap();

        // when
        let clean = draft.mark_saved(sent);

        // then
        assert!(!clean);
        assert!(draft.is_dirty());
    }

    #[test]
    fn catalog_draft__rejected_edit_keeps_clean_state() {
        let mut draft = CatalogDraft::new(sample());
        let result = draft.edit(CatalogSection::CoinBags, 5, CatalogField::Coins, "10");
        assert!(result.is_err());
        assert!(!draft.is_dirty());
    }
}
